//! Single-unit test harness.
//!
//! Runs exactly one named test unit per invocation against a data directory,
//! writes `res.xml` into that directory, and reports the outcome through a
//! typed result that the binary maps to an exit status.

pub mod driver;
pub mod invocation;
pub mod suites;

pub use driver::{
    bind_context, engine_config, run, run_with_registry, FailureKind, HarnessDriver,
    HarnessError, HarnessResult,
};
pub use invocation::{Invocation, InvocationError, EXPECTED_ARGS};
pub use suites::{builtin_registry, DATA_LOCATION_SUITE, SMOKE_SUITE};

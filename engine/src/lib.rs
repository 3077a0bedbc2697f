//! In-process test execution engine.
//!
//! A [`TestUnit`] is registered in a [`UnitRegistry`] and run by an
//! [`ExecutionEngine`] according to an [`EngineConfig`]. The engine hands every
//! unit hook a [`RunContext`] and writes one report per attached formatter.

pub mod config;
pub mod context;
pub mod engine;
pub mod report;
pub mod unit;

pub use config::{EngineConfig, FormatterKind, SummaryMode, TestSpec, DEFAULT_OUTFILE};
pub use context::{RunContext, DATA_LOCATION_KEY};
pub use engine::{EngineError, EngineResult, ExecutionEngine, InProcessEngine, RunOutcome};
pub use report::{
    CaseRecord, CaseStatus, Fault, ReportCase, ReportError, ReportSummary, SuiteResult,
};
pub use unit::{ensure, ensure_eq, CaseError, CaseResult, Suite, TestCase, TestUnit, UnitRegistry};

//! Test units compiled into the `harness` binary.

use engine::{ensure, ensure_eq, RunContext, Suite, UnitRegistry, DATA_LOCATION_KEY};
use std::fs;

pub const SMOKE_SUITE: &str = "harness.SmokeSuite";
pub const DATA_LOCATION_SUITE: &str = "harness.DataLocationSuite";

const PROBE_FILE: &str = ".harness-probe";

/// Registry with every built-in unit.
pub fn builtin_registry() -> UnitRegistry {
    let mut registry = UnitRegistry::new();
    registry.register(Box::new(smoke_suite()));
    registry.register(Box::new(data_location_suite()));
    registry
}

/// Always passes. Useful to check that the harness and report path work.
pub fn smoke_suite() -> Suite {
    Suite::new(SMOKE_SUITE).case("passes", |_| Ok(()))
}

/// Checks that the data directory reached the unit and is usable.
pub fn data_location_suite() -> Suite {
    Suite::new(DATA_LOCATION_SUITE)
        .case("location_is_published", |ctx: &RunContext| {
            let expected = ctx.data_location().to_string_lossy();
            ensure_eq(ctx.property(DATA_LOCATION_KEY), Some(&*expected), DATA_LOCATION_KEY)
        })
        .case("location_is_directory", |ctx: &RunContext| {
            ensure(
                ctx.data_location().is_dir(),
                format!("{} is not a directory", ctx.data_location().display()),
            )
        })
        .case("location_is_writable", |ctx: &RunContext| {
            let probe = ctx.data_location().join(PROBE_FILE);
            fs::write(&probe, b"probe")?;
            fs::remove_file(&probe)?;
            Ok(())
        })
}

use crate::invocation::{Invocation, InvocationError};
use engine::{
    EngineConfig, EngineError, ExecutionEngine, FormatterKind, InProcessEngine, RunContext,
    RunOutcome, SummaryMode, TestSpec, UnitRegistry, DEFAULT_OUTFILE,
};
use std::ffi::OsString;
use thiserror::Error;
use tracing::{debug, info};

/// Coarse classification of why a run did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidInvocation,
    EngineConfiguration,
    EngineExecution,
    ReportWrite,
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("Test run failed")]
    Engine(#[from] EngineError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::Invocation(_) => FailureKind::InvalidInvocation,
            HarnessError::Engine(EngineError::InvalidConfig { .. }) => {
                FailureKind::EngineConfiguration
            }
            HarnessError::Engine(EngineError::UnitNotFound { .. }) => FailureKind::EngineExecution,
            HarnessError::Engine(EngineError::Report(_) | EngineError::ReportWrite { .. }) => {
                FailureKind::ReportWrite
            }
        }
    }

    /// Process exit status for this error: 2 for a bad command line, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::Invocation(_) => 2,
            HarnessError::Engine(_) => 1,
        }
    }
}

/// Makes the data location visible to the test unit under `data.location`.
pub fn bind_context(invocation: &Invocation) -> RunContext {
    RunContext::new(invocation.data_location.clone())
}

/// Engine settings for a harness run: in-process, summary on, XML report `res`
/// in the data directory.
pub fn engine_config(invocation: &Invocation) -> EngineConfig {
    let test = TestSpec::new(
        invocation.test_name.clone(),
        invocation.data_location.clone(),
    )
    .with_outfile(DEFAULT_OUTFILE);

    EngineConfig::new(test)
        .with_fork(false)
        .with_summary(SummaryMode::On)
        .with_formatters(vec![FormatterKind::Xml])
}

/// Drives one validated invocation through an engine.
pub struct HarnessDriver<E> {
    engine: E,
}

impl<E: ExecutionEngine> HarnessDriver<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn run(&self, invocation: &Invocation) -> HarnessResult<RunOutcome> {
        let ctx = bind_context(invocation);
        let config = engine_config(invocation);
        info!(
            test = %invocation.test_name,
            data_location = %invocation.data_location.display(),
            engine = self.engine.engine_name(),
            "starting harness run"
        );

        let outcome = self.engine.run(&config, &ctx)?;
        debug!(
            success = outcome.success(),
            reports = outcome.reports.len(),
            "harness run complete"
        );
        Ok(outcome)
    }
}

/// Validates `args`, then builds the engine with `make_engine` and runs the unit.
///
/// The engine is not constructed when the arguments are rejected.
pub fn run<I, T, E, F>(args: I, make_engine: F) -> HarnessResult<RunOutcome>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
    E: ExecutionEngine,
    F: FnOnce() -> E,
{
    let invocation = Invocation::from_args(args)?;
    HarnessDriver::new(make_engine()).run(&invocation)
}

/// [`run`] with the in-process engine over `registry`.
pub fn run_with_registry<I, T>(args: I, registry: UnitRegistry) -> HarnessResult<RunOutcome>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    run(args, || InProcessEngine::new(registry))
}

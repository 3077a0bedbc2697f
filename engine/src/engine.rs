use crate::config::{EngineConfig, SummaryMode};
use crate::context::RunContext;
use crate::report::{self, CaseRecord, CaseStatus, Fault, ReportError, SuiteResult};
use crate::unit::{CaseError, CaseResult, TestUnit, UnitRegistry};
use chrono::Utc;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Once;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Test unit not found: {name}")]
    UnitNotFound { name: String },

    #[error("Failed to render report: {0}")]
    Report(#[from] ReportError),

    #[error("Failed to write report '{}': {source}", path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub result: SuiteResult,
    /// Report files written, one per attached formatter.
    pub reports: Vec<PathBuf>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.result.success()
    }
}

/// Runs one named test unit and writes its reports.
pub trait ExecutionEngine {
    fn run(&self, config: &EngineConfig, ctx: &RunContext) -> EngineResult<RunOutcome>;

    fn engine_name(&self) -> &'static str;
}

/// Runs units from a [`UnitRegistry`] on the calling thread.
///
/// Cases execute sequentially in declaration order. A panicking case is
/// caught and recorded as a failure so the remaining cases still run.
pub struct InProcessEngine {
    registry: UnitRegistry,
}

impl InProcessEngine {
    pub fn new(registry: UnitRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    fn execute_unit(&self, unit: &dyn TestUnit, ctx: &RunContext) -> SuiteResult {
        let timestamp = Utc::now();
        let started = Instant::now();
        let classname = unit.name().to_string();
        let mut cases = Vec::with_capacity(unit.cases().len());

        match guarded(|| unit.set_up(ctx)).into_case_result() {
            Ok(()) => {
                for case in unit.cases() {
                    debug!(case = case.name(), "running case");
                    let case_started = Instant::now();
                    let status = status_of(guarded(|| case.run(ctx)));
                    cases.push(CaseRecord {
                        name: case.name().to_string(),
                        classname: classname.clone(),
                        time: case_started.elapsed(),
                        status,
                    });
                }
            }
            Err(err) => {
                warn!(unit = unit.name(), error = %err, "suite set-up failed");
                let status = match err {
                    CaseError::Skipped { reason } => CaseStatus::Skipped { reason },
                    other => CaseStatus::Errored(setup_fault(&other)),
                };
                for case in unit.cases() {
                    cases.push(CaseRecord {
                        name: case.name().to_string(),
                        classname: classname.clone(),
                        time: Duration::ZERO,
                        status: status.clone(),
                    });
                }
            }
        }

        if let Err(err) = guarded(|| unit.tear_down(ctx)).into_case_result() {
            warn!(unit = unit.name(), error = %err, "suite tear-down failed");
            cases.push(CaseRecord {
                name: "tearDown".to_string(),
                classname: classname.clone(),
                time: Duration::ZERO,
                status: CaseStatus::Errored(setup_fault(&err)),
            });
        }

        SuiteResult {
            name: classname,
            timestamp,
            hostname: local_hostname(),
            time: started.elapsed(),
            properties: ctx
                .properties()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            cases,
        }
    }
}

impl ExecutionEngine for InProcessEngine {
    fn run(&self, config: &EngineConfig, ctx: &RunContext) -> EngineResult<RunOutcome> {
        config
            .validate()
            .map_err(|message| EngineError::InvalidConfig { message })?;
        if config.fork {
            return Err(EngineError::InvalidConfig {
                message: "forked execution is not supported by the in-process engine"
                    .to_string(),
            });
        }

        let name = config.test.name.as_str();
        let unit = self
            .registry
            .get(name)
            .ok_or_else(|| EngineError::UnitNotFound {
                name: name.to_string(),
            })?;

        if config.summary == SummaryMode::On {
            println!("Running {}", name);
        }
        info!(unit = name, cases = unit.cases().len(), "executing test unit");

        let result = self.execute_unit(unit, ctx);

        let mut reports = Vec::with_capacity(config.formatters.len());
        for formatter in &config.formatters {
            let bytes = report::render(*formatter, &result)?;
            let path = config.test.report_path(*formatter);
            std::fs::write(&path, bytes).map_err(|source| EngineError::ReportWrite {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "report written");
            reports.push(path);
        }

        if config.summary == SummaryMode::On {
            println!("{}", result.summary_line());
        }
        info!(
            unit = name,
            tests = result.tests(),
            failures = result.failures(),
            errors = result.errors(),
            "test unit finished"
        );

        Ok(RunOutcome { result, reports })
    }

    fn engine_name(&self) -> &'static str {
        "in-process"
    }
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// How a guarded hook or case ended.
enum Guarded {
    Returned(CaseResult),
    Panicked {
        message: String,
        location: Option<String>,
    },
}

impl Guarded {
    /// Suite hooks have no failure verdict, so a panic there is an error.
    fn into_case_result(self) -> CaseResult {
        match self {
            Guarded::Returned(result) => result,
            Guarded::Panicked { message, .. } => Err(CaseError::error("panic", message)),
        }
    }
}

/// Chains a hook that records the panic location instead of printing it while
/// a guarded call runs on the current thread. Other panics go to the previous hook.
fn install_panic_capture() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let location = info.location().map(|l| l.to_string());
                PANIC_LOCATION.with(|slot| *slot.borrow_mut() = location);
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `f`, catching a panic along with where it happened.
fn guarded(f: impl FnOnce() -> CaseResult) -> Guarded {
    install_panic_capture();
    let outer = CAPTURING.with(|c| c.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|c| c.set(outer));

    match result {
        Ok(result) => Guarded::Returned(result),
        Err(payload) => Guarded::Panicked {
            message: panic_message(payload.as_ref()),
            location: PANIC_LOCATION.with(|slot| slot.borrow_mut().take()),
        },
    }
}

fn status_of(outcome: Guarded) -> CaseStatus {
    match outcome {
        Guarded::Returned(Ok(())) => CaseStatus::Passed,
        Guarded::Returned(Err(CaseError::Assertion { message })) => CaseStatus::Failed(Fault {
            detail: message.clone(),
            message,
            kind: "assertion".to_string(),
        }),
        Guarded::Returned(Err(CaseError::Error { kind, message })) => CaseStatus::Errored(Fault {
            detail: message.clone(),
            message,
            kind,
        }),
        Guarded::Returned(Err(CaseError::Skipped { reason })) => CaseStatus::Skipped { reason },
        // `assert!` panics, so panics count as failures.
        Guarded::Panicked { message, location } => CaseStatus::Failed(Fault {
            detail: match location {
                Some(location) => format!("panicked at {location}:\n{message}"),
                None => message.clone(),
            },
            message,
            kind: "panic".to_string(),
        }),
    }
}

fn setup_fault(err: &CaseError) -> Fault {
    let kind = match err {
        CaseError::Assertion { .. } => "assertion",
        CaseError::Error { kind, .. } => kind.as_str(),
        CaseError::Skipped { .. } => "skipped",
    };
    Fault {
        message: err.to_string(),
        kind: kind.to_string(),
        detail: String::new(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test case panicked".to_string()
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormatterKind, TestSpec};
    use crate::unit::{ensure, ensure_eq, Suite};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn engine_with(suite: Suite) -> InProcessEngine {
        let mut registry = UnitRegistry::new();
        registry.register(Box::new(suite));
        InProcessEngine::new(registry)
    }

    fn quiet_config(name: &str, dir: &std::path::Path) -> EngineConfig {
        EngineConfig::new(TestSpec::new(name, dir)).with_summary(SummaryMode::Off)
    }

    #[test]
    fn test_passing_unit_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(Suite::new("demo.Passing").case("ok", |_| Ok(())));

        let ctx = RunContext::new(dir.path());
        let outcome = engine
            .run(&quiet_config("demo.Passing", dir.path()), &ctx)
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.result.tests(), 1);
        assert_eq!(outcome.reports, vec![dir.path().join("res.xml")]);

        let summary = report::load(dir.path().join("res.xml")).unwrap();
        assert_eq!(summary.tests, 1);
        assert_eq!(summary.failures, 0);

        let host = hostname::get().unwrap().into_string().unwrap();
        assert_eq!(outcome.result.hostname, host);
        assert_eq!(summary.hostname, host);
    }

    #[test]
    fn test_case_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let suite = Suite::new("demo.Mixed")
            .case("passes", |_| Ok(()))
            .case("asserts", |_| ensure_eq(1, 2, "count"))
            .case("panics", |_| panic!("boom"))
            .case("errors", |_| Err(CaseError::error("io", "disk gone")))
            .case("skips", |_| Err(CaseError::skipped("not on this host")));
        let engine = engine_with(suite);

        let outcome = engine
            .run(&quiet_config("demo.Mixed", dir.path()), &RunContext::new(dir.path()))
            .unwrap();
        let result = &outcome.result;

        assert!(!outcome.success());
        assert_eq!(result.tests(), 5);
        assert_eq!(result.failures(), 2);
        assert_eq!(result.errors(), 1);
        assert_eq!(result.skipped(), 1);

        let names: Vec<&str> = result.cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["passes", "asserts", "panics", "errors", "skips"]);

        match &result.cases[2].status {
            CaseStatus::Failed(fault) => {
                assert_eq!(fault.kind, "panic");
                assert_eq!(fault.message, "boom");
                assert!(
                    fault.detail.starts_with("panicked at ") && fault.detail.contains("engine.rs:"),
                    "detail: {}",
                    fault.detail
                );
                assert!(fault.detail.ends_with("boom"));
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_error_kind_named_panic_is_still_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            Suite::new("demo.Named")
                .case("reports_panic_kind", |_| Err(CaseError::error("panic", "manual"))),
        );

        let outcome = engine
            .run(&quiet_config("demo.Named", dir.path()), &RunContext::new(dir.path()))
            .unwrap();

        assert_eq!(outcome.result.failures(), 0);
        assert_eq!(outcome.result.errors(), 1);
        match &outcome.result.cases[0].status {
            CaseStatus::Errored(fault) => assert_eq!(fault.kind, "panic"),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_panic_capture_is_scoped_to_the_guarded_call() {
        let caught = guarded(|| panic!("inside"));
        assert!(matches!(caught, Guarded::Panicked { ref location, .. } if location.is_some()));

        // The capture flag is cleared once the guarded call returns.
        assert!(!CAPTURING.with(Cell::get));
        assert!(PANIC_LOCATION.with(|slot| slot.borrow().is_none()));
    }

    #[test]
    fn test_panicking_set_up_errors_every_case() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            Suite::new("demo.PanicSetup")
                .with_set_up(|_| panic!("no fixtures"))
                .case("a", |_| Ok(())),
        );

        let outcome = engine
            .run(&quiet_config("demo.PanicSetup", dir.path()), &RunContext::new(dir.path()))
            .unwrap();

        assert_eq!(outcome.result.errors(), 1);
        match &outcome.result.cases[0].status {
            CaseStatus::Errored(fault) => assert_eq!(fault.message, "panic: no fixtures"),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_context_reaches_cases_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().to_string_lossy().into_owned();
        let engine = engine_with(Suite::new("demo.Context").case("reads", move |ctx| {
            ensure_eq(ctx.property("data.location"), Some(expected.as_str()), "data.location")
        }));

        let outcome = engine
            .run(&quiet_config("demo.Context", dir.path()), &RunContext::new(dir.path()))
            .unwrap();
        assert!(outcome.success());

        let location = dir.path().to_string_lossy().into_owned();
        let summary = report::load(&outcome.reports[0]).unwrap();
        assert_eq!(summary.property("data.location"), Some(location.as_str()));
    }

    #[test]
    fn test_failed_set_up_errors_every_case() {
        let dir = tempfile::tempdir().unwrap();
        let torn_down = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&torn_down);
        let suite = Suite::new("demo.Setup")
            .with_set_up(|_| Err(CaseError::error("io", "fixture missing")))
            .with_tear_down(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .case("a", |_| Ok(()))
            .case("b", |_| Ok(()));
        let engine = engine_with(suite);

        let outcome = engine
            .run(&quiet_config("demo.Setup", dir.path()), &RunContext::new(dir.path()))
            .unwrap();

        assert_eq!(outcome.result.errors(), 2);
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("res.xml").exists());
    }

    #[test]
    fn test_failed_tear_down_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let suite = Suite::new("demo.Teardown")
            .case("a", |_| Ok(()))
            .with_tear_down(|_| ensure(false, "left files behind"));
        let engine = engine_with(suite);

        let outcome = engine
            .run(&quiet_config("demo.Teardown", dir.path()), &RunContext::new(dir.path()))
            .unwrap();

        assert_eq!(outcome.result.tests(), 2);
        assert_eq!(outcome.result.cases[1].name, "tearDown");
        assert_eq!(outcome.result.errors(), 1);
    }

    #[test]
    fn test_unknown_unit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(Suite::new("demo.Known"));

        let err = engine
            .run(&quiet_config("demo.Unknown", dir.path()), &RunContext::new(dir.path()))
            .unwrap_err();

        assert!(matches!(err, EngineError::UnitNotFound { ref name } if name == "demo.Unknown"));
        assert!(!dir.path().join("res.xml").exists());
    }

    #[test]
    fn test_fork_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(Suite::new("demo.Known"));
        let config = quiet_config("demo.Known", dir.path()).with_fork(true);

        let err = engine.run(&config, &RunContext::new(dir.path())).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig { .. }));
    }

    #[test]
    fn test_missing_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let engine = engine_with(Suite::new("demo.Known").case("a", |_| Ok(())));

        let err = engine
            .run(&quiet_config("demo.Known", &missing), &RunContext::new(&missing))
            .unwrap_err();

        match err {
            EngineError::ReportWrite { path, .. } => assert_eq!(path, missing.join("res.xml")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_extra_formatters_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(Suite::new("demo.Known").case("a", |_| Ok(())));
        let config = quiet_config("demo.Known", dir.path()).with_formatter(FormatterKind::Plain);
        let ctx = RunContext::new(dir.path());

        std::fs::write(dir.path().join("res.xml"), "stale").unwrap();
        let first = engine.run(&config, &ctx).unwrap();
        let second = engine.run(&config, &ctx).unwrap();

        assert_eq!(first.reports, second.reports);
        assert_eq!(
            second.reports,
            vec![dir.path().join("res.xml"), dir.path().join("res.txt")]
        );
        assert!(report::load(dir.path().join("res.xml")).unwrap().success());
        let text = std::fs::read_to_string(dir.path().join("res.txt")).unwrap();
        assert!(text.starts_with("Testsuite: demo.Known"));
    }
}

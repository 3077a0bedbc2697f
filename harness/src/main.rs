use harness::{suites, HarnessError};
use std::error::Error;
use std::process::ExitCode;
use tracing::debug;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match harness::run_with_registry(std::env::args_os(), suites::builtin_registry()) {
        Ok(outcome) => {
            debug!(
                unit = %outcome.result.name,
                passed = outcome.success(),
                "run finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            debug!(kind = ?err.kind(), "run failed");
            report_error(&err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn report_error(err: &HarnessError) {
    eprintln!("error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

/// Number of positional arguments the harness accepts.
pub const EXPECTED_ARGS: usize = 2;

/// Marks the end of options so both values reach the positionals verbatim.
const END_OF_OPTIONS: &str = "--";

#[derive(Parser, Debug)]
#[command(name = "harness", disable_help_flag = true, disable_version_flag = true)]
#[command(about = "Run a single named test unit and write a JUnit XML report")]
struct Cli {
    /// Name of the test unit to run
    #[arg(value_parser = clap::value_parser!(OsString))]
    test_name: OsString,
    /// Data directory, published as `data.location` and used for `res.xml`
    #[arg(value_parser = clap::value_parser!(OsString))]
    data_location: OsString,
}

#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("Expected {expected} arguments, got {found}. Usage: harness <TEST_NAME> <DATA_LOCATION>")]
    InvalidInvocation { expected: usize, found: usize },

    #[error("Malformed arguments: {0}")]
    Malformed(clap::Error),
}

/// The validated command line. Nothing else about the values is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub test_name: String,
    pub data_location: PathBuf,
}

impl Invocation {
    pub fn new(test_name: impl Into<String>, data_location: impl Into<PathBuf>) -> Self {
        Self {
            test_name: test_name.into(),
            data_location: data_location.into(),
        }
    }

    /// Validates a full argument list, program name first.
    ///
    /// Only the count is checked. Values that look like flags (`--help`, `-V`,
    /// `--`) are taken as they are, and the data location need not be UTF-8.
    pub fn from_args<I, T>(args: I) -> Result<Self, InvocationError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut args = args.into_iter().map(Into::into);
        let program = args.next().unwrap_or_else(|| OsString::from("harness"));
        let values: Vec<OsString> = args.collect();
        if values.len() != EXPECTED_ARGS {
            return Err(InvocationError::InvalidInvocation {
                expected: EXPECTED_ARGS,
                found: values.len(),
            });
        }

        let argv = std::iter::once(program)
            .chain(std::iter::once(OsString::from(END_OF_OPTIONS)))
            .chain(values);
        let cli = Cli::try_parse_from(argv).map_err(InvocationError::Malformed)?;

        // Unit names are looked up as text; an undecodable name simply matches no unit.
        Ok(Self::new(
            cli.test_name.to_string_lossy().into_owned(),
            cli.data_location,
        ))
    }
}

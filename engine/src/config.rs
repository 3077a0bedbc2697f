use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Report base name used when the caller does not pick one.
pub const DEFAULT_OUTFILE: &str = "res";

/// Report formats the engine can attach to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatterKind {
    /// JUnit/Ant XML.
    Xml,
    /// Human-readable text.
    Plain,
}

impl FormatterKind {
    pub fn extension(&self) -> &'static str {
        match self {
            FormatterKind::Xml => "xml",
            FormatterKind::Plain => "txt",
        }
    }
}

/// Whether the engine prints the one-line summary when the run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    #[default]
    On,
    Off,
}

/// The single test registered with a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    /// Name of the unit to run.
    pub name: String,
    /// Report base name, without extension.
    pub outfile: String,
    /// Directory the reports are written to.
    pub to_dir: PathBuf,
}

impl TestSpec {
    pub fn new(name: impl Into<String>, to_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            outfile: DEFAULT_OUTFILE.to_string(),
            to_dir: to_dir.into(),
        }
    }

    pub fn with_outfile(mut self, outfile: impl Into<String>) -> Self {
        self.outfile = outfile.into();
        self
    }

    /// Path of the report produced by `formatter`.
    pub fn report_path(&self, formatter: FormatterKind) -> PathBuf {
        self.to_dir
            .join(format!("{}.{}", self.outfile, formatter.extension()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub fork: bool,
    pub summary: SummaryMode,
    pub formatters: Vec<FormatterKind>,
    pub test: TestSpec,
}

impl EngineConfig {
    pub fn new(test: TestSpec) -> Self {
        Self {
            fork: false,
            summary: SummaryMode::On,
            formatters: vec![FormatterKind::Xml],
            test,
        }
    }

    pub fn with_fork(mut self, fork: bool) -> Self {
        self.fork = fork;
        self
    }

    pub fn with_summary(mut self, summary: SummaryMode) -> Self {
        self.summary = summary;
        self
    }

    pub fn with_formatter(mut self, formatter: FormatterKind) -> Self {
        self.formatters.push(formatter);
        self
    }

    pub fn with_formatters(mut self, formatters: Vec<FormatterKind>) -> Self {
        self.formatters = formatters;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        let outfile = &self.test.outfile;
        if outfile.is_empty() {
            return Err("Report base name cannot be empty".to_string());
        }

        if outfile.contains('/') || outfile.contains('\\') {
            return Err(format!(
                "Report base name '{}' must not contain path separators",
                outfile
            ));
        }

        if self.formatters.is_empty() {
            return Err("At least one report formatter is required".to_string());
        }

        for (i, formatter) in self.formatters.iter().enumerate() {
            if self.formatters[..i].contains(formatter) {
                return Err(format!(
                    "Formatter '{}' is attached more than once",
                    formatter.extension()
                ));
            }
        }

        Ok(())
    }
}

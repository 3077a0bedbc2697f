//! Run results and the report artifacts written from them.
//!
//! A finished run is described by a [`SuiteResult`]. Formatters turn it into
//! bytes: [`render_xml`] produces the JUnit/Ant XML document consumed by CI
//! tooling and [`render_plain`] a short text listing. [`parse_xml`] reads an
//! XML report back into a [`ReportSummary`] so callers can inspect the verdict
//! without re-running the unit.

use crate::config::FormatterKind;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("Malformed report: {0}")]
    Malformed(#[from] quick_xml::DeError),

    #[error("Report is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Details of a failed or errored case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub message: String,
    /// JUnit `type` attribute, e.g. `assertion`, `panic`, `io`.
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseStatus {
    Passed,
    Failed(Fault),
    Errored(Fault),
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub name: String,
    pub classname: String,
    pub time: Duration,
    pub status: CaseStatus,
}

/// Everything the engine observed while running one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteResult {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub time: Duration,
    pub properties: Vec<(String, String)>,
    pub cases: Vec<CaseRecord>,
}

impl SuiteResult {
    pub fn tests(&self) -> usize {
        self.cases.len()
    }

    pub fn failures(&self) -> usize {
        self.count(|s| matches!(s, CaseStatus::Failed(_)))
    }

    pub fn errors(&self) -> usize {
        self.count(|s| matches!(s, CaseStatus::Errored(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, CaseStatus::Skipped { .. }))
    }

    /// True when no case failed or errored. Skipped cases do not count against the run.
    pub fn success(&self) -> bool {
        self.failures() == 0 && self.errors() == 0
    }

    /// The line printed when the summary is enabled.
    pub fn summary_line(&self) -> String {
        format!(
            "Tests run: {}, Failures: {}, Errors: {}, Skipped: {}, Time elapsed: {} sec",
            self.tests(),
            self.failures(),
            self.errors(),
            self.skipped(),
            seconds(self.time)
        )
    }

    fn count(&self, pred: impl Fn(&CaseStatus) -> bool) -> usize {
        self.cases.iter().filter(|c| pred(&c.status)).count()
    }
}

/// Renders `result` in the given format.
pub fn render(kind: FormatterKind, result: &SuiteResult) -> ReportResult<Vec<u8>> {
    match kind {
        FormatterKind::Xml => render_xml(result),
        FormatterKind::Plain => Ok(render_plain(result).into_bytes()),
    }
}

pub fn render_xml(result: &SuiteResult) -> ReportResult<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let tests = result.tests().to_string();
    let failures = result.failures().to_string();
    let errors = result.errors().to_string();
    let skipped = result.skipped().to_string();
    let time = seconds(result.time);
    let timestamp = result.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string();

    let mut suite = BytesStart::new("testsuite");
    attr(&mut suite, "name", result.name.as_str());
    attr(&mut suite, "tests", tests.as_str());
    attr(&mut suite, "failures", failures.as_str());
    attr(&mut suite, "errors", errors.as_str());
    attr(&mut suite, "skipped", skipped.as_str());
    attr(&mut suite, "time", time.as_str());
    attr(&mut suite, "timestamp", timestamp.as_str());
    attr(&mut suite, "hostname", result.hostname.as_str());
    emit(&mut writer, Event::Start(suite))?;

    if result.properties.is_empty() {
        emit(&mut writer, Event::Empty(BytesStart::new("properties")))?;
    } else {
        emit(&mut writer, Event::Start(BytesStart::new("properties")))?;
        for (key, value) in &result.properties {
            let mut property = BytesStart::new("property");
            attr(&mut property, "name", key.as_str());
            attr(&mut property, "value", value.as_str());
            emit(&mut writer, Event::Empty(property))?;
        }
        emit(&mut writer, Event::End(BytesEnd::new("properties")))?;
    }

    for case in &result.cases {
        let time = seconds(case.time);
        let mut testcase = BytesStart::new("testcase");
        attr(&mut testcase, "name", case.name.as_str());
        attr(&mut testcase, "classname", case.classname.as_str());
        attr(&mut testcase, "time", time.as_str());

        match &case.status {
            CaseStatus::Passed => emit(&mut writer, Event::Empty(testcase))?,
            CaseStatus::Failed(fault) => {
                emit(&mut writer, Event::Start(testcase))?;
                write_fault(&mut writer, "failure", fault)?;
                emit(&mut writer, Event::End(BytesEnd::new("testcase")))?;
            }
            CaseStatus::Errored(fault) => {
                emit(&mut writer, Event::Start(testcase))?;
                write_fault(&mut writer, "error", fault)?;
                emit(&mut writer, Event::End(BytesEnd::new("testcase")))?;
            }
            CaseStatus::Skipped { reason } => {
                emit(&mut writer, Event::Start(testcase))?;
                let mut skipped = BytesStart::new("skipped");
                attr(&mut skipped, "message", reason.as_str());
                emit(&mut writer, Event::Empty(skipped))?;
                emit(&mut writer, Event::End(BytesEnd::new("testcase")))?;
            }
        }
    }

    emit(&mut writer, Event::Empty(BytesStart::new("system-out")))?;
    emit(&mut writer, Event::Empty(BytesStart::new("system-err")))?;
    emit(&mut writer, Event::End(BytesEnd::new("testsuite")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_fault(writer: &mut Writer<Vec<u8>>, element: &str, fault: &Fault) -> ReportResult<()> {
    let mut start = BytesStart::new(element);
    attr(&mut start, "message", fault.message.as_str());
    attr(&mut start, "type", fault.kind.as_str());
    if fault.detail.is_empty() {
        return emit(writer, Event::Empty(start));
    }
    emit(writer, Event::Start(start))?;
    emit(writer, Event::Text(BytesText::new(&xml_safe(&fault.detail))))?;
    emit(writer, Event::End(BytesEnd::new(element)))
}

fn attr(element: &mut BytesStart<'_>, key: &str, value: &str) {
    element.push_attribute((key, &*xml_safe(value)));
}

/// Replaces characters XML 1.0 cannot carry with U+FFFD. Test output often
/// holds terminal escapes or NULs, which strict parsers reject.
fn xml_safe(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| if is_xml_char(c) { c } else { char::REPLACEMENT_CHARACTER })
            .collect(),
    )
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> ReportResult<()> {
    writer
        .write_event(event)
        .map_err(|e| ReportError::Xml(e.to_string()))
}

pub fn render_plain(result: &SuiteResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Testsuite: {}", result.name);
    let _ = writeln!(out, "{}", result.summary_line());
    let _ = writeln!(out);

    for case in &result.cases {
        let _ = writeln!(out, "Testcase: {} took {} sec", case.name, seconds(case.time));
        match &case.status {
            CaseStatus::Passed => {}
            CaseStatus::Failed(fault) => {
                let _ = writeln!(out, "\tFAILED");
                let _ = writeln!(out, "{}: {}", fault.kind, fault.message);
            }
            CaseStatus::Errored(fault) => {
                let _ = writeln!(out, "\tCaused an ERROR");
                let _ = writeln!(out, "{}: {}", fault.kind, fault.message);
            }
            CaseStatus::Skipped { reason } => {
                let _ = writeln!(out, "\tSKIPPED: {}", reason);
            }
        }
    }

    out
}

fn seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// An XML report read back from disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportSummary {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@tests", default)]
    pub tests: usize,
    #[serde(rename = "@failures", default)]
    pub failures: usize,
    #[serde(rename = "@errors", default)]
    pub errors: usize,
    #[serde(rename = "@skipped", default)]
    pub skipped: usize,
    #[serde(rename = "@time", default)]
    pub time: f64,
    #[serde(rename = "@timestamp", default)]
    pub timestamp: String,
    #[serde(rename = "@hostname", default)]
    pub hostname: String,
    #[serde(default)]
    pub properties: ReportProperties,
    #[serde(rename = "testcase", default)]
    pub cases: Vec<ReportCase>,
}

impl ReportSummary {
    pub fn success(&self) -> bool {
        self.failures == 0 && self.errors == 0
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .property
            .iter()
            .find(|p| p.name == key)
            .map(|p| p.value.as_str())
    }

    pub fn case(&self, name: &str) -> Option<&ReportCase> {
        self.cases.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReportProperties {
    #[serde(default)]
    pub property: Vec<ReportProperty>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportProperty {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportCase {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@classname", default)]
    pub classname: String,
    #[serde(rename = "@time", default)]
    pub time: f64,
    #[serde(default)]
    pub failure: Option<ReportFault>,
    #[serde(default)]
    pub error: Option<ReportFault>,
    #[serde(default)]
    pub skipped: Option<ReportSkipped>,
}

impl ReportCase {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.error.is_none() && self.skipped.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportFault {
    #[serde(rename = "@message", default)]
    pub message: String,
    #[serde(rename = "@type", default)]
    pub kind: String,
    #[serde(rename = "$text", default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportSkipped {
    #[serde(rename = "@message", default)]
    pub message: String,
}

pub fn parse_xml(xml: &str) -> ReportResult<ReportSummary> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Reads and parses the XML report at `path`.
pub fn load(path: impl AsRef<Path>) -> ReportResult<ReportSummary> {
    let bytes = std::fs::read(path)?;
    let xml = String::from_utf8(bytes)?;
    parse_xml(&xml)
}

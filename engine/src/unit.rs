use crate::context::RunContext;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Why a single case (or a suite hook) did not pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaseError {
    /// An expectation inside the case did not hold. Reported as a JUnit failure.
    #[error("{message}")]
    Assertion { message: String },

    /// The case could not complete. Reported as a JUnit error.
    #[error("{kind}: {message}")]
    Error { kind: String, message: String },

    /// The case chose not to run.
    #[error("skipped: {reason}")]
    Skipped { reason: String },
}

impl CaseError {
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for CaseError {
    fn from(err: std::io::Error) -> Self {
        Self::error("io", err.to_string())
    }
}

pub type CaseResult = Result<(), CaseError>;

/// Fails the case with `message` unless `condition` holds.
pub fn ensure(condition: bool, message: impl Into<String>) -> CaseResult {
    if condition {
        Ok(())
    } else {
        Err(CaseError::assertion(message))
    }
}

/// Fails the case unless `actual == expected`, naming both values.
pub fn ensure_eq<T>(actual: T, expected: T, what: &str) -> CaseResult
where
    T: PartialEq + fmt::Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(CaseError::assertion(format!(
            "{what}: expected {expected:?} but was {actual:?}"
        )))
    }
}

type CaseFn = Box<dyn Fn(&RunContext) -> CaseResult + Send + Sync>;

/// One named test method of a unit.
pub struct TestCase {
    name: String,
    func: CaseFn,
}

impl TestCase {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&RunContext) -> CaseResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self, ctx: &RunContext) -> CaseResult {
        (self.func)(ctx)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// A named, self-contained piece of test logic that the engine runs once.
pub trait TestUnit: Send + Sync {
    fn name(&self) -> &str;

    /// Cases in the order they are executed.
    fn cases(&self) -> &[TestCase];

    /// Runs once before the first case. A failure here errors every case.
    fn set_up(&self, _ctx: &RunContext) -> CaseResult {
        Ok(())
    }

    /// Runs once after the last case, even if cases failed.
    fn tear_down(&self, _ctx: &RunContext) -> CaseResult {
        Ok(())
    }
}

type HookFn = Box<dyn Fn(&RunContext) -> CaseResult + Send + Sync>;

/// Builder-style [`TestUnit`] made of closures.
pub struct Suite {
    name: String,
    cases: Vec<TestCase>,
    set_up: Option<HookFn>,
    tear_down: Option<HookFn>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            set_up: None,
            tear_down: None,
        }
    }

    pub fn case<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&RunContext) -> CaseResult + Send + Sync + 'static,
    {
        self.cases.push(TestCase::new(name, func));
        self
    }

    pub fn with_set_up<F>(mut self, func: F) -> Self
    where
        F: Fn(&RunContext) -> CaseResult + Send + Sync + 'static,
    {
        self.set_up = Some(Box::new(func));
        self
    }

    pub fn with_tear_down<F>(mut self, func: F) -> Self
    where
        F: Fn(&RunContext) -> CaseResult + Send + Sync + 'static,
    {
        self.tear_down = Some(Box::new(func));
        self
    }
}

impl TestUnit for Suite {
    fn name(&self) -> &str {
        &self.name
    }

    fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    fn set_up(&self, ctx: &RunContext) -> CaseResult {
        match &self.set_up {
            Some(hook) => hook(ctx),
            None => Ok(()),
        }
    }

    fn tear_down(&self, ctx: &RunContext) -> CaseResult {
        match &self.tear_down {
            Some(hook) => hook(ctx),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("cases", &self.cases)
            .field("set_up", &self.set_up.is_some())
            .field("tear_down", &self.tear_down.is_some())
            .finish()
    }
}

/// Units the engine can run, keyed by name.
pub struct UnitRegistry {
    units: HashMap<String, Box<dyn TestUnit>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
        }
    }

    /// Registers a unit, replacing any unit previously registered under the same name.
    pub fn register(&mut self, unit: Box<dyn TestUnit>) {
        let name = unit.name().to_string();
        self.units.insert(name, unit);
    }

    pub fn get(&self, name: &str) -> Option<&dyn TestUnit> {
        self.units.get(name).map(|u| u.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list_units(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.units.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_helpers() {
        assert!(ensure(true, "never shown").is_ok());
        assert_eq!(
            ensure(false, "value was negative"),
            Err(CaseError::assertion("value was negative"))
        );

        assert!(ensure_eq(2 + 2, 4, "sum").is_ok());
        let err = ensure_eq("a", "b", "letter").unwrap_err();
        assert_eq!(err.to_string(), "letter: expected \"b\" but was \"a\"");
    }

    #[test]
    fn test_suite_runs_cases_with_context() {
        let suite = Suite::new("demo.Suite")
            .case("first", |_| Ok(()))
            .case("reads_location", |ctx| {
                ensure_eq(ctx.data_location().to_str(), Some("/data"), "location")
            });

        let ctx = RunContext::new("/data");
        assert_eq!(suite.name(), "demo.Suite");
        assert_eq!(suite.cases().len(), 2);
        assert_eq!(suite.cases()[1].name(), "reads_location");
        for case in suite.cases() {
            assert!(case.run(&ctx).is_ok());
        }
    }

    #[test]
    fn test_suite_hooks_default_to_ok() {
        let ctx = RunContext::new("/data");
        let plain = Suite::new("plain");
        assert!(plain.set_up(&ctx).is_ok());
        assert!(plain.tear_down(&ctx).is_ok());

        let broken =
            Suite::new("broken").with_set_up(|_| Err(CaseError::error("io", "no fixture")));
        assert_eq!(
            broken.set_up(&ctx).unwrap_err().to_string(),
            "io: no fixture"
        );
    }

    #[test]
    fn test_unit_registry() {
        let mut registry = UnitRegistry::new();
        assert!(registry.is_empty());

        registry.register(Box::new(Suite::new("b.Suite")));
        registry.register(Box::new(Suite::new("a.Suite").case("x", |_| Ok(()))));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list_units(), vec!["a.Suite", "b.Suite"]);
        assert!(registry.contains("a.Suite"));
        assert!(registry.get("a.Suite").is_some());
        assert!(registry.get("missing.Suite").is_none());

        registry.register(Box::new(Suite::new("a.Suite")));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a.Suite").map(|u| u.cases().len()), Some(0));
    }

    #[test]
    fn test_io_errors_become_case_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.txt");
        let err: CaseError = io.into();
        assert!(matches!(err, CaseError::Error { ref kind, .. } if kind == "io"));
    }
}

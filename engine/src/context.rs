use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Key under which the data location is published to test units.
pub const DATA_LOCATION_KEY: &str = "data.location";

/// Read-only configuration handed to every test unit hook for the duration of a run.
///
/// The context is built once by the caller before the engine starts and is only
/// borrowed afterwards, so units observe the same values from set-up to tear-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    data_location: PathBuf,
    properties: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(data_location: impl Into<PathBuf>) -> Self {
        let data_location = data_location.into();
        let mut properties = BTreeMap::new();
        properties.insert(
            DATA_LOCATION_KEY.to_string(),
            data_location.to_string_lossy().into_owned(),
        );
        Self {
            data_location,
            properties,
        }
    }

    /// Adds an extra property. `data.location` cannot be overridden.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key != DATA_LOCATION_KEY {
            self.properties.insert(key, value.into());
        }
        self
    }

    pub fn data_location(&self) -> &Path {
        &self.data_location
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|v| v.as_str())
    }

    /// All properties in key order, as they appear in the XML report.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

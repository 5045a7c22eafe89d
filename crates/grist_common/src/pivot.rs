//! Pivot sets: the named dimensions (locale, theme, ...) an output varies by.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A set of pivot dimensions and their values for one content item.
///
/// Backed by a `BTreeMap` so iteration, serialization and fingerprinting are
/// always in dimension-name order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PivotSet(BTreeMap<String, String>);

impl PivotSet {
    /// Locale dimension, e.g. `en-us` or `generic-generic`.
    pub const LOCALE: &'static str = "locale";
    /// Theme dimension.
    pub const THEME: &'static str = "theme";
    /// Resolution dimension for image outputs.
    pub const DPI: &'static str = "dpi";
    /// Named resource group dimension.
    pub const RESOURCE_GROUP: &'static str = "resource-group";

    /// Creates an empty pivot set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with the given dimension set.
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(dimension, value);
        self
    }

    /// Sets a dimension, replacing any previous value.
    pub fn insert(&mut self, dimension: impl Into<String>, value: impl Into<String>) {
        self.0.insert(dimension.into(), value.into());
    }

    /// Looks up the value of a dimension.
    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.0.get(dimension).map(String::as_str)
    }

    /// The locale pivot, if set.
    pub fn locale(&self) -> Option<&str> {
        self.get(Self::LOCALE)
    }

    /// The theme pivot, if set.
    pub fn theme(&self) -> Option<&str> {
        self.get(Self::THEME)
    }

    /// Returns `true` if no dimension is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates dimensions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for PivotSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

//! Hierarchical section identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Separator between identifier parts.
pub const SEPARATOR: char = '.';

/// The name of a unit of cacheable work, e.g.
/// `Everything.CssFileSet.site.Bundle`.
///
/// The joined form doubles as the timing/tracing name, so two sections with
/// the same parts are reported under the same measurement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId {
    parts: Vec<String>,
}

impl SectionId {
    /// Builds an identifier from its ordered parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns a new identifier with `part` appended.
    pub fn child(&self, part: impl Into<String>) -> Self {
        let mut parts = self.parts.clone();
        parts.push(part.into());
        Self { parts }
    }

    /// The ordered parts.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Returns `true` if this identifier starts with all of `prefix`'s parts.
    pub fn starts_with(&self, prefix: &SectionId) -> bool {
        self.parts.starts_with(&prefix.parts)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl Serialize for SectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.parts)
    }
}

impl<'de> Deserialize<'de> for SectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = Vec::<String>::deserialize(deserializer)?;
        Ok(Self { parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_dots() {
        let id = SectionId::new(["Everything", "CssFileSet"]).child("Bundle");
        assert_eq!(id.to_string(), "Everything.CssFileSet.Bundle");
        assert_eq!(id.parts().len(), 3);
    }

    #[test]
    fn prefix_match() {
        let parent = SectionId::new(["MinifyCss"]);
        let child = parent.child("Sprite");
        assert!(child.starts_with(&parent));
        assert!(!parent.starts_with(&child));
    }

    #[test]
    fn parts_survive_serde() {
        // "a.b" + "c" and "a" + "b.c" display the same but are distinct ids.
        let a = SectionId::new(["a.b", "c"]);
        let b = SectionId::new(["a", "b.c"]);
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a, b);
        let json = serde_json::to_string(&a).unwrap();
        let back: SectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }
}

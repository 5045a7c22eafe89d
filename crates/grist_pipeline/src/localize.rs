//! Locale and theme token replacement.
//!
//! Resource files are flat JSON objects of string values. A token is written
//! `%NAME%`, where the name starts with a letter or underscore and continues
//! with letters, digits, `_`, `-` or `.`. Anything else between percent signs
//! (such as `50% 50%`) is left alone.

use std::collections::BTreeMap;
use std::path::Path;

use grist_common::{IssueCode, PivotSet, WorkIssue};

/// Token values by name.
pub type Resources = BTreeMap<String, String>;

/// Reads a resource file.
///
/// A missing file is a [`IssueCode::MissingInput`] issue; a file that is not a
/// flat object of strings is an [`IssueCode::InvalidResource`] issue.
pub fn load_resources(path: &Path) -> Result<Resources, WorkIssue> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WorkIssue::new(
            IssueCode::MissingInput,
            format!("cannot read resource file {}: {e}", path.display()),
        )
    })?;
    serde_json::from_str(&content).map_err(|e| {
        WorkIssue::new(
            IssueCode::InvalidResource,
            format!("invalid resource file {}: {e}", path.display()),
        )
    })
}

/// One output variant: its pivots and the merged token values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Locale and theme of the variant.
    pub pivots: PivotSet,
    /// Locale values overlaid with theme values.
    pub resources: Resources,
}

/// Builds one variant per locale and theme combination.
///
/// With no locales and no themes there is a single variant without pivots
/// or values.
pub fn variants(locales: &[(String, Resources)], themes: &[(String, Resources)]) -> Vec<Variant> {
    let none = [(String::new(), Resources::new())];
    let locales: &[(String, Resources)] = if locales.is_empty() { &none } else { locales };
    let themes: &[(String, Resources)] = if themes.is_empty() { &none } else { themes };

    let mut out = Vec::with_capacity(locales.len() * themes.len());
    for (locale, locale_values) in locales {
        for (theme, theme_values) in themes {
            let mut pivots = PivotSet::new();
            if !locale.is_empty() {
                pivots.insert(PivotSet::LOCALE, locale.as_str());
            }
            if !theme.is_empty() {
                pivots.insert(PivotSet::THEME, theme.as_str());
            }
            let mut resources = locale_values.clone();
            resources.extend(theme_values.iter().map(|(k, v)| (k.clone(), v.clone())));
            out.push(Variant { pivots, resources });
        }
    }
    out
}

/// Replaces `%NAME%` tokens with their values.
///
/// Returns the new text and the names of tokens without a value, in order of
/// first appearance. Unresolved tokens are kept verbatim.
pub fn replace_tokens(text: &str, resources: &Resources) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut unresolved: Vec<String> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match token_len(after) {
            Some(len) => {
                let name = &after[..len];
                match resources.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str(&rest[start..start + len + 2]);
                        if !unresolved.iter().any(|u| u == name) {
                            unresolved.push(name.to_string());
                        }
                    }
                }
                rest = &after[len + 1..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, unresolved)
}

/// Length of the token name at the start of `s` if it is followed by `%`.
fn token_len(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let (_, first) = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    for (i, c) in chars {
        if c == '%' {
            return Some(i);
        }
        if !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
            return None;
        }
    }
    None
}

//! Header redaction.

use crate::headers::MultiMap;
use http::HeaderMap;

/// Header names that must never appear in a captured snapshot.
///
/// Matching is an ASCII case-insensitive comparison of the whole name; there
/// are no wildcards or prefixes. The list is fixed once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionList {
    names: Vec<String>,
}

impl RedactionList {
    /// Build a list from configured names.
    ///
    /// Names are trimmed; blank names are dropped and repeated names (in any
    /// casing) are kept once, in first-seen order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || list.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                continue;
            }
            list.push(name.to_string());
        }
        Self { names: list }
    }

    /// Whether `name` is excluded from snapshots.
    pub fn excludes(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Copy every non-redacted header, keeping all values in order.
    ///
    /// Values that are not valid UTF-8 are captured lossily.
    pub fn capture(&self, headers: &HeaderMap) -> MultiMap {
        let mut captured = MultiMap::new();
        for (name, value) in headers {
            if self.excludes(name.as_str()) {
                continue;
            }
            captured.append(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        captured
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

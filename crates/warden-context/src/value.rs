//! Context values: `(key, raw, parsed)` triples.
//!
//! A [`ContextValue`] carries the raw string form it was stored or
//! supplied with, plus an optional [`ParsedValue`] produced by the key's
//! [`ContextDefinition`](crate::ContextDefinition). Equality and hashing
//! use only `(key, raw)` — the parsed form is derived data and may be
//! absent (lazily filled by the registry, or permanently absent for
//! malformed input).

use crate::cidr::CidrBlock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Typed form of a context value.
///
/// A closed set of variants: context sets must hold heterogeneous-typed
/// entries in one homogeneous container, so values are erased into this
/// enum and the owning [`ContextDefinition`](crate::ContextDefinition)
/// is looked up by key when typed behavior is needed.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    /// Plain string (world names, server tags).
    Str(String),
    /// Boolean flag (proxy connections).
    Bool(bool),
    /// IP network or single address.
    Cidr(CidrBlock),
    /// Instant in time, compared at second precision.
    Time(DateTime<Utc>),
}

/// One concrete context value: key, raw string form, optional typed form.
///
/// # Equality Semantics
///
/// `Eq`/`Hash`/`Ord` consider `(key, raw)` only. Two values with the
/// same key and raw form are the same context value regardless of
/// whether either has been resolved to a [`ParsedValue`].
///
/// # Example
///
/// ```
/// use warden_context::ContextValue;
///
/// let a = ContextValue::new("world", "nether");
/// let b = ContextValue::new("world", "nether");
/// assert_eq!(a, b);
/// assert_eq!(a.key(), "world");
/// assert_eq!(a.raw(), "nether");
/// assert!(a.parsed().is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextValue {
    key: String,
    #[serde(rename = "value")]
    raw: String,
    #[serde(skip)]
    parsed: Option<ParsedValue>,
}

impl ContextValue {
    /// Creates an unresolved context value from its key and raw form.
    #[must_use]
    pub fn new(key: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            raw: raw.into(),
            parsed: None,
        }
    }

    /// Creates a context value that already carries its typed form.
    #[must_use]
    pub fn resolved(key: impl Into<String>, raw: impl Into<String>, parsed: ParsedValue) -> Self {
        Self {
            key: key.into(),
            raw: raw.into(),
            parsed: Some(parsed),
        }
    }

    /// The context key, e.g. `"world"` or `"before-time"`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The raw string form this value was supplied with.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The typed form, if this value has been resolved.
    #[must_use]
    pub fn parsed(&self) -> Option<&ParsedValue> {
        self.parsed.as_ref()
    }

    /// Returns a copy of this value carrying the given typed form.
    #[must_use]
    pub fn with_parsed(&self, parsed: Option<ParsedValue>) -> Self {
        Self {
            key: self.key.clone(),
            raw: self.raw.clone(),
            parsed,
        }
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.raw == other.raw
    }
}

impl Eq for ContextValue {}

impl Hash for ContextValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.raw.hash(state);
    }
}

impl PartialOrd for ContextValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContextValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_parsed_form() {
        let plain = ContextValue::new("world", "nether");
        let typed = ContextValue::resolved("world", "nether", ParsedValue::Str("nether".into()));
        assert_eq!(plain, typed);

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(set.contains(&typed));
    }

    #[test]
    fn distinct_raw_forms_differ() {
        assert_ne!(
            ContextValue::new("world", "nether"),
            ContextValue::new("world", "overworld")
        );
        assert_ne!(
            ContextValue::new("world", "nether"),
            ContextValue::new("server-tag", "nether")
        );
    }

    #[test]
    fn ordering_is_key_then_raw() {
        let mut values = vec![
            ContextValue::new("world", "nether"),
            ContextValue::new("proxy", "true"),
            ContextValue::new("world", "end"),
        ];
        values.sort();
        let keys: Vec<_> = values.iter().map(|v| (v.key(), v.raw())).collect();
        assert_eq!(
            keys,
            vec![("proxy", "true"), ("world", "end"), ("world", "nether")]
        );
    }

    #[test]
    fn serde_drops_parsed_form() {
        let value = ContextValue::resolved("proxy", "true", ParsedValue::Bool(true));
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(json, r#"{"key":"proxy","value":"true"}"#);

        let parsed: ContextValue = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, value);
        assert!(parsed.parsed().is_none());
    }

    #[test]
    fn display_format() {
        assert_eq!(ContextValue::new("world", "nether").to_string(), "world=nether");
    }
}

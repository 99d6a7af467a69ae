//! Immutable sets of context values.
//!
//! A [`ContextSet`] is the unit both of *scoping* (attached to a stored
//! segment as its requirement) and of *querying* (the caller's active
//! contexts). Sets are order-irrelevant, unique by `(key, raw)`, cheap
//! to clone, and usable as hash-map keys — the engine's bake cache is
//! keyed by the exact active set.

use crate::value::ContextValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Immutable, order-irrelevant set of [`ContextValue`]s.
///
/// Internally a sorted, de-duplicated slice behind an `Arc`, so clones
/// are pointer copies and equality/hashing are order-independent by
/// construction.
///
/// The empty set is the *global* scope: it is satisfied by any active
/// set.
///
/// # Example
///
/// ```
/// use warden_context::{ContextSet, ContextValue};
///
/// let a = ContextSet::of([
///     ContextValue::new("world", "nether"),
///     ContextValue::new("server-tag", "good"),
/// ]);
/// let b = ContextSet::of([
///     ContextValue::new("server-tag", "good"),
///     ContextValue::new("world", "nether"),
/// ]);
/// assert_eq!(a, b); // order is irrelevant
/// assert_eq!(a.len(), 2);
/// assert!(ContextSet::empty().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextSet {
    entries: Arc<[ContextValue]>,
}

impl ContextSet {
    /// The empty (global-scope) set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
        }
    }

    /// Builds a set from any iterator of values, sorting and dropping
    /// `(key, raw)` duplicates.
    #[must_use]
    pub fn of(values: impl IntoIterator<Item = ContextValue>) -> Self {
        let mut entries: Vec<ContextValue> = values.into_iter().collect();
        entries.sort();
        entries.dedup();
        Self {
            entries: entries.into(),
        }
    }

    /// Returns a new set with `value` added (replacing an equal entry).
    #[must_use]
    pub fn with(&self, value: ContextValue) -> Self {
        Self::of(self.entries.iter().cloned().chain(std::iter::once(value)))
    }

    /// Returns a new set with every value under `key` removed.
    #[must_use]
    pub fn without_key(&self, key: &str) -> Self {
        Self::of(self.entries.iter().filter(|v| v.key() != key).cloned())
    }

    /// Number of values in the set. This is a segment's *specificity*:
    /// segments with more required values are more specific.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` for the global scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the values in sorted `(key, raw)` order.
    pub fn iter(&self) -> impl Iterator<Item = &ContextValue> {
        self.entries.iter()
    }

    /// Iterates the values stored under `key` (a key may carry several
    /// values, e.g. multiple server tags).
    pub fn values_for(&self, key: &str) -> impl Iterator<Item = &ContextValue> {
        let key = key.to_string();
        self.entries.iter().filter(move |v| v.key() == key)
    }

    /// Returns `true` if any value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|v| v.key() == key)
    }

    /// Returns `true` if the set contains this exact `(key, raw)` value.
    #[must_use]
    pub fn contains(&self, value: &ContextValue) -> bool {
        self.entries.binary_search(value).is_ok()
    }
}

impl Default for ContextSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<ContextValue> for ContextSet {
    fn from_iter<I: IntoIterator<Item = ContextValue>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl fmt::Display for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "(global)");
        }
        let mut first = true;
        for value in self.entries.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for ContextSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}

impl<'de> Deserialize<'de> for ContextSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<ContextValue>::deserialize(deserializer)?;
        Ok(Self::of(values))
    }
}

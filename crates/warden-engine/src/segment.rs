//! Segments: the smallest unit of stored permission data.
//!
//! A [`Segment`] bundles everything a subject declares under one context
//! set: a permission map, string options, an ordered parent list, an
//! optional fallback default, and an optional weight. Segments are
//! immutable — every `with_*` transform returns a new segment.
//!
//! # Shallow Permissions
//!
//! A permission entry may be *shallow*: visible on the declaring subject
//! and exactly one inheritance hop below it, then dropped. In stored
//! form a shallow entry's key carries a `#` prefix; in memory the marker
//! is a per-entry boolean tag ([`PermissionValue::shallow`]) so the
//! resolution pipeline never re-parses key strings.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use warden_types::SubjectRef;

/// A permission entry's value plus its shallow tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionValue {
    /// Signed weight; 0 is undefined, negative denies.
    pub value: i32,
    /// Propagates exactly one inheritance hop when `true`.
    pub shallow: bool,
}

impl PermissionValue {
    /// A plain (deep) entry.
    #[must_use]
    pub fn deep(value: i32) -> Self {
        Self {
            value,
            shallow: false,
        }
    }

    /// A shallow (one-hop) entry.
    #[must_use]
    pub fn shallow(value: i32) -> Self {
        Self {
            value,
            shallow: true,
        }
    }
}

/// Immutable bundle of permission data scoped to one context set.
///
/// # Example
///
/// ```
/// use warden_engine::Segment;
/// use warden_types::SubjectRef;
///
/// let segment = Segment::empty()
///     .with_permission("chat.color", 1)
///     .with_shallow_permission("admin.bypass", 1)
///     .with_option("prefix", "[mod]")
///     .with_parent(SubjectRef::new("group", "moderator"));
///
/// assert_eq!(segment.permissions().len(), 2);
/// assert!(segment.permissions()["admin.bypass"].shallow);
/// assert_eq!(segment.options()["prefix"], "[mod]");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(
        with = "shallow_codec",
        default,
        skip_serializing_if = "HashMap::is_empty"
    )]
    permissions: HashMap<String, PermissionValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    options: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    parents: Vec<SubjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weight: Option<i32>,
}

impl Segment {
    /// The segment with no data at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if the segment carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
            && self.options.is_empty()
            && self.parents.is_empty()
            && self.default_value.is_none()
            && self.weight.is_none()
    }

    /// The permission map. Keys are normalized to lowercase.
    #[must_use]
    pub fn permissions(&self) -> &HashMap<String, PermissionValue> {
        &self.permissions
    }

    /// The option map, in declaration order.
    #[must_use]
    pub fn options(&self) -> &IndexMap<String, String> {
        &self.options
    }

    /// The ordered parent list.
    #[must_use]
    pub fn parents(&self) -> &[SubjectRef] {
        &self.parents
    }

    /// The fallback default applied when a permission is undefined.
    #[must_use]
    pub fn default_value(&self) -> Option<i32> {
        self.default_value
    }

    /// The segment weight; lower sorts first.
    #[must_use]
    pub fn weight(&self) -> Option<i32> {
        self.weight
    }

    /// Returns a copy with `key` set to a deep `value`; 0 clears.
    #[must_use]
    pub fn with_permission(&self, key: &str, value: i32) -> Self {
        self.with_permission_entry(key, PermissionValue::deep(value))
    }

    /// Returns a copy with `key` set to a shallow `value`; 0 clears.
    #[must_use]
    pub fn with_shallow_permission(&self, key: &str, value: i32) -> Self {
        self.with_permission_entry(key, PermissionValue::shallow(value))
    }

    fn with_permission_entry(&self, key: &str, entry: PermissionValue) -> Self {
        let mut next = self.clone();
        let key = key.to_ascii_lowercase();
        if entry.value == 0 {
            next.permissions.remove(&key);
        } else {
            next.permissions.insert(key, entry);
        }
        next
    }

    /// Returns a copy with option `key` set to `value`.
    #[must_use]
    pub fn with_option(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.options.insert(key.into(), value.into());
        next
    }

    /// Returns a copy without option `key`.
    #[must_use]
    pub fn without_option(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.options.shift_remove(key);
        next
    }

    /// Returns a copy with `parent` appended (no-op if already listed).
    #[must_use]
    pub fn with_parent(&self, parent: SubjectRef) -> Self {
        if self.parents.contains(&parent) {
            return self.clone();
        }
        let mut next = self.clone();
        next.parents.push(parent);
        next
    }

    /// Returns a copy without `parent`.
    #[must_use]
    pub fn without_parent(&self, parent: &SubjectRef) -> Self {
        let mut next = self.clone();
        next.parents.retain(|p| p != parent);
        next
    }

    /// Returns a copy with the parent list replaced wholesale.
    #[must_use]
    pub fn with_parents(&self, parents: Vec<SubjectRef>) -> Self {
        let mut next = self.clone();
        next.parents = dedup_preserving_order(parents);
        next
    }

    /// Returns a copy with the fallback default set (or cleared).
    #[must_use]
    pub fn with_default_value(&self, default_value: Option<i32>) -> Self {
        let mut next = self.clone();
        next.default_value = default_value;
        next
    }

    /// Returns a copy with the weight set (or cleared).
    #[must_use]
    pub fn with_weight(&self, weight: Option<i32>) -> Self {
        let mut next = self.clone();
        next.weight = weight;
        next
    }

    /// Merges `other` over this segment.
    ///
    /// Permissions combine under the magnitude tie-break with `other`
    /// applied later (so `other` wins ties); options overwrite; parents
    /// concatenate de-duplicated preserving first occurrence; weight and
    /// default take `other`'s value when present.
    #[must_use]
    pub fn merge_from(&self, other: &Segment) -> Self {
        let mut permissions = self.permissions.clone();
        for (key, incoming) in &other.permissions {
            apply_tie_break(&mut permissions, key, *incoming);
        }

        let mut options = self.options.clone();
        for (key, value) in &other.options {
            options.insert(key.clone(), value.clone());
        }

        let mut parents = self.parents.clone();
        for parent in &other.parents {
            if !parents.contains(parent) {
                parents.push(parent.clone());
            }
        }

        Self {
            permissions,
            options,
            parents,
            default_value: other.default_value.or(self.default_value),
            weight: other.weight.or(self.weight),
        }
    }
}

/// Applies one permission entry under the magnitude tie-break rule:
/// the incoming entry replaces the current one unless its absolute
/// magnitude is strictly smaller.
pub(crate) fn apply_tie_break(
    dst: &mut HashMap<String, PermissionValue>,
    key: &str,
    incoming: PermissionValue,
) {
    match dst.get(key) {
        Some(current) if incoming.value.abs() < current.value.abs() => {}
        _ => {
            dst.insert(key.to_string(), incoming);
        }
    }
}

pub(crate) fn dedup_preserving_order(parents: Vec<SubjectRef>) -> Vec<SubjectRef> {
    let mut seen = Vec::with_capacity(parents.len());
    for parent in parents {
        if !seen.contains(&parent) {
            seen.push(parent);
        }
    }
    seen
}

mod shallow_codec {
    //! Stored-form codec for the permission map: shallow entries are
    //! written with a `#`-prefixed key and decoded back into the
    //! per-entry boolean tag.

    use super::PermissionValue;
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::Deserialize;
    use std::collections::HashMap;

    pub fn serialize<S: Serializer>(
        map: &HashMap<String, PermissionValue>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(map.iter().map(|(key, entry)| {
            let stored_key = if entry.shallow {
                format!("#{key}")
            } else {
                key.clone()
            };
            (stored_key, entry.value)
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, PermissionValue>, D::Error> {
        let raw = HashMap::<String, i32>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter(|(_, value)| *value != 0)
            .map(|(key, value)| match key.strip_prefix('#') {
                Some(stripped) => (
                    stripped.to_ascii_lowercase(),
                    PermissionValue::shallow(value),
                ),
                None => (key.to_ascii_lowercase(), PermissionValue::deep(value)),
            })
            .collect())
    }
}

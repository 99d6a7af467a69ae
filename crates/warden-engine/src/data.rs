//! Subject data: the full set of segments one subject declares.
//!
//! A [`SubjectData`] maps context sets to [`Segment`]s, in declaration
//! order. Like everything below the cache layer it is immutable —
//! transforms return new instances — so a loaded snapshot can be shared
//! between concurrent bakes without synchronization.
//!
//! Two instances exist per subject: the *persistent* one loaded from
//! the [`DataStore`](crate::DataStore), and the *transient* one that
//! lives only in memory. Which wins on conflict is decided per
//! collection (`transient_has_priority`).

use crate::segment::Segment;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use warden_context::ContextSet;
use warden_types::SubjectRef;

/// Immutable map from context set to segment, in declaration order.
///
/// Declaration order is observable: when two segments of equal
/// specificity both match a query, the later-declared one wins ties.
///
/// # Example
///
/// ```
/// use warden_engine::SubjectData;
/// use warden_context::{ContextSet, ContextValue};
///
/// let nether = ContextSet::of([ContextValue::new("world", "nether")]);
/// let data = SubjectData::empty()
///     .with_segment(&ContextSet::empty(), |s| s.with_permission("chat", 1))
///     .with_segment(&nether, |s| s.with_permission("fly", 1));
///
/// assert_eq!(data.len(), 2);
/// assert!(data.segment(&nether).is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectData {
    segments: IndexMap<ContextSet, Segment>,
}

impl SubjectData {
    /// Data with no segments.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if no segments are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// The segment declared for exactly `contexts`, if any.
    #[must_use]
    pub fn segment(&self, contexts: &ContextSet) -> Option<&Segment> {
        self.segments.get(contexts)
    }

    /// Iterates `(contexts, segment)` pairs in declaration order.
    pub fn segments(&self) -> impl Iterator<Item = (&ContextSet, &Segment)> {
        self.segments.iter()
    }

    /// Returns a copy with the segment at `contexts` replaced by
    /// `f(existing_or_empty)`.
    ///
    /// An absent segment is treated as empty before `f` is applied; a
    /// transform that returns an empty segment removes the entry.
    #[must_use]
    pub fn with_segment(
        &self,
        contexts: &ContextSet,
        f: impl FnOnce(&Segment) -> Segment,
    ) -> Self {
        let existing = self.segments.get(contexts).cloned().unwrap_or_default();
        let updated = f(&existing);

        let mut segments = self.segments.clone();
        if updated.is_empty() {
            segments.shift_remove(contexts);
        } else {
            segments.insert(contexts.clone(), updated);
        }
        Self { segments }
    }

    /// Returns a copy without the segment at `contexts`.
    #[must_use]
    pub fn without_segment(&self, contexts: &ContextSet) -> Self {
        let mut segments = self.segments.clone();
        segments.shift_remove(contexts);
        Self { segments }
    }

    /// Merges `other` over this data, context set by context set.
    ///
    /// Context sets present in both merge per [`Segment::merge_from`]
    /// with `other`'s segment applied later; context sets unique to
    /// either side are kept as-is. `other`'s unique sets append after
    /// this data's declarations.
    #[must_use]
    pub fn merge_from(&self, other: &SubjectData) -> Self {
        let mut segments = self.segments.clone();
        for (contexts, incoming) in &other.segments {
            let merged = match segments.get(contexts) {
                Some(existing) => existing.merge_from(incoming),
                None => incoming.clone(),
            };
            segments.insert(contexts.clone(), merged);
        }
        Self { segments }
    }

    /// Every parent referenced anywhere in this data, de-duplicated in
    /// declaration order. Used for dependency bookkeeping, not for
    /// resolution (resolution only considers matching segments).
    #[must_use]
    pub fn all_parents(&self) -> Vec<SubjectRef> {
        let mut parents = Vec::new();
        for segment in self.segments.values() {
            for parent in segment.parents() {
                if !parents.contains(parent) {
                    parents.push(parent.clone());
                }
            }
        }
        parents
    }
}

#[derive(Serialize, Deserialize)]
struct StoredSegment {
    #[serde(default)]
    contexts: ContextSet,
    segment: Segment,
}

impl Serialize for SubjectData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.segments.iter().map(|(contexts, segment)| StoredSegment {
            contexts: contexts.clone(),
            segment: segment.clone(),
        }))
    }
}

impl<'de> Deserialize<'de> for SubjectData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = Vec::<StoredSegment>::deserialize(deserializer)?;
        let mut segments = IndexMap::with_capacity(stored.len());
        for entry in stored {
            if !entry.segment.is_empty() {
                segments.insert(entry.contexts, entry.segment);
            }
        }
        Ok(Self { segments })
    }
}

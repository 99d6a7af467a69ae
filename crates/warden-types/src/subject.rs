//! Subject identity types.
//!
//! A [`SubjectRef`] names one subject — a user, a group, a system
//! principal — as a `(type, identifier)` pair. The pair is the unit of
//! addressing everywhere in Warden: parent lists in stored segments,
//! cache keys, invalidation listeners, and data-store lookups all speak
//! `SubjectRef`.
//!
//! # Fallback Subjects
//!
//! Every subject type has one *fallback subject* holding the data applied
//! to identifiers that have no data of their own. Fallback subjects live
//! in the reserved [`FALLBACK_TYPE`] collection and use the subject type
//! they cover as their identifier:
//!
//! ```text
//! ("user", "alice")            ordinary subject
//! ("fallback", "user")         fallback consulted for data-less users
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved subject type holding the per-type fallback subjects.
///
/// The engine registers this collection automatically; applications must
/// not register their own collection under this name.
pub const FALLBACK_TYPE: &str = "fallback";

/// Reference to a subject: a `(type, identifier)` pair.
///
/// Both components are caller-chosen strings. The type selects a
/// collection (e.g. `"user"`, `"group"`, `"system"`); the identifier
/// names one subject within it.
///
/// # Equality Semantics
///
/// Two references are equal iff both components are equal, byte for
/// byte. No case folding is applied; the embedding application owns its
/// identifier conventions.
///
/// # Example
///
/// ```
/// use warden_types::SubjectRef;
///
/// let alice = SubjectRef::new("user", "alice");
/// assert_eq!(alice.subject_type(), "user");
/// assert_eq!(alice.identifier(), "alice");
/// assert_eq!(alice.to_string(), "user:alice");
///
/// let fallback = SubjectRef::fallback("user");
/// assert!(fallback.is_fallback());
/// assert_eq!(fallback.identifier(), "user");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    /// Collection name, e.g. `"user"` or `"group"`.
    subject_type: String,
    /// Identifier within the collection.
    identifier: String,
}

impl SubjectRef {
    /// Creates a reference to the subject `identifier` in `subject_type`.
    #[must_use]
    pub fn new(subject_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Creates a reference to the fallback subject for `subject_type`.
    ///
    /// The fallback subject's data is substituted when a subject of
    /// `subject_type` has no persistent and no transient data at all.
    #[must_use]
    pub fn fallback(subject_type: impl Into<String>) -> Self {
        Self {
            subject_type: FALLBACK_TYPE.to_string(),
            identifier: subject_type.into(),
        }
    }

    /// The collection this reference points into.
    #[must_use]
    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    /// The identifier within the collection.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns `true` if this reference names a fallback subject.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.subject_type == FALLBACK_TYPE
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.identifier)
    }
}

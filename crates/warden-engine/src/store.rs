//! Data-store abstraction and the in-memory reference implementation.
//!
//! The engine never talks to a backend directly; everything flows
//! through [`DataStore`]. The contract deliberately separates *"does
//! this identifier have any stored data"* ([`DataStore::has_data`])
//! from *"what is its (possibly empty) data"* ([`DataStore::load`]) —
//! fallback-subject semantics depend on the distinction, and a load
//! failure must never be mistaken for "no data".

use crate::data::SubjectData;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use warden_types::{ErrorCode, SubjectRef};

/// Error from a data-store operation.
///
/// Store errors propagate to the caller of the subject operation that
/// triggered the I/O; they are never coerced into empty data and a
/// failed load is never cached.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    /// Retrying may succeed.
    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    /// The backend returned data that could not be decoded.
    #[error("stored data for {subject} is corrupt: {detail}")]
    Corrupt {
        /// Subject whose data failed to decode.
        subject: SubjectRef,
        /// Decoder diagnostic.
        detail: String,
    },
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "WARDEN_STORE_UNAVAILABLE",
            Self::Corrupt { .. } => "WARDEN_STORE_CORRUPT",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Persistence seam for subject data.
///
/// Implementations must be thread-safe; the engine calls them from
/// arbitrary tasks. All operations are async — a synchronous backend
/// simply returns ready futures.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Loads the subject's stored data. Absent data loads as empty;
    /// use [`has_data`](Self::has_data) to tell the two apart.
    async fn load(&self, subject: &SubjectRef) -> Result<SubjectData, StoreError>;

    /// Saves the subject's data, replacing any previous state.
    async fn save(&self, subject: &SubjectRef, data: &SubjectData) -> Result<(), StoreError>;

    /// Returns `true` if the backend holds any data for this subject,
    /// even empty data that was explicitly written.
    async fn has_data(&self, subject: &SubjectRef) -> Result<bool, StoreError>;

    /// Lists every identifier with stored data in `subject_type`.
    async fn list_identifiers(&self, subject_type: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory [`DataStore`]: the reference implementation and the test
/// double. Backed by a concurrent map; never fails.
///
/// # Example
///
/// ```
/// use warden_engine::{DataStore, MemoryDataStore, SubjectData};
/// use warden_types::SubjectRef;
///
/// async fn demo() -> Result<(), warden_engine::StoreError> {
///     let store = MemoryDataStore::new();
///     let alice = SubjectRef::new("user", "alice");
///
///     assert!(!store.has_data(&alice).await?);
///     store.save(&alice, &SubjectData::empty()).await?;
///     // Even explicitly-written empty data counts as data.
///     assert!(store.has_data(&alice).await?);
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    entries: DashMap<SubjectRef, SubjectData>,
}

impl MemoryDataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subjects with stored data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn load(&self, subject: &SubjectRef) -> Result<SubjectData, StoreError> {
        Ok(self
            .entries
            .get(subject)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, subject: &SubjectRef, data: &SubjectData) -> Result<(), StoreError> {
        self.entries.insert(subject.clone(), data.clone());
        Ok(())
    }

    async fn has_data(&self, subject: &SubjectRef) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(subject))
    }

    async fn list_identifiers(&self, subject_type: &str) -> Result<Vec<String>, StoreError> {
        let mut identifiers: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().subject_type() == subject_type)
            .map(|entry| entry.key().identifier().to_string())
            .collect();
        identifiers.sort();
        Ok(identifiers)
    }
}

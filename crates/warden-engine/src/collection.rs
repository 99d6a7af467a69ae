//! Subject collections: one per registered subject type.
//!
//! A collection owns the per-identifier data state — the cached
//! persistent snapshot, the transient (never persisted) data, and the
//! LRU-bounded map of [`CalculatedSubject`] cache objects. The bounded
//! map holds only derived state; evicting an entry costs a re-bake,
//! never data.

use crate::calculated::CalculatedSubject;
use crate::data::SubjectData;
use crate::store::{DataStore, StoreError};
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use warden_types::SubjectRef;

/// All state for one subject type.
pub struct SubjectCollection {
    name: String,
    transient_has_priority: bool,
    store: Arc<dyn DataStore>,
    /// Loaded persistent snapshots; `None` records "store has no data",
    /// which is what gates fallback-subject substitution.
    persistent: DashMap<String, Option<Arc<SubjectData>>>,
    /// In-memory-only data. Key presence means "something was written",
    /// even if the data is empty — that alone ends fallback lookup.
    transient: DashMap<String, Arc<SubjectData>>,
    calculated: Mutex<LruCache<String, Arc<CalculatedSubject>>>,
}

impl std::fmt::Debug for SubjectCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectCollection")
            .field("name", &self.name)
            .field("transient_has_priority", &self.transient_has_priority)
            .finish_non_exhaustive()
    }
}

impl SubjectCollection {
    pub(crate) fn new(
        name: impl Into<String>,
        transient_has_priority: bool,
        store: Arc<dyn DataStore>,
        capacity: NonZeroUsize,
    ) -> Self {
        Self {
            name: name.into(),
            transient_has_priority,
            store,
            persistent: DashMap::new(),
            transient: DashMap::new(),
            calculated: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The subject type this collection holds.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether transient data wins over persistent data on conflict.
    #[must_use]
    pub fn transient_has_priority(&self) -> bool {
        self.transient_has_priority
    }

    /// Returns the cache object for `identifier`, creating it on first
    /// access and refreshing its LRU position on every access.
    pub(crate) fn calculated(&self, identifier: &str) -> Arc<CalculatedSubject> {
        let mut calculated = self.calculated.lock();
        if let Some(existing) = calculated.get(identifier) {
            return Arc::clone(existing);
        }
        let created = Arc::new(CalculatedSubject::new(SubjectRef::new(
            self.name.clone(),
            identifier,
        )));
        calculated.put(identifier.to_string(), Arc::clone(&created));
        created
    }

    /// Returns the cache object for `identifier` only if it already
    /// exists, without disturbing LRU order.
    pub(crate) fn peek_calculated(&self, identifier: &str) -> Option<Arc<CalculatedSubject>> {
        self.calculated.lock().peek(identifier).cloned()
    }

    /// The persistent snapshot for `identifier`, loading through the
    /// store on first access. `Ok(None)` means the store has no data —
    /// distinct from empty data. Load failures propagate and are not
    /// cached.
    pub(crate) async fn persistent_data(
        &self,
        identifier: &str,
    ) -> Result<Option<Arc<SubjectData>>, StoreError> {
        if let Some(cached) = self.persistent.get(identifier) {
            return Ok(cached.value().clone());
        }
        let subject = SubjectRef::new(self.name.clone(), identifier);
        let loaded = if self.store.has_data(&subject).await? {
            Some(Arc::new(self.store.load(&subject).await?))
        } else {
            None
        };
        self.persistent
            .insert(identifier.to_string(), loaded.clone());
        Ok(loaded)
    }

    /// The transient data for `identifier`, if any was ever written.
    pub(crate) fn transient_data(&self, identifier: &str) -> Option<Arc<SubjectData>> {
        self.transient.get(identifier).map(|e| Arc::clone(e.value()))
    }

    /// Replaces the cached persistent snapshot after a successful save.
    pub(crate) fn set_persistent(&self, identifier: &str, data: SubjectData) {
        self.persistent
            .insert(identifier.to_string(), Some(Arc::new(data)));
    }

    /// Applies `f` to the existing-or-empty transient data. The result
    /// is stored even when empty: any transient write permanently ends
    /// fallback lookup for this identifier.
    pub(crate) fn update_transient(
        &self,
        identifier: &str,
        f: impl FnOnce(&SubjectData) -> SubjectData,
    ) {
        let current = self
            .transient_data(identifier)
            .unwrap_or_else(|| Arc::new(SubjectData::empty()));
        let updated = f(&current);
        self.transient
            .insert(identifier.to_string(), Arc::new(updated));
    }

    /// Resolves the subject's effective data: transient and persistent
    /// merged with the collection's priority side applied last.
    ///
    /// `Ok(None)` means the subject has no data *at all* — no persistent
    /// and no transient — which is the condition for fallback-subject
    /// substitution.
    pub(crate) async fn resolved_data(
        &self,
        identifier: &str,
    ) -> Result<Option<SubjectData>, StoreError> {
        let persistent = self.persistent_data(identifier).await?;
        let transient = self.transient_data(identifier);

        Ok(match (persistent, transient) {
            (None, None) => None,
            (Some(p), None) => Some((*p).clone()),
            (None, Some(t)) => Some((*t).clone()),
            (Some(p), Some(t)) => Some(if self.transient_has_priority {
                p.merge_from(&t)
            } else {
                t.merge_from(&p)
            }),
        })
    }

    /// Drops the cached persistent snapshot so the next access reloads
    /// from the store.
    pub(crate) fn evict_persistent(&self, identifier: &str) {
        self.persistent.remove(identifier);
    }
}

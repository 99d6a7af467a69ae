//! Per-subject bake cache with coalescing and epoch invalidation.
//!
//! A [`CalculatedSubject`] is the live, cached view of one subject:
//! baked results keyed by the exact active context set, an in-flight
//! map that coalesces concurrent bakes of the same key, an epoch
//! counter implementing last-invalidation-wins, and the lazily-filled
//! set of dependents to notify when this subject changes.
//!
//! The object owns no subject *data* — persistent and transient data
//! live on the collection — so evicting a `CalculatedSubject` from the
//! LRU bound can never lose a write.

use crate::bake::BakedSubjectData;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use warden_context::ContextSet;
use warden_types::SubjectRef;

/// Outcome of trying to start a bake for one `(subject, active)` key.
pub(crate) enum BakeTicket {
    /// No bake is in flight; the caller computes and must call
    /// [`CalculatedSubject::finish_bake`] when done, then complete the
    /// sender.
    Leader(watch::Sender<bool>),
    /// Another caller is already baking this key; await a change on the
    /// receiver, then re-check the cache.
    Follower(watch::Receiver<bool>),
}

/// Live cached view of one subject identifier.
#[derive(Debug)]
pub struct CalculatedSubject {
    subject: SubjectRef,
    cache: Mutex<HashMap<ContextSet, Arc<BakedSubjectData>>>,
    inflight: Mutex<HashMap<ContextSet, watch::Receiver<bool>>>,
    epoch: AtomicU64,
    listeners: Mutex<HashSet<SubjectRef>>,
}

impl CalculatedSubject {
    pub(crate) fn new(subject: SubjectRef) -> Self {
        Self {
            subject,
            cache: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            listeners: Mutex::new(HashSet::new()),
        }
    }

    /// The subject this view caches.
    #[must_use]
    pub fn subject(&self) -> &SubjectRef {
        &self.subject
    }

    /// The cached bake for exactly `active`, if present.
    ///
    /// Lookup is by set equality — never a superset or subset search.
    #[must_use]
    pub fn cached(&self, active: &ContextSet) -> Option<Arc<BakedSubjectData>> {
        self.cache.lock().get(active).cloned()
    }

    /// Number of cached bakes.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// The current invalidation epoch. Read before baking; pass back to
    /// [`store_if_current`](Self::store_if_current).
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Inserts a baked result unless an invalidation happened since
    /// `started_epoch` was read. Returns `false` when the result was
    /// discarded as stale.
    pub(crate) fn store_if_current(
        &self,
        active: &ContextSet,
        started_epoch: u64,
        baked: Arc<BakedSubjectData>,
    ) -> bool {
        let cache = &mut *self.cache.lock();
        if self.epoch.load(Ordering::Acquire) != started_epoch {
            return false;
        }
        cache.insert(active.clone(), baked);
        true
    }

    /// Claims the bake for `active` or joins one already in flight.
    pub(crate) fn begin_bake(&self, active: &ContextSet) -> BakeTicket {
        let mut inflight = self.inflight.lock();
        if let Some(rx) = inflight.get(active) {
            return BakeTicket::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(false);
        inflight.insert(active.clone(), rx);
        BakeTicket::Leader(tx)
    }

    /// Removes the in-flight marker for `active`. The leader calls this
    /// before completing its watch sender, whether the bake succeeded
    /// or failed — a failed bake leaves no cache entry, so followers
    /// re-check and retry.
    pub(crate) fn finish_bake(&self, active: &ContextSet) {
        self.inflight.lock().remove(active);
    }

    /// Registers a dependent to notify when this subject's baked state
    /// changes. Called when a bake actually traverses the edge, never
    /// eagerly.
    pub(crate) fn add_listener(&self, dependent: SubjectRef) {
        if dependent == self.subject {
            return;
        }
        self.listeners.lock().insert(dependent);
    }

    /// Drops all cached bakes, bumps the epoch so in-flight results are
    /// discarded on arrival, and returns the dependents to notify.
    ///
    /// Listeners are kept registered: over-notification is harmless,
    /// a missed edge is not.
    pub(crate) fn invalidate(&self) -> Vec<SubjectRef> {
        {
            let cache = &mut *self.cache.lock();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            cache.clear();
        }
        self.listeners.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> CalculatedSubject {
        CalculatedSubject::new(SubjectRef::new("user", "alice"))
    }

    fn baked() -> Arc<BakedSubjectData> {
        Arc::new(BakedSubjectData::empty())
    }

    #[test]
    fn cache_is_keyed_by_exact_set() {
        let calc = subject();
        let epoch = calc.epoch();
        calc.store_if_current(&ContextSet::empty(), epoch, baked());

        assert!(calc.cached(&ContextSet::empty()).is_some());
        let other = ContextSet::of([warden_context::ContextValue::new("world", "nether")]);
        assert!(calc.cached(&other).is_none());
    }

    #[test]
    fn invalidation_clears_cache() {
        let calc = subject();
        let epoch = calc.epoch();
        calc.store_if_current(&ContextSet::empty(), epoch, baked());
        assert_eq!(calc.cached_len(), 1);

        calc.invalidate();
        assert_eq!(calc.cached_len(), 0);
    }

    #[test]
    fn stale_result_is_discarded() {
        let calc = subject();
        let epoch = calc.epoch();
        calc.invalidate();
        // Result computed against the old epoch arrives late.
        assert!(!calc.store_if_current(&ContextSet::empty(), epoch, baked()));
        assert!(calc.cached(&ContextSet::empty()).is_none());
    }

    #[test]
    fn current_result_is_stored() {
        let calc = subject();
        calc.invalidate();
        let epoch = calc.epoch();
        assert!(calc.store_if_current(&ContextSet::empty(), epoch, baked()));
        assert!(calc.cached(&ContextSet::empty()).is_some());
    }

    #[test]
    fn leader_then_followers() {
        let calc = subject();
        let ticket = calc.begin_bake(&ContextSet::empty());
        assert!(matches!(ticket, BakeTicket::Leader(_)));

        let second = calc.begin_bake(&ContextSet::empty());
        assert!(matches!(second, BakeTicket::Follower(_)));

        calc.finish_bake(&ContextSet::empty());
        let third = calc.begin_bake(&ContextSet::empty());
        assert!(matches!(third, BakeTicket::Leader(_)));
    }

    #[test]
    fn listeners_are_deduplicated_and_survive_invalidation() {
        let calc = subject();
        let bob = SubjectRef::new("user", "bob");
        calc.add_listener(bob.clone());
        calc.add_listener(bob.clone());

        assert_eq!(calc.invalidate(), vec![bob.clone()]);
        // Still registered after notification.
        assert_eq!(calc.invalidate(), vec![bob]);
    }

    #[test]
    fn self_edges_are_ignored() {
        let calc = subject();
        calc.add_listener(SubjectRef::new("user", "alice"));
        assert!(calc.invalidate().is_empty());
    }
}

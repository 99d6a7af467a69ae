//! Caching contract: idempotent repeat queries, request coalescing,
//! invalidation cascades, and failed operations staying out of the
//! cache.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use warden_context::ContextSet;
use warden_engine::{
    DataStore, DirectExecutor, MemoryDataStore, PermissionEngine, StoreError, SubjectData,
};
use warden_types::SubjectRef;

/// Store wrapper that counts backend calls, so tests can prove whether
/// a query recomputed or came from cache.
#[derive(Default)]
struct CountingStore {
    inner: MemoryDataStore,
    loads: AtomicU64,
    has_data_calls: AtomicU64,
    saves: AtomicU64,
}

impl CountingStore {
    fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    fn backend_reads(&self) -> u64 {
        self.loads() + self.has_data_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for CountingStore {
    async fn load(&self, subject: &SubjectRef) -> Result<SubjectData, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(subject).await
    }

    async fn save(&self, subject: &SubjectRef, data: &SubjectData) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(subject, data).await
    }

    async fn has_data(&self, subject: &SubjectRef) -> Result<bool, StoreError> {
        self.has_data_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.has_data(subject).await
    }

    async fn list_identifiers(&self, subject_type: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_identifiers(subject_type).await
    }
}

/// Store whose reads can be switched to fail, for error-path tests.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryDataStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataStore for FlakyStore {
    async fn load(&self, subject: &SubjectRef) -> Result<SubjectData, StoreError> {
        self.check()?;
        self.inner.load(subject).await
    }

    async fn save(&self, subject: &SubjectRef, data: &SubjectData) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save(subject, data).await
    }

    async fn has_data(&self, subject: &SubjectRef) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.has_data(subject).await
    }

    async fn list_identifiers(&self, subject_type: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        self.inner.list_identifiers(subject_type).await
    }
}

fn engine_over(store: Arc<dyn DataStore>) -> PermissionEngine {
    PermissionEngine::builder(store)
        .with_executor(Arc::new(DirectExecutor))
        .register_collection("user", true)
        .register_collection("group", false)
        .build()
}

#[tokio::test]
async fn repeat_queries_hit_the_cache() {
    let store = Arc::new(CountingStore::default());
    let engine = engine_over(Arc::clone(&store) as Arc<dyn DataStore>);
    let alice = SubjectRef::new("user", "alice");

    engine
        .update_persistent(&alice, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("chat", 1))
        })
        .await
        .expect("write");

    let subject = engine.subject("user", "alice").expect("subject");
    let first = subject
        .permissions(&ContextSet::empty())
        .await
        .expect("query");
    let reads_after_first = store.backend_reads();

    let second = subject
        .permissions(&ContextSet::empty())
        .await
        .expect("query");
    assert_eq!(first, second);
    // No recomputation observable at the data collaborator.
    assert_eq!(store.backend_reads(), reads_after_first);
}

#[tokio::test]
async fn concurrent_queries_coalesce_to_one_bake() {
    let store = Arc::new(CountingStore::default());
    let engine = engine_over(Arc::clone(&store) as Arc<dyn DataStore>);

    let subject = engine.subject("user", "alice").expect("subject");
    let global = ContextSet::empty();

    let (a, b, c) = tokio::join!(
        subject.permission_value(&global, "chat"),
        subject.permission_value(&global, "chat"),
        subject.permission_value(&global, "chat"),
    );
    assert_eq!(a.expect("query"), 0);
    assert_eq!(b.expect("query"), 0);
    assert_eq!(c.expect("query"), 0);

    // One has_data probe for alice and one for the fallback subject —
    // not one per caller.
    assert!(store.backend_reads() <= 2, "reads: {}", store.backend_reads());
}

#[tokio::test]
async fn own_write_invalidates_before_returning() {
    let store = Arc::new(CountingStore::default());
    let engine = engine_over(Arc::clone(&store) as Arc<dyn DataStore>);
    let alice = SubjectRef::new("user", "alice");
    let subject = engine.subject("user", "alice").expect("subject");

    engine
        .update_transient(&alice, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("fly", 1))
        })
        .expect("write");
    assert!(subject
        .has_permission(&ContextSet::empty(), "fly")
        .await
        .expect("query"));

    engine
        .update_transient(&alice, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("fly", 0))
        })
        .expect("write");
    // The stale cached result is gone as soon as the write returned.
    assert!(!subject
        .has_permission(&ContextSet::empty(), "fly")
        .await
        .expect("query"));
}

#[tokio::test]
async fn ancestor_write_cascades_to_dependents() {
    let store = Arc::new(CountingStore::default());
    let engine = engine_over(Arc::clone(&store) as Arc<dyn DataStore>);
    let staff = SubjectRef::new("group", "staff");

    engine
        .update_persistent(&staff, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("kick", 1))
        })
        .await
        .expect("write group");
    engine
        .update_transient(&SubjectRef::new("user", "alice"), |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_parent(staff.clone()))
        })
        .expect("write user");

    let alice = engine.subject("user", "alice").expect("subject");
    assert!(alice
        .has_permission(&ContextSet::empty(), "kick")
        .await
        .expect("query"));

    // Revoke on the ancestor; the cascade (synchronous under
    // DirectExecutor) invalidates alice's cached bake.
    engine
        .update_persistent(&staff, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("kick", 0))
        })
        .await
        .expect("revoke");

    assert!(!alice
        .has_permission(&ContextSet::empty(), "kick")
        .await
        .expect("query"));
}

#[tokio::test]
async fn cascade_survives_cyclic_dependents() {
    let store = Arc::new(CountingStore::default());
    let engine = engine_over(Arc::clone(&store) as Arc<dyn DataStore>);
    let a = SubjectRef::new("group", "a");
    let b = SubjectRef::new("group", "b");

    engine
        .update_persistent(&a, |data| {
            data.with_segment(&ContextSet::empty(), |s| {
                s.with_permission("from.a", 1).with_parent(b.clone())
            })
        })
        .await
        .expect("write a");
    engine
        .update_persistent(&b, |data| {
            data.with_segment(&ContextSet::empty(), |s| {
                s.with_permission("from.b", 1).with_parent(a.clone())
            })
        })
        .await
        .expect("write b");

    let subject_a = engine.subject("group", "a").expect("subject");
    assert!(subject_a
        .has_permission(&ContextSet::empty(), "from.b")
        .await
        .expect("query"));

    // Both sides now hold listener edges pointing at each other. The
    // cascade's visited set keeps this from looping forever.
    engine
        .update_persistent(&a, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("late", 1))
        })
        .await
        .expect("rewrite a");

    assert!(subject_a
        .has_permission(&ContextSet::empty(), "late")
        .await
        .expect("query"));
}

#[tokio::test]
async fn load_failure_surfaces_and_is_not_cached() {
    let store = Arc::new(FlakyStore::default());
    let engine = engine_over(Arc::clone(&store) as Arc<dyn DataStore>);

    // A fallback grant exists; a load failure must NOT be mistaken for
    // "no data" (which would wrongly serve the fallback permission).
    engine
        .update_persistent(&SubjectRef::fallback("user"), |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("spawn.join", 1))
        })
        .await
        .expect("write fallback");

    store.set_failing(true);
    let ghost = engine.subject("user", "ghost").expect("subject");
    let err = ghost
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect_err("outage must surface");
    assert_eq!(
        warden_types::ErrorCode::code(&err),
        "WARDEN_STORE_UNAVAILABLE"
    );

    // Recovery: the failure poisoned nothing, the next query succeeds
    // and now legitimately sees the fallback grant.
    store.set_failing(false);
    assert!(ghost
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query after recovery"));
}

#[tokio::test]
async fn failed_save_leaves_state_untouched() {
    let store = Arc::new(FlakyStore::default());
    let engine = engine_over(Arc::clone(&store) as Arc<dyn DataStore>);
    let alice = SubjectRef::new("user", "alice");

    engine
        .update_persistent(&alice, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("chat", 1))
        })
        .await
        .expect("initial write");

    store.set_failing(true);
    let err = engine
        .update_persistent(&alice, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("chat", 0))
        })
        .await
        .expect_err("save must fail");
    assert!(matches!(
        err,
        warden_engine::EngineError::Store(StoreError::Unavailable(_))
    ));

    store.set_failing(false);
    let subject = engine.subject("user", "alice").expect("subject");
    assert!(subject
        .has_permission(&ContextSet::empty(), "chat")
        .await
        .expect("query"));
}

#[tokio::test]
async fn explicit_invalidation_reloads_from_store() {
    let counting = Arc::new(CountingStore::default());
    let engine = engine_over(Arc::clone(&counting) as Arc<dyn DataStore>);
    let alice = SubjectRef::new("user", "alice");
    let subject = engine.subject("user", "alice").expect("subject");

    subject
        .permissions(&ContextSet::empty())
        .await
        .expect("query");
    let loads_before = counting.loads();

    // Simulate an out-of-band store edit, then invalidate explicitly.
    counting
        .inner
        .save(
            &alice,
            &SubjectData::empty()
                .with_segment(&ContextSet::empty(), |s| s.with_permission("new", 1)),
        )
        .await
        .expect("out-of-band write");
    engine.invalidate_subject(&alice);

    assert!(subject
        .has_permission(&ContextSet::empty(), "new")
        .await
        .expect("query"));
    assert!(counting.loads() > loads_before);
}

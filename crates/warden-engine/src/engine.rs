//! The permission engine: collections, recursive baking, caching, and
//! invalidation propagation.
//!
//! # Architecture
//!
//! ```text
//! PermissionEngine (facade)
//!        │ subject(type, id)            fails fast on unknown types
//!        ▼
//! Subject (handle) ──► EngineInner::baked()
//!                            │  cache hit?  ──► return
//!                            │  miss: coalesce per (subject, active)
//!                            ▼
//!                      EngineInner::bake()
//!                            │  resolve data (transient ⊕ persistent,
//!                            │  fallback substitution when neither exists)
//!                            │  select + merge matching segments
//!                            │  recurse into parents (cycle-safe,
//!                            │  registers invalidation listeners)
//!                            ▼
//!                      BakedSubjectData ──► epoch-guarded cache insert
//! ```
//!
//! # Consistency
//!
//! A write invalidates the written subject's cache *before* the write
//! call returns; notification of dependent subjects is dispatched
//! through the [`Executor`] and may complete later. An invalidation
//! during an in-flight bake bumps the subject's epoch, so the stale
//! result is returned to its requester but never enters the cache.

use crate::bake::{self, BakedSubjectData};
use crate::calculated::{BakeTicket, CalculatedSubject};
use crate::collection::SubjectCollection;
use crate::data::SubjectData;
use crate::error::EngineError;
use crate::executor::{Executor, TokioExecutor};
use crate::observer::{CheckEvent, CheckKind, CheckObserver};
use crate::store::DataStore;
use crate::tree::NodeTree;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use warden_context::{ContextEnvironment, ContextRegistry, ContextSet};
use warden_types::{SubjectRef, FALLBACK_TYPE};

const DEFAULT_SUBJECT_CAPACITY: usize = 256;

/// Builder for [`PermissionEngine`].
pub struct PermissionEngineBuilder {
    store: Arc<dyn DataStore>,
    registry: ContextRegistry,
    environment: ContextEnvironment,
    executor: Arc<dyn Executor>,
    subject_capacity: NonZeroUsize,
    collections: Vec<(String, bool)>,
}

impl PermissionEngineBuilder {
    fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            registry: ContextRegistry::with_defaults(),
            environment: ContextEnvironment::new(),
            executor: Arc::new(TokioExecutor),
            subject_capacity: NonZeroUsize::new(DEFAULT_SUBJECT_CAPACITY)
                .expect("default capacity is non-zero"),
            collections: Vec::new(),
        }
    }

    /// Replaces the context registry (defaults to the built-ins).
    #[must_use]
    pub fn with_context_registry(mut self, registry: ContextRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the context environment consumed by `current_values`.
    #[must_use]
    pub fn with_environment(mut self, environment: ContextEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Replaces the task executor (defaults to [`TokioExecutor`]).
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Bounds the number of live [`CalculatedSubject`]s per collection.
    #[must_use]
    pub fn with_subject_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.subject_capacity = capacity;
        self
    }

    /// Registers a subject type. `transient_has_priority` decides
    /// whether in-memory data wins over stored data on conflict.
    #[must_use]
    pub fn register_collection(
        mut self,
        name: impl Into<String>,
        transient_has_priority: bool,
    ) -> Self {
        self.collections.push((name.into(), transient_has_priority));
        self
    }

    /// Builds the engine. The reserved fallback collection is always
    /// registered.
    #[must_use]
    pub fn build(self) -> PermissionEngine {
        let inner = Arc::new(EngineInner {
            store: self.store,
            registry: self.registry,
            environment: self.environment,
            executor: self.executor,
            subject_capacity: self.subject_capacity,
            collections: DashMap::new(),
            observer: RwLock::new(None),
            debug_enabled: AtomicBool::new(false),
        });
        let engine = PermissionEngine { inner };
        engine.register_collection(FALLBACK_TYPE, true);
        for (name, transient_has_priority) in self.collections {
            engine.register_collection(name, transient_has_priority);
        }
        engine
    }
}

pub(crate) struct EngineInner {
    store: Arc<dyn DataStore>,
    registry: ContextRegistry,
    environment: ContextEnvironment,
    executor: Arc<dyn Executor>,
    subject_capacity: NonZeroUsize,
    collections: DashMap<String, Arc<SubjectCollection>>,
    observer: RwLock<Option<CheckObserver>>,
    debug_enabled: AtomicBool,
}

impl EngineInner {
    fn collection(&self, name: &str) -> Result<Arc<SubjectCollection>, EngineError> {
        self.collections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::UnregisteredType(name.to_string()))
    }

    fn peek_calculated(&self, subject: &SubjectRef) -> Option<Arc<CalculatedSubject>> {
        self.collections
            .get(subject.subject_type())
            .and_then(|collection| collection.peek_calculated(subject.identifier()))
    }

    /// Top-level cached lookup with request coalescing.
    async fn baked(
        inner: &Arc<Self>,
        subject: &SubjectRef,
        active: &ContextSet,
    ) -> Result<Arc<BakedSubjectData>, EngineError> {
        let collection = inner.collection(subject.subject_type())?;
        let calc = collection.calculated(subject.identifier());
        loop {
            if let Some(hit) = calc.cached(active) {
                tracing::debug!(subject = %subject, "bake cache hit");
                return Ok(hit);
            }
            match calc.begin_bake(active) {
                BakeTicket::Follower(mut rx) => {
                    // A leader is baking this exact key; wait for it to
                    // finish, then re-check the cache. A failed bake
                    // leaves no entry, so this loop becomes the leader
                    // on the next pass and retries.
                    if rx.changed().await.is_err() {
                        // Leader vanished without completing: drop the
                        // abandoned in-flight marker and take over.
                        calc.finish_bake(active);
                    }
                }
                BakeTicket::Leader(tx) => {
                    let result =
                        Self::bake(inner, subject.clone(), active.clone(), Vec::new()).await;
                    calc.finish_bake(active);
                    let _ = tx.send(true);
                    return result;
                }
            }
        }
    }

    fn bake_boxed(
        inner: &Arc<Self>,
        subject: SubjectRef,
        active: ContextSet,
        stack: Vec<SubjectRef>,
    ) -> BoxFuture<'static, Result<Arc<BakedSubjectData>, EngineError>> {
        let inner = Arc::clone(inner);
        Box::pin(async move { Self::bake(&inner, subject, active, stack).await })
    }

    /// One full bake of `subject` under `active`.
    ///
    /// `stack` carries the identifiers currently being baked in this
    /// call chain; a parent already on it contributes nothing, which is
    /// what makes cyclic hierarchies terminate.
    async fn bake(
        inner: &Arc<Self>,
        subject: SubjectRef,
        active: ContextSet,
        stack: Vec<SubjectRef>,
    ) -> Result<Arc<BakedSubjectData>, EngineError> {
        let collection = inner.collection(subject.subject_type())?;
        let calc = collection.calculated(subject.identifier());
        let started_epoch = calc.epoch();
        tracing::debug!(subject = %subject, active = %active, "baking");

        let data = match collection.resolved_data(subject.identifier()).await? {
            Some(data) => data,
            None if !subject.is_fallback() => {
                // No persistent and no transient data at all: substitute
                // the fallback subject's data.
                let fallback = SubjectRef::fallback(subject.subject_type());
                let fallback_collection = inner.collection(FALLBACK_TYPE)?;
                fallback_collection
                    .calculated(fallback.identifier())
                    .add_listener(subject.clone());
                fallback_collection
                    .resolved_data(fallback.identifier())
                    .await?
                    .unwrap_or_default()
            }
            None => SubjectData::empty(),
        };

        let selected = bake::select_segments(data.segments(), &inner.registry, &active);
        let own = bake::merge_own(&selected);

        let mut next_stack = stack;
        next_stack.push(subject.clone());

        let mut parent_views = Vec::with_capacity(own.parents.len());
        for parent in &own.parents {
            if next_stack.contains(parent) {
                tracing::debug!(subject = %subject, parent = %parent, "inheritance cycle broken");
                continue;
            }
            let parent_collection = match inner.collection(parent.subject_type()) {
                Ok(found) => found,
                Err(_) => {
                    tracing::warn!(
                        subject = %subject,
                        parent = %parent,
                        "parent references unregistered subject type; ignoring"
                    );
                    continue;
                }
            };
            let parent_calc = parent_collection.calculated(parent.identifier());
            parent_calc.add_listener(subject.clone());

            // Recursive lookups use the cache but never join an
            // in-flight computation: two subjects concurrently baking
            // each other would otherwise wait on each other forever.
            let view = match parent_calc.cached(&active) {
                Some(hit) => hit,
                None => {
                    Self::bake_boxed(inner, parent.clone(), active.clone(), next_stack.clone())
                        .await?
                }
            };
            parent_views.push(view);
        }

        let baked = Arc::new(bake::assemble(own, &parent_views));
        if !calc.store_if_current(&active, started_epoch, Arc::clone(&baked)) {
            tracing::debug!(subject = %subject, "bake superseded by invalidation; result not cached");
        }
        Ok(baked)
    }

    /// Invalidates `subject`'s own cache synchronously, then cascades
    /// to registered dependents through the executor.
    fn invalidate(inner: &Arc<Self>, subject: &SubjectRef) {
        let Some(calc) = inner.peek_calculated(subject) else {
            return;
        };
        let listeners = calc.invalidate();
        tracing::debug!(subject = %subject, dependents = listeners.len(), "invalidated");
        if listeners.is_empty() {
            return;
        }

        let executor = Arc::clone(&inner.executor);
        let inner = Arc::clone(inner);
        let root = subject.clone();
        executor.spawn(Box::pin(async move {
            let mut visited: HashSet<SubjectRef> = HashSet::from([root]);
            let mut queue: VecDeque<SubjectRef> = listeners.into_iter().collect();
            while let Some(next) = queue.pop_front() {
                if !visited.insert(next.clone()) {
                    continue;
                }
                if let Some(calc) = inner.peek_calculated(&next) {
                    for dependent in calc.invalidate() {
                        queue.push_back(dependent);
                    }
                }
            }
        }));
    }

    fn observe(
        &self,
        subject: &SubjectRef,
        active: &ContextSet,
        kind: CheckKind,
        key: Option<&str>,
        value: String,
    ) {
        if !self.debug_enabled.load(Ordering::Relaxed) {
            return;
        }
        let guard = self.observer.read();
        if let Some(observer) = guard.as_ref() {
            observer.observe(&CheckEvent {
                subject: subject.clone(),
                active: active.clone(),
                kind,
                key: key.map(String::from),
                value,
            });
        }
    }
}

/// The engine facade.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use warden_engine::{MemoryDataStore, PermissionEngine};
/// use warden_context::ContextSet;
/// use warden_types::SubjectRef;
///
/// # async fn demo() -> Result<(), warden_engine::EngineError> {
/// let engine = PermissionEngine::builder(Arc::new(MemoryDataStore::new()))
///     .register_collection("user", true)
///     .register_collection("group", false)
///     .build();
///
/// engine.update_transient(&SubjectRef::new("user", "alice"), |data| {
///     data.with_segment(&ContextSet::empty(), |s| s.with_permission("chat.color", 1))
/// })?;
///
/// let alice = engine.subject("user", "alice")?;
/// assert!(alice.has_permission(&ContextSet::empty(), "chat.color").await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PermissionEngine {
    inner: Arc<EngineInner>,
}

impl PermissionEngine {
    /// Starts building an engine over `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn DataStore>) -> PermissionEngineBuilder {
        PermissionEngineBuilder::new(store)
    }

    /// Registers a subject type after construction. Registering an
    /// existing name is a no-op.
    pub fn register_collection(&self, name: impl Into<String>, transient_has_priority: bool) {
        let name = name.into();
        self.inner
            .collections
            .entry(name.clone())
            .or_insert_with(|| {
                Arc::new(SubjectCollection::new(
                    name,
                    transient_has_priority,
                    Arc::clone(&self.inner.store),
                    self.inner.subject_capacity,
                ))
            });
    }

    /// Returns a handle to one subject.
    ///
    /// # Errors
    ///
    /// Fails fast with [`EngineError::UnregisteredType`] when
    /// `subject_type` was never registered — the misuse surfaces here,
    /// not deep inside a bake.
    pub fn subject(
        &self,
        subject_type: &str,
        identifier: &str,
    ) -> Result<Subject, EngineError> {
        self.inner.collection(subject_type)?;
        Ok(Subject {
            inner: Arc::clone(&self.inner),
            subject: SubjectRef::new(subject_type, identifier),
        })
    }

    /// The context registry this engine matches with.
    #[must_use]
    pub fn contexts(&self) -> &ContextRegistry {
        &self.inner.registry
    }

    /// The engine's currently-active context set, accumulated from
    /// every registered definition and the configured environment.
    #[must_use]
    pub fn active_contexts(&self) -> ContextSet {
        self.inner.registry.active_set(&self.inner.environment)
    }

    /// Installs (or clears) the debug-mode check observer.
    pub fn set_check_observer(&self, observer: Option<CheckObserver>) {
        let enabled = observer.is_some();
        *self.inner.observer.write() = observer;
        self.inner.debug_enabled.store(enabled, Ordering::Release);
    }

    /// Applies `f` to the subject's persistent data and saves the
    /// result. The subject's own cache is invalidated before this call
    /// returns; dependent subjects are notified asynchronously.
    ///
    /// # Errors
    ///
    /// Propagates store failures. A failed save leaves cache and
    /// snapshot untouched.
    pub async fn update_persistent(
        &self,
        subject: &SubjectRef,
        f: impl FnOnce(&SubjectData) -> SubjectData,
    ) -> Result<(), EngineError> {
        let collection = self.inner.collection(subject.subject_type())?;
        let current = collection
            .persistent_data(subject.identifier())
            .await?
            .map(|data| (*data).clone())
            .unwrap_or_default();
        let updated = f(&current);
        self.inner.store.save(subject, &updated).await?;
        collection.set_persistent(subject.identifier(), updated);
        EngineInner::invalidate(&self.inner, subject);
        Ok(())
    }

    /// Applies `f` to the subject's transient (never persisted) data.
    /// Even an empty update counts as data and permanently ends
    /// fallback-subject lookup for this identifier.
    ///
    /// # Errors
    ///
    /// Fails fast when the subject type is unregistered.
    pub fn update_transient(
        &self,
        subject: &SubjectRef,
        f: impl FnOnce(&SubjectData) -> SubjectData,
    ) -> Result<(), EngineError> {
        let collection = self.inner.collection(subject.subject_type())?;
        collection.update_transient(subject.identifier(), f);
        EngineInner::invalidate(&self.inner, subject);
        Ok(())
    }

    /// Explicitly invalidates one subject's cached bakes (and cascades
    /// to dependents). Also drops the cached persistent snapshot so the
    /// next bake reloads from the store.
    pub fn invalidate_subject(&self, subject: &SubjectRef) {
        if let Ok(collection) = self.inner.collection(subject.subject_type()) {
            collection.evict_persistent(subject.identifier());
        }
        EngineInner::invalidate(&self.inner, subject);
    }

    /// Lists every identifier with stored data in `subject_type`.
    ///
    /// # Errors
    ///
    /// Fails fast on unregistered types; propagates store failures.
    pub async fn stored_identifiers(
        &self,
        subject_type: &str,
    ) -> Result<Vec<String>, EngineError> {
        self.inner.collection(subject_type)?;
        Ok(self.inner.store.list_identifiers(subject_type).await?)
    }
}

impl std::fmt::Debug for PermissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .inner
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        f.debug_struct("PermissionEngine")
            .field("collections", &names)
            .finish_non_exhaustive()
    }
}

/// Handle to one subject within an engine.
///
/// Cheap to clone; all methods resolve through the engine's bake cache.
#[derive(Clone)]
pub struct Subject {
    inner: Arc<EngineInner>,
    subject: SubjectRef,
}

impl Subject {
    /// The `(type, identifier)` pair this handle points at.
    #[must_use]
    pub fn reference(&self) -> &SubjectRef {
        &self.subject
    }

    /// The full baked view under `active`, from cache when possible.
    ///
    /// # Errors
    ///
    /// Propagates data-store failures; a failed bake is never cached.
    pub async fn baked(
        &self,
        active: &ContextSet,
    ) -> Result<Arc<BakedSubjectData>, EngineError> {
        EngineInner::baked(&self.inner, &self.subject, active).await
    }

    /// The resolved permission trie under `active`.
    pub async fn permissions(&self, active: &ContextSet) -> Result<NodeTree, EngineError> {
        Ok(self.baked(active).await?.permissions().clone())
    }

    /// Resolves one permission value under `active`.
    pub async fn permission_value(
        &self,
        active: &ContextSet,
        key: &str,
    ) -> Result<i32, EngineError> {
        let value = self.baked(active).await?.permission(key);
        self.inner.observe(
            &self.subject,
            active,
            CheckKind::Permission,
            Some(key),
            value.to_string(),
        );
        Ok(value)
    }

    /// Returns `true` if the resolved permission value is positive.
    pub async fn has_permission(
        &self,
        active: &ContextSet,
        key: &str,
    ) -> Result<bool, EngineError> {
        Ok(self.permission_value(active, key).await? > 0)
    }

    /// Resolves one option under `active`.
    pub async fn option(
        &self,
        active: &ContextSet,
        key: &str,
    ) -> Result<Option<String>, EngineError> {
        let value = self.baked(active).await?.option(key).map(String::from);
        self.inner.observe(
            &self.subject,
            active,
            CheckKind::Option,
            Some(key),
            value.clone().unwrap_or_else(|| "(unset)".to_string()),
        );
        Ok(value)
    }

    /// The full resolved option map under `active`.
    pub async fn options(
        &self,
        active: &ContextSet,
    ) -> Result<HashMap<String, String>, EngineError> {
        Ok(self.baked(active).await?.options().clone())
    }

    /// The resolved, ordered parent list under `active`.
    pub async fn parents(&self, active: &ContextSet) -> Result<Vec<SubjectRef>, EngineError> {
        let parents = self.baked(active).await?.parents().to_vec();
        self.inner.observe(
            &self.subject,
            active,
            CheckKind::Parents,
            None,
            format!("{} parents", parents.len()),
        );
        Ok(parents)
    }
}

impl std::fmt::Debug for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DirectExecutor;
    use crate::store::MemoryDataStore;

    fn engine() -> PermissionEngine {
        PermissionEngine::builder(Arc::new(MemoryDataStore::new()))
            .with_executor(Arc::new(DirectExecutor))
            .register_collection("user", true)
            .register_collection("group", false)
            .build()
    }

    #[test]
    fn unregistered_type_fails_fast() {
        let engine = engine();
        let err = engine.subject("ghost", "anyone").expect_err("must fail");
        assert!(matches!(err, EngineError::UnregisteredType(name) if name == "ghost"));
    }

    #[test]
    fn fallback_collection_is_always_registered() {
        let engine = engine();
        assert!(engine.subject(FALLBACK_TYPE, "user").is_ok());
    }

    #[test]
    fn registering_twice_is_a_noop() {
        let engine = engine();
        engine.register_collection("user", false);
        // Original priority setting survives.
        let collection = engine.inner.collection("user").expect("registered");
        assert!(collection.transient_has_priority());
    }

    #[tokio::test]
    async fn transient_write_then_query() {
        let engine = engine();
        let alice = SubjectRef::new("user", "alice");
        engine
            .update_transient(&alice, |data| {
                data.with_segment(&ContextSet::empty(), |s| s.with_permission("chat", 1))
            })
            .expect("update");

        let subject = engine.subject("user", "alice").expect("subject");
        assert!(subject
            .has_permission(&ContextSet::empty(), "chat")
            .await
            .expect("query"));
        assert_eq!(
            subject
                .permission_value(&ContextSet::empty(), "other")
                .await
                .expect("query"),
            0
        );
    }

    #[tokio::test]
    async fn persistent_write_then_query() {
        let engine = engine();
        let bob = SubjectRef::new("user", "bob");
        engine
            .update_persistent(&bob, |data| {
                data.with_segment(&ContextSet::empty(), |s| s.with_option("prefix", "[b]"))
            })
            .await
            .expect("update");

        let subject = engine.subject("user", "bob").expect("subject");
        assert_eq!(
            subject
                .option(&ContextSet::empty(), "prefix")
                .await
                .expect("query"),
            Some("[b]".to_string())
        );
    }

    #[tokio::test]
    async fn observer_sees_checks_without_altering_results() {
        use std::sync::Mutex;

        let engine = engine();
        let alice = SubjectRef::new("user", "alice");
        engine
            .update_transient(&alice, |data| {
                data.with_segment(&ContextSet::empty(), |s| s.with_permission("chat", 1))
            })
            .expect("update");

        let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        engine.set_check_observer(Some(
            CheckObserver::new(None, move |event: &CheckEvent| {
                sink.lock()
                    .expect("lock")
                    .push((event.key.clone().unwrap_or_default(), event.value.clone()));
            })
            .expect("observer"),
        ));

        let subject = engine.subject("user", "alice").expect("subject");
        let value = subject
            .permission_value(&ContextSet::empty(), "chat")
            .await
            .expect("query");
        assert_eq!(value, 1);
        assert_eq!(
            *seen.lock().expect("lock"),
            vec![("chat".to_string(), "1".to_string())]
        );

        // Clearing the observer stops the events.
        engine.set_check_observer(None);
        subject
            .permission_value(&ContextSet::empty(), "chat")
            .await
            .expect("query");
        assert_eq!(seen.lock().expect("lock").len(), 1);
    }
}

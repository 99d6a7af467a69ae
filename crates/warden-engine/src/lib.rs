//! Warden engine — contextual permission resolution.
//!
//! Given a subject, a set of *active contexts*, and a hierarchy of
//! subject inheritance, the engine computes the effective permission
//! values, string options, and parent list that apply right now.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  warden-types   : SubjectRef, ErrorCode                     │
//! │  warden-context : ContextValue, ContextSet, definitions     │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  warden-engine (THIS CRATE)                                 │
//! │                                                             │
//! │  tree       : NodeTree — immutable permission trie          │
//! │  segment    : Segment, PermissionValue (shallow tags)       │
//! │  data       : SubjectData — context set → segment           │
//! │  store      : DataStore seam + MemoryDataStore              │
//! │  bake       : segment selection + inheritance assembly      │
//! │  calculated : per-subject bake cache, coalescing, epochs    │
//! │  collection : per-type registry, persistent/transient data  │
//! │  engine     : PermissionEngine facade, invalidation cascade │
//! │  executor   : injectable async executor                     │
//! │  observer   : debug-mode check events                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Resolution Pipeline
//!
//! `DataStore` → [`SubjectData`] (segments) → baking (this subject's
//! matching segments + recursively the baked results of its parents) →
//! [`BakedSubjectData`] → cached per `(subject, active context set)`
//! inside a [`CalculatedSubject`].
//!
//! # Concurrency Contract
//!
//! The engine holds no global locks. All data below the cache layer
//! ([`NodeTree`], [`Segment`], [`SubjectData`]) is immutable and shared
//! freely across threads. Store I/O and cross-subject recursion are the
//! only suspension points; per `(subject, active set)` at most one bake
//! is in flight at a time, and an invalidation during a bake discards
//! the stale result on arrival instead of caching it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use warden_context::{ContextSet, ContextValue};
//! use warden_engine::{MemoryDataStore, PermissionEngine};
//! use warden_types::SubjectRef;
//!
//! # async fn demo() -> Result<(), warden_engine::EngineError> {
//! let engine = PermissionEngine::builder(Arc::new(MemoryDataStore::new()))
//!     .register_collection("user", true)
//!     .register_collection("group", false)
//!     .build();
//!
//! // Grant members of "staff" a permission in the nether only.
//! let nether = ContextSet::of([ContextValue::new("world", "nether")]);
//! engine
//!     .update_persistent(&SubjectRef::new("group", "staff"), |data| {
//!         data.with_segment(&nether, |s| s.with_permission("region.edit", 1))
//!     })
//!     .await?;
//! engine.update_transient(&SubjectRef::new("user", "alice"), |data| {
//!     data.with_segment(&ContextSet::empty(), |s| {
//!         s.with_parent(SubjectRef::new("group", "staff"))
//!     })
//! })?;
//!
//! let alice = engine.subject("user", "alice")?;
//! assert!(alice.has_permission(&nether, "region.edit").await?);
//! assert!(!alice.has_permission(&ContextSet::empty(), "region.edit").await?);
//! # Ok(())
//! # }
//! ```

pub mod bake;
pub mod calculated;
pub mod collection;
pub mod data;
pub mod engine;
pub mod error;
pub mod executor;
pub mod observer;
pub mod segment;
pub mod store;
pub mod tree;

pub use bake::BakedSubjectData;
pub use calculated::CalculatedSubject;
pub use collection::SubjectCollection;
pub use data::SubjectData;
pub use engine::{PermissionEngine, PermissionEngineBuilder, Subject};
pub use error::EngineError;
pub use executor::{DirectExecutor, Executor, TokioExecutor};
pub use observer::{CheckEvent, CheckKind, CheckObserver};
pub use segment::{PermissionValue, Segment};
pub use store::{DataStore, MemoryDataStore, StoreError};
pub use tree::NodeTree;

// Re-exported for convenience: the identifier and context vocabulary
// used throughout the public API.
pub use warden_context::{ContextEnvironment, ContextRegistry, ContextSet, ContextValue};
pub use warden_types::{ErrorCode, SubjectRef, FALLBACK_TYPE};

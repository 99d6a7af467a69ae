//! Fallback-subject semantics: applied only while a subject has no
//! data of its own, permanently cut off by the first write.

use std::sync::Arc;
use warden_context::ContextSet;
use warden_engine::{DirectExecutor, MemoryDataStore, PermissionEngine};
use warden_types::SubjectRef;

fn engine() -> PermissionEngine {
    PermissionEngine::builder(Arc::new(MemoryDataStore::new()))
        .with_executor(Arc::new(DirectExecutor))
        .register_collection("user", true)
        .build()
}

async fn grant_fallback(engine: &PermissionEngine, key: &str) {
    engine
        .update_persistent(&SubjectRef::fallback("user"), |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission(key, 1))
        })
        .await
        .expect("write fallback");
}

#[tokio::test]
async fn dataless_subject_inherits_fallback() {
    let engine = engine();
    grant_fallback(&engine, "spawn.join").await;

    let ghost = engine.subject("user", "ghost").expect("subject");
    assert!(ghost
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query"));
}

#[tokio::test]
async fn any_transient_write_cuts_off_fallback() {
    let engine = engine();
    grant_fallback(&engine, "spawn.join").await;

    let ghost_ref = SubjectRef::new("user", "ghost");
    let ghost = engine.subject("user", "ghost").expect("subject");
    assert!(ghost
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query"));

    // An unrelated (here: completely empty) transient update.
    engine
        .update_transient(&ghost_ref, |data| data.clone())
        .expect("write");

    // The fallback permission is no longer visible.
    assert!(!ghost
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query"));
}

#[tokio::test]
async fn unrelated_transient_data_also_cuts_off_fallback() {
    let engine = engine();
    grant_fallback(&engine, "spawn.join").await;

    let ghost_ref = SubjectRef::new("user", "ghost");
    engine
        .update_transient(&ghost_ref, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("something.else", 1))
        })
        .expect("write");

    let ghost = engine.subject("user", "ghost").expect("subject");
    assert!(!ghost
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query"));
    assert!(ghost
        .has_permission(&ContextSet::empty(), "something.else")
        .await
        .expect("query"));
}

#[tokio::test]
async fn persistent_data_also_cuts_off_fallback() {
    let engine = engine();
    grant_fallback(&engine, "spawn.join").await;

    let alice_ref = SubjectRef::new("user", "alice");
    engine
        .update_persistent(&alice_ref, |data| {
            data.with_segment(&ContextSet::empty(), |s| s.with_permission("chat", 1))
        })
        .await
        .expect("write");

    let alice = engine.subject("user", "alice").expect("subject");
    assert!(!alice
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query"));
}

#[tokio::test]
async fn fallback_edits_propagate_to_dataless_dependents() {
    let engine = engine();
    grant_fallback(&engine, "spawn.join").await;

    let ghost = engine.subject("user", "ghost").expect("subject");
    assert!(ghost
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query"));

    // Rewrite the fallback subject entirely. The dataless dependent was
    // registered as a listener during its bake, so the cascade (run
    // synchronously under DirectExecutor) drops its cached result.
    engine
        .update_persistent(&SubjectRef::fallback("user"), |_| {
            warden_engine::SubjectData::empty().with_segment(&ContextSet::empty(), |s| {
                s.with_permission("lobby.join", 1)
            })
        })
        .await
        .expect("rewrite fallback");

    assert!(!ghost
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query"));
    assert!(ghost
        .has_permission(&ContextSet::empty(), "lobby.join")
        .await
        .expect("query"));
}

#[tokio::test]
async fn fallback_applies_per_type() {
    let engine = engine();
    grant_fallback(&engine, "spawn.join").await;

    // The fallback subject for "user" holds data, so unlike a dataless
    // ordinary subject it never falls back to anything itself.
    let fallback = engine
        .subject("fallback", "user")
        .expect("fallback subject is addressable");
    assert!(fallback
        .has_permission(&ContextSet::empty(), "spawn.join")
        .await
        .expect("query"));
}

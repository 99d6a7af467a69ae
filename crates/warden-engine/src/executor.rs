//! Injectable task executor.
//!
//! The engine dispatches background work — invalidation cascades, in
//! particular — through this seam rather than calling a runtime
//! directly, so the same engine runs under tokio in production and
//! fully synchronously in tests.

use futures::future::BoxFuture;

/// Accepts unit-of-work closures for asynchronous execution.
pub trait Executor: Send + Sync {
    /// Schedules `task` to run. Ordering between tasks is not
    /// guaranteed; completion is not reported.
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Executor that spawns onto the ambient tokio runtime.
///
/// Panics if used outside a runtime context, matching `tokio::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}

/// Executor that runs each task to completion on the calling thread.
///
/// Spawned work is finished before `spawn` returns, which makes
/// asynchronous effects (listener notification, cascade invalidation)
/// deterministic in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        futures::executor::block_on(task);
    }
}

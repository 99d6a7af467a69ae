//! Engine-level errors.

use crate::store::StoreError;
use thiserror::Error;
use warden_types::ErrorCode;

/// Error from a top-level engine operation.
///
/// Data-layer failures are wrapped, not swallowed: a failed load
/// surfaces here instead of being treated as empty data, and nothing
/// from a failed operation is ever written into a cache.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The subject type was never registered with the engine.
    ///
    /// This is programmer misuse and fails fast at the call boundary.
    #[error("subject type '{0}' is not registered")]
    UnregisteredType(String),

    /// A data-store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnregisteredType(_) => "WARDEN_ENGINE_UNREGISTERED_TYPE",
            Self::Store(inner) => inner.code(),
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::UnregisteredType(_) => false,
            Self::Store(inner) => inner.is_recoverable(),
        }
    }
}

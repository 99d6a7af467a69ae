//! Shared primitives for the Warden permission engine.
//!
//! This crate sits at the bottom of the Warden dependency graph and
//! carries only identity types and the unified error-code contract.
//! It deliberately contains no resolution logic.
//!
//! # Crate Architecture
//!
//! ```text
//! warden-types    : SubjectRef, ErrorCode            ◄── THIS CRATE
//!     ↑
//! warden-context  : ContextValue, ContextSet, ContextDefinition
//!     ↑
//! warden-engine   : NodeTree, Segment, SubjectData, baking, caching
//! ```
//!
//! # Design Principles
//!
//! - **Identity only** — a [`SubjectRef`] says *which* subject is meant,
//!   never what it may do. Permission resolution lives in `warden-engine`.
//! - **Caller-supplied identifiers** — subjects are addressed by a
//!   `(type, identifier)` string pair chosen by the embedding application;
//!   nothing in Warden generates identifiers.
//! - **Stable error codes** — every error enum in the workspace implements
//!   [`ErrorCode`] with `WARDEN_*` codes that are part of the API contract.

pub mod error;
pub mod subject;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use subject::{SubjectRef, FALLBACK_TYPE};

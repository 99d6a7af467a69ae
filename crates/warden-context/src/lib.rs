//! Context model for the Warden permission engine.
//!
//! A *context* is a dimension of situational scoping — the world a
//! subject is in, the current time, the server's tags, the address a
//! connection came from. Stored permission data is scoped to context
//! sets; at query time the caller supplies the *active* context set and
//! the engine applies exactly the data whose requirements are satisfied.
//!
//! # Crate Architecture
//!
//! ```text
//! warden-types
//!     ↑
//! warden-context                               ◄── THIS CRATE
//!   value     : ContextValue, ParsedValue
//!   set       : ContextSet
//!   definition: ContextDefinition, ContextEnvironment
//!   builtin   : world / server-tag / proxy / ip / before-time / after-time
//!   registry  : ContextRegistry (match + satisfaction predicates)
//!     ↑
//! warden-engine
//! ```
//!
//! # Matching Model
//!
//! [`ContextDefinition::matches`] is the single source of truth for
//! whether a stored context value is satisfied by an active one. It is
//! asymmetric where the context type demands it: a stored `ip` network
//! contains the active address (never the reverse), a stored
//! `before-time` cutoff bounds the active instant. A stored context set
//! `S` is satisfied by an active set `A` iff every value in `S` is
//! matched by some value in `A` under its key's definition
//! ([`ContextRegistry::satisfies`]). The empty set is satisfied by
//! anything — it is the global scope.
//!
//! # Soft Failure
//!
//! Malformed raw values never abort a query. [`ContextDefinition::parse`]
//! returns `None` for input it cannot understand, and the value simply
//! contributes nothing.

pub mod builtin;
pub mod cidr;
pub mod definition;
pub mod registry;
pub mod set;
pub mod value;

pub use builtin::{
    AfterTimeContext, BeforeTimeContext, BoolContext, CidrContext, ServerTagContext,
    StringContext, KEY_AFTER_TIME, KEY_BEFORE_TIME, KEY_IP, KEY_PROXY, KEY_SERVER_TAG, KEY_WORLD,
};
pub use cidr::CidrBlock;
pub use definition::{ContextDefinition, ContextEnvironment};
pub use registry::ContextRegistry;
pub use set::ContextSet;
pub use value::{ContextValue, ParsedValue};

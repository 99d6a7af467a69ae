//! The context-definition capability interface.
//!
//! A [`ContextDefinition`] owns everything type-specific about one
//! context key: how raw strings become typed values, what "satisfied"
//! means for a stored/active pair, and which values are active right
//! now. Definitions are registered in a
//! [`ContextRegistry`](crate::ContextRegistry) and looked up by key.
//!
//! # Environment, Not Singletons
//!
//! Definitions that depend on deployment state (the server's tags,
//! whether this is a proxy connection, the current instant in tests)
//! read it from an explicit [`ContextEnvironment`] passed into
//! [`current_values`](ContextDefinition::current_values). There is no
//! process-wide mutable state anywhere in the context model.

use crate::value::{ContextValue, ParsedValue};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;

/// Type-specific behavior for one context key.
///
/// # Contract
///
/// - [`parse`](Self::parse) fails *softly*: malformed input yields
///   `None` and the value contributes nothing to a query. It must never
///   panic.
/// - [`matches`](Self::matches) is the single source of truth for
///   whether a stored value is satisfied by an active one. It need not
///   be symmetric: a stored `ip` network contains the active address, a
///   stored time cutoff bounds the active instant.
/// - [`current_values`](Self::current_values) pushes zero or more
///   currently-active values into the sink — e.g. `before-time`
///   contributes "now" whenever asked, `server-tag` contributes every
///   configured tag.
pub trait ContextDefinition: Send + Sync {
    /// The key this definition owns, e.g. `"world"`.
    fn key(&self) -> &str;

    /// Parses a raw string into this context's typed form.
    ///
    /// Returns `None` for input this context cannot understand.
    fn parse(&self, raw: &str) -> Option<ParsedValue>;

    /// Returns `true` if the stored value is satisfied by the active one.
    fn matches(&self, stored: &ParsedValue, active: &ParsedValue) -> bool;

    /// Accumulates this context's currently-active value(s).
    fn current_values(&self, env: &ContextEnvironment, sink: &mut dyn FnMut(ContextValue));
}

/// Deployment-level inputs consumed by [`ContextDefinition::current_values`].
///
/// An environment is plain data handed to the engine at construction
/// time. Cloning is cheap enough for configuration-sized content, and a
/// replaced environment takes effect on the next query — definitions
/// hold no state of their own.
///
/// # Example
///
/// ```
/// use warden_context::ContextEnvironment;
///
/// let env = ContextEnvironment::new()
///     .with_server_tags(["good", "fast"])
///     .with_proxy(true);
/// assert_eq!(env.server_tags(), ["good", "fast"]);
/// assert!(env.proxy());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContextEnvironment {
    server_tags: Vec<String>,
    proxy: bool,
    remote_address: Option<IpAddr>,
    static_values: HashMap<String, Vec<String>>,
    clock_override: Option<DateTime<Utc>>,
}

impl ContextEnvironment {
    /// Creates an empty environment: no tags, not a proxy, no address.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server's configured tags.
    #[must_use]
    pub fn with_server_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Marks connections as coming through a proxy (or not).
    #[must_use]
    pub fn with_proxy(mut self, proxy: bool) -> Self {
        self.proxy = proxy;
        self
    }

    /// Sets the remote address the `ip` context reports as active.
    #[must_use]
    pub fn with_remote_address(mut self, addr: IpAddr) -> Self {
        self.remote_address = Some(addr);
        self
    }

    /// Adds fixed active values for a plain string context key.
    ///
    /// Useful for keys like `world` whose active value the embedding
    /// application knows out-of-band.
    #[must_use]
    pub fn with_static_values<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_values
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Pins "now" to a fixed instant. Intended for tests; when unset,
    /// time contexts read the system clock.
    #[must_use]
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock_override = Some(now);
        self
    }

    /// The server's configured tags.
    #[must_use]
    pub fn server_tags(&self) -> &[String] {
        &self.server_tags
    }

    /// Whether connections come through a proxy.
    #[must_use]
    pub fn proxy(&self) -> bool {
        self.proxy
    }

    /// The active remote address, if configured.
    #[must_use]
    pub fn remote_address(&self) -> Option<IpAddr> {
        self.remote_address
    }

    /// Fixed active values for `key`, if configured.
    #[must_use]
    pub fn static_values(&self, key: &str) -> &[String] {
        self.static_values
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The current instant: the pinned clock if set, the system clock
    /// otherwise.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock_override.unwrap_or_else(Utc::now)
    }
}

//! Context registry: key → definition lookup and the match predicates.
//!
//! The registry is the only place that combines heterogeneous context
//! definitions. It answers the two questions the engine asks:
//!
//! 1. *Does this stored value match that active value?*
//!    ([`ContextRegistry::matches`])
//! 2. *Is this stored context set satisfied by that active set?*
//!    ([`ContextRegistry::satisfies`])
//!
//! Values under keys with no registered definition fall back to raw
//! string equality, so data written under not-yet-registered keys still
//! scopes correctly.

use crate::builtin::{
    AfterTimeContext, BeforeTimeContext, BoolContext, CidrContext, ServerTagContext, StringContext,
};
use crate::definition::{ContextDefinition, ContextEnvironment};
use crate::set::ContextSet;
use crate::value::{ContextValue, ParsedValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable collection of [`ContextDefinition`]s, looked up by key.
///
/// Built once at engine construction; registering definitions after the
/// engine is running is not supported (hand the engine a new registry
/// instead).
///
/// # Example
///
/// ```
/// use warden_context::{ContextRegistry, ContextSet, ContextValue};
///
/// let registry = ContextRegistry::with_defaults();
///
/// let stored = ContextSet::of([ContextValue::new("ip", "10.0.0.0/8")]);
/// let active = ContextSet::of([ContextValue::new("ip", "10.1.2.3")]);
/// assert!(registry.satisfies(&stored, &active));
///
/// // The empty requirement is the global scope.
/// assert!(registry.satisfies(&ContextSet::empty(), &active));
/// ```
#[derive(Clone, Default)]
pub struct ContextRegistry {
    definitions: HashMap<String, Arc<dyn ContextDefinition>>,
}

impl ContextRegistry {
    /// Creates an empty registry. Every key falls back to raw equality.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with all built-in definitions registered:
    /// `world`, `server-tag`, `proxy`, `ip`, `before-time`, `after-time`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StringContext::world()));
        registry.register(Arc::new(ServerTagContext));
        registry.register(Arc::new(BoolContext::proxy()));
        registry.register(Arc::new(CidrContext));
        registry.register(Arc::new(BeforeTimeContext));
        registry.register(Arc::new(AfterTimeContext));
        registry
    }

    /// Registers a definition under its own key, replacing any previous
    /// definition for that key.
    pub fn register(&mut self, definition: Arc<dyn ContextDefinition>) {
        self.definitions
            .insert(definition.key().to_string(), definition);
    }

    /// Looks up the definition owning `key`.
    #[must_use]
    pub fn definition(&self, key: &str) -> Option<&Arc<dyn ContextDefinition>> {
        self.definitions.get(key)
    }

    /// Resolves a value's typed form through its key's definition.
    ///
    /// Unknown keys resolve to [`ParsedValue::Str`]; malformed raw forms
    /// resolve to `None` (the value will never match anything typed).
    #[must_use]
    pub fn resolve(&self, value: &ContextValue) -> ContextValue {
        if value.parsed().is_some() {
            return value.clone();
        }
        let parsed = match self.definitions.get(value.key()) {
            Some(def) => def.parse(value.raw()),
            None => Some(ParsedValue::Str(value.raw().to_string())),
        };
        value.with_parsed(parsed)
    }

    /// Returns `true` if the stored value is satisfied by the active one.
    ///
    /// Both values must share a key. A stored value whose raw form its
    /// definition cannot parse is unsatisfiable; an unparseable active
    /// value satisfies nothing.
    #[must_use]
    pub fn matches(&self, stored: &ContextValue, active: &ContextValue) -> bool {
        if stored.key() != active.key() {
            return false;
        }
        match self.definitions.get(stored.key()) {
            Some(def) => {
                let stored_parsed = match stored.parsed() {
                    Some(p) => p.clone(),
                    None => match def.parse(stored.raw()) {
                        Some(p) => p,
                        None => return false,
                    },
                };
                let active_parsed = match active.parsed() {
                    Some(p) => p.clone(),
                    None => match def.parse(active.raw()) {
                        Some(p) => p,
                        None => return false,
                    },
                };
                def.matches(&stored_parsed, &active_parsed)
            }
            None => stored.raw() == active.raw(),
        }
    }

    /// Returns `true` if every value in `stored` is matched by some
    /// value in `active` under its key's definition.
    ///
    /// The empty `stored` set is satisfied by anything.
    #[must_use]
    pub fn satisfies(&self, stored: &ContextSet, active: &ContextSet) -> bool {
        stored
            .iter()
            .all(|req| active.iter().any(|cand| self.matches(req, cand)))
    }

    /// Collects every definition's currently-active values into a set.
    #[must_use]
    pub fn active_set(&self, env: &ContextEnvironment) -> ContextSet {
        let mut values = Vec::new();
        for def in self.definitions.values() {
            def.current_values(env, &mut |v| values.push(v));
        }
        ContextSet::of(values)
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.definitions.keys().collect();
        keys.sort();
        f.debug_struct("ContextRegistry").field("keys", &keys).finish()
    }
}

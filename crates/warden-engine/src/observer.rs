//! Debug-mode check observation.
//!
//! When enabled, an observer fires on every permission/option/parent
//! check — after resolution, before the value is returned — carrying
//! the subject, the active context set, the checked key, and the
//! resolved value. Observation never alters the result. When no
//! observer is installed the engine skips this module entirely via one
//! atomic flag, so disabled debug mode costs nothing on the hot path.

use regex::Regex;
use std::fmt;
use std::sync::Arc;
use warden_context::ContextSet;
use warden_types::SubjectRef;

/// What kind of lookup produced a [`CheckEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// A permission value lookup.
    Permission,
    /// An option lookup.
    Option,
    /// A parent-list lookup.
    Parents,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission => write!(f, "permission"),
            Self::Option => write!(f, "option"),
            Self::Parents => write!(f, "parents"),
        }
    }
}

/// One observed check.
#[derive(Debug, Clone)]
pub struct CheckEvent {
    /// Subject the check ran against.
    pub subject: SubjectRef,
    /// Active context set supplied by the caller.
    pub active: ContextSet,
    /// Lookup kind.
    pub kind: CheckKind,
    /// Checked key; `None` for whole-list lookups (parents).
    pub key: Option<String>,
    /// Resolved value, rendered for display.
    pub value: String,
}

/// Observer hook for debug mode.
///
/// The optional filter restricts observation to checks whose key
/// matches; keyless checks (parent lists) always pass the filter.
///
/// # Example
///
/// ```
/// use warden_engine::{CheckEvent, CheckObserver};
/// use std::sync::{Arc, Mutex};
///
/// let seen: Arc<Mutex<Vec<String>>> = Arc::default();
/// let sink = Arc::clone(&seen);
/// let observer = CheckObserver::new(Some("^admin\\."), move |event: &CheckEvent| {
///     sink.lock().unwrap().push(event.value.clone());
/// })
/// .expect("valid filter");
/// # let _ = observer;
/// ```
#[derive(Clone)]
pub struct CheckObserver {
    filter: Option<Regex>,
    sink: Arc<dyn Fn(&CheckEvent) + Send + Sync>,
}

impl CheckObserver {
    /// Creates an observer with an optional key filter pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex error if `filter` is not a valid pattern.
    pub fn new(
        filter: Option<&str>,
        sink: impl Fn(&CheckEvent) + Send + Sync + 'static,
    ) -> Result<Self, regex::Error> {
        let filter = filter.map(Regex::new).transpose()?;
        Ok(Self {
            filter,
            sink: Arc::new(sink),
        })
    }

    /// Creates an observer that logs every matching check through
    /// `tracing` at debug level.
    ///
    /// # Errors
    ///
    /// Returns the regex error if `filter` is not a valid pattern.
    pub fn tracing(filter: Option<&str>) -> Result<Self, regex::Error> {
        Self::new(filter, |event| {
            tracing::debug!(
                subject = %event.subject,
                active = %event.active,
                kind = %event.kind,
                key = event.key.as_deref().unwrap_or("*"),
                value = %event.value,
                "check"
            );
        })
    }

    /// Feeds one event through the filter to the sink.
    pub(crate) fn observe(&self, event: &CheckEvent) {
        if let (Some(filter), Some(key)) = (&self.filter, &event.key) {
            if !filter.is_match(key) {
                return;
            }
        }
        (self.sink)(event);
    }
}

impl fmt::Debug for CheckObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckObserver")
            .field("filter", &self.filter.as_ref().map(Regex::as_str))
            .finish_non_exhaustive()
    }
}

//! Baking: resolving segments + inheritance into concrete results.
//!
//! Baking happens in two stages. The *own* stage selects the subject's
//! segments whose context sets are satisfied by the active set and
//! merges them in ascending specificity. The *assembly* stage folds in
//! each parent's exposed-to-children view, with own entries beating
//! inherited ones on ties and earlier-listed parents beating later
//! ones.
//!
//! # Shallow Propagation
//!
//! Every permission entry carries a shallow tag through both stages. A
//! subject's exposed-to-children view contains all of its own entries
//! (shallow included) plus only the *non-shallow* part of what it
//! inherited — so a shallow entry is visible at its origin and at the
//! origin's immediate children, and is dropped before traveling any
//! further, no matter how deep the chain is.
//!
//! The recursive walk across subjects (and its caching) lives in
//! [`engine`](crate::engine); this module is pure and synchronous.

use crate::segment::{apply_tie_break, PermissionValue, Segment};
use crate::tree::NodeTree;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use warden_context::{ContextRegistry, ContextSet};
use warden_types::SubjectRef;

/// Fully-resolved view of one subject under one active context set.
///
/// Cheap to share: produced once per `(subject, active set)` and held
/// in the subject's bake cache behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct BakedSubjectData {
    permissions: NodeTree,
    options: HashMap<String, String>,
    parents: Vec<SubjectRef>,
    default_value: i32,
    /// What this subject passes to its children: own entries (tags
    /// kept) over inherited non-shallow entries.
    exposed: HashMap<String, PermissionValue>,
}

impl BakedSubjectData {
    /// The all-defaults result of baking a subject with no data.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            permissions: NodeTree::empty(),
            options: HashMap::new(),
            parents: Vec::new(),
            default_value: 0,
            exposed: HashMap::new(),
        }
    }

    /// The resolved permission trie.
    #[must_use]
    pub fn permissions(&self) -> &NodeTree {
        &self.permissions
    }

    /// The resolved option map.
    #[must_use]
    pub fn options(&self) -> &HashMap<String, String> {
        &self.options
    }

    /// The resolved, ordered parent list.
    #[must_use]
    pub fn parents(&self) -> &[SubjectRef] {
        &self.parents
    }

    /// The fallback default applied when a permission is undefined.
    #[must_use]
    pub fn default_value(&self) -> i32 {
        self.default_value
    }

    /// Resolves one permission: the trie value, or the fallback default
    /// when the trie is silent.
    #[must_use]
    pub fn permission(&self, key: &str) -> i32 {
        let value = self.permissions.get(key);
        if value != 0 {
            value
        } else {
            self.default_value
        }
    }

    /// Returns `true` if [`permission`](Self::permission) is positive.
    #[must_use]
    pub fn has_permission(&self, key: &str) -> bool {
        self.permission(key) > 0
    }

    /// Resolves one option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub(crate) fn exposed_to_children(&self) -> &HashMap<String, PermissionValue> {
        &self.exposed
    }
}

/// The subject's own (intra-subject) contribution, before inheritance.
#[derive(Debug, Default)]
pub(crate) struct OwnContribution {
    pub permissions: HashMap<String, PermissionValue>,
    pub options: IndexMap<String, String>,
    pub parents: Vec<SubjectRef>,
    pub default_value: Option<i32>,
}

/// Selects the segments satisfied by `active` and orders them for
/// merging: ascending specificity (context-set size), then ascending
/// weight, declaration order last. Later-applied segments win ties, so
/// more specific declarations override less specific ones of equal
/// magnitude.
pub(crate) fn select_segments<'a>(
    data: impl Iterator<Item = (&'a ContextSet, &'a Segment)>,
    registry: &ContextRegistry,
    active: &ContextSet,
) -> Vec<(&'a ContextSet, &'a Segment)> {
    let mut selected: Vec<(&ContextSet, &Segment)> = data
        .filter(|(contexts, _)| registry.satisfies(contexts, active))
        .collect();
    selected.sort_by_key(|(contexts, segment)| (contexts.len(), segment.weight().unwrap_or(0)));
    selected
}

/// Merges selected segments into the subject's own contribution.
pub(crate) fn merge_own(selected: &[(&ContextSet, &Segment)]) -> OwnContribution {
    let mut own = OwnContribution::default();
    for (_, segment) in selected {
        for (key, entry) in segment.permissions() {
            apply_tie_break(&mut own.permissions, key, *entry);
        }
        for (key, value) in segment.options() {
            own.options.insert(key.clone(), value.clone());
        }
        for parent in segment.parents() {
            if !own.parents.contains(parent) {
                own.parents.push(parent.clone());
            }
        }
        if let Some(default_value) = segment.default_value() {
            own.default_value = Some(default_value);
        }
    }
    own
}

/// Folds the own contribution and the parents' exposed views into the
/// final baked result.
///
/// `parent_views` must be in parent-declaration order; views are
/// applied in reverse so that under the later-wins tie-break the first
/// parent beats later parents, and own entries (applied last) beat all
/// inherited ones.
pub(crate) fn assemble(
    own: OwnContribution,
    parent_views: &[Arc<BakedSubjectData>],
) -> BakedSubjectData {
    // Inherited permissions, tags preserved: a shallow tag here means
    // "visible to this subject, not re-exposed below it".
    let mut inherited: HashMap<String, PermissionValue> = HashMap::new();
    for view in parent_views.iter().rev() {
        for (key, entry) in view.exposed_to_children() {
            apply_tie_break(&mut inherited, key, *entry);
        }
    }

    let mut effective = inherited.clone();
    for (key, entry) in &own.permissions {
        apply_tie_break(&mut effective, key, *entry);
    }
    let permissions = NodeTree::of(
        effective
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value)),
    );

    let mut exposed: HashMap<String, PermissionValue> = inherited
        .iter()
        .filter(|(_, entry)| !entry.shallow)
        .map(|(key, entry)| (key.clone(), *entry))
        .collect();
    for (key, entry) in &own.permissions {
        apply_tie_break(&mut exposed, key, *entry);
    }

    let mut options: HashMap<String, String> = HashMap::new();
    for view in parent_views.iter().rev() {
        options.extend(view.options().clone());
    }
    options.extend(own.options.into_iter());

    let mut parents = own.parents;
    for view in parent_views {
        for parent in view.parents() {
            if !parents.contains(parent) {
                parents.push(parent.clone());
            }
        }
    }

    let mut default_value = 0;
    for view in parent_views.iter().rev() {
        if view.default_value() != 0 {
            default_value = view.default_value();
        }
    }
    if let Some(own_default) = own.default_value {
        default_value = own_default;
    }

    BakedSubjectData {
        permissions,
        options,
        parents,
        default_value,
        exposed,
    }
}

//! Immutable permission trie.
//!
//! A [`NodeTree`] maps dotted, case-insensitive permission paths to
//! signed integer values (0 = undefined). Trees are never mutated in
//! place: every edit returns a new root that structurally shares all
//! unmodified subtrees with the original, so trees can be handed across
//! threads and cached without synchronization.
//!
//! # Resolution Rule
//!
//! `get` walks the path as far as nodes exist and keeps the value with
//! the **largest absolute magnitude** seen along the way; on equal
//! magnitudes the deeper node wins (the comparison is `>=`, and deeper
//! nodes are visited later). This is *not* "most specific wins": a
//! short, high-magnitude assignment overrides a longer, low-magnitude
//! one.
//!
//! ```
//! use warden_engine::NodeTree;
//!
//! let tree = NodeTree::of([("x", 2), ("x.y", 1)]);
//! // x has the larger magnitude, so it decides everything below it.
//! assert_eq!(tree.get("x.y.z"), 2);
//!
//! // Negative values deny with the same magnitude rule.
//! let tree = NodeTree::of([("chat", 1), ("chat.shout", -2)]);
//! assert_eq!(tree.get("chat.shout.everyone"), -2);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, PartialEq, Eq)]
struct Node {
    value: i32,
    children: HashMap<String, Arc<Node>>,
}

impl Node {
    fn leaf(value: i32) -> Self {
        Self {
            value,
            children: HashMap::new(),
        }
    }
}

/// Immutable wildcard trie from dotted permission paths to values.
///
/// Cloning is a pointer copy; edits share structure with the original.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeTree {
    root: Arc<Node>,
}

impl NodeTree {
    /// The empty tree: every lookup returns 0.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a tree from a flat map of dotted paths to values.
    #[must_use]
    pub fn of<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, i32)>,
        K: AsRef<str>,
    {
        Self::of_with_default(values, 0)
    }

    /// Builds a tree whose root (the value of the empty path, and the
    /// floor every lookup starts from) is `default_value`.
    #[must_use]
    pub fn of_with_default<I, K>(values: I, default_value: i32) -> Self
    where
        I: IntoIterator<Item = (K, i32)>,
        K: AsRef<str>,
    {
        let mut tree = Self {
            root: Arc::new(Node::leaf(default_value)),
        };
        for (path, value) in values {
            tree = tree.with_value(path.as_ref(), value);
        }
        tree
    }

    /// Resolves `path` under the magnitude-then-depth rule.
    ///
    /// Walks existing children only — missing segments stop the descent
    /// without creating anything. Malformed paths simply resolve against
    /// whatever prefix exists.
    #[must_use]
    pub fn get(&self, path: &str) -> i32 {
        let mut best = self.root.value;
        let mut node = &self.root;
        for segment in segments_of(path) {
            match node.children.get(&segment) {
                Some(child) => {
                    node = child;
                    if node.value.abs() >= best.abs() {
                        best = node.value;
                    }
                }
                None => break,
            }
        }
        best
    }

    /// Returns a new tree with `path` set to `value`; setting 0 clears.
    ///
    /// Only the nodes along `path` are copied — all sibling subtrees are
    /// shared with `self`.
    #[must_use]
    pub fn with_value(&self, path: &str, value: i32) -> Self {
        let segments: Vec<String> = segments_of(path).collect();
        Self {
            root: Arc::new(set_path(&self.root, &segments, value)),
        }
    }

    /// Returns a new tree with every entry of `values` applied in
    /// iteration order.
    #[must_use]
    pub fn with_all<I, K>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, i32)>,
        K: AsRef<str>,
    {
        let mut tree = self.clone();
        for (path, value) in values {
            tree = tree.with_value(path.as_ref(), value);
        }
        tree
    }

    /// Flattens every non-zero node back to its dotted path.
    #[must_use]
    pub fn as_map(&self) -> HashMap<String, i32> {
        let mut out = HashMap::new();
        collect(&self.root, String::new(), &mut out);
        out
    }

    /// Returns `true` if no node carries a non-zero value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.value == 0 && self.as_map().is_empty()
    }
}

fn segments_of(path: &str) -> impl Iterator<Item = String> + '_ {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
}

fn set_path(node: &Node, segments: &[String], value: i32) -> Node {
    match segments.split_first() {
        None => Node {
            value,
            children: node.children.clone(),
        },
        Some((head, rest)) => {
            let mut children = node.children.clone();
            let child = match children.get(head) {
                Some(existing) => set_path(existing, rest, value),
                None => set_path(&Node::default(), rest, value),
            };
            if child.value == 0 && child.children.is_empty() {
                children.remove(head);
            } else {
                children.insert(head.clone(), Arc::new(child));
            }
            Node {
                value: node.value,
                children,
            }
        }
    }
}

fn collect(node: &Node, prefix: String, out: &mut HashMap<String, i32>) {
    for (name, child) in &node.children {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        if child.value != 0 {
            out.insert(path.clone(), child.value);
        }
        collect(child, path, out);
    }
}

impl Serialize for NodeTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.as_map())
    }
}

impl<'de> Deserialize<'de> for NodeTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = HashMap::<String, i32>::deserialize(deserializer)?;
        Ok(Self::of(map))
    }
}

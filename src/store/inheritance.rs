//! Metadata inheritance.
//!
//! A small, fixed set of metadata keys flows down the tree from ancestor
//! to descendant. Resolution is read-only: inherited values are computed
//! on demand and never written back onto nodes, so publishing a node
//! cannot bake a stale inherited value into it.

use std::collections::HashSet;

use tracing::trace;

use crate::{
    domain::{Location, Metadata},
    store::ModuleStore,
};

/// The metadata keys that descend from ancestors.
///
/// Everything else (`display_name`, `textbooks`, ...) stays on the node
/// that declares it.
pub const INHERITABLE_KEYS: &[&str] = &[
    "due",
    "format",
    "graded",
    "rerandomize",
    "showanswer",
    "start",
];

/// Resolves the metadata `location` inherits from its ancestors.
///
/// The nearest ancestor that explicitly sets an inheritable key wins. The
/// node's own metadata does not contribute; callers overlay it themselves
/// when they want the effective value. Orphans and course roots have no
/// ancestors and inherit nothing.
pub(crate) fn inherited_metadata(store: &ModuleStore, location: &Location) -> Metadata {
    // Walk up to the root, guarding against reference cycles in
    // children lists (tolerated in storage, but not walkable forever).
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = location.clone().into_published();
    while let Some(parent) = store.parent_of(&current) {
        if !seen.insert(parent.clone()) {
            trace!(%parent, "cycle detected while resolving inheritance");
            break;
        }
        chain.push(parent.clone());
        current = parent;
    }

    // Apply from the farthest ancestor down so nearer ancestors override.
    let mut inherited = Metadata::new();
    for ancestor in chain.iter().rev() {
        let Ok(node) = store.get_item(ancestor, 0) else {
            continue;
        };
        for &key in INHERITABLE_KEYS {
            if let Some(value) = node.metadata().get(key) {
                inherited.insert(key.to_string(), value.clone());
            }
        }
    }
    inherited
}

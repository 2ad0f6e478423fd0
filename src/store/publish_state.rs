//! Publish-state resolution.
//!
//! The publish state of a node is derived, never stored: it falls out of
//! which revisions exist for the node and whether their content differs.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    domain::Node,
    store::module_store::{StoreError, VersionedNode},
};

/// The derived publish state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishState {
    /// Only a draft revision exists; the node has never been published.
    Private,
    /// Both revisions exist and the draft's content differs from the
    /// published copy.
    Draft,
    /// A published revision exists and no draft diverges from it.
    Public,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Self::Private => "private",
            Self::Draft => "draft",
            Self::Public => "public",
        };
        write!(f, "{label}")
    }
}

/// Resolves the publish state of `node` from its store entry.
///
/// The node's `is_draft` marker is informational and must agree with the
/// store's records; a mismatch means the caller is holding a stale copy.
pub(crate) fn resolve(
    node: &Node,
    entry: Option<&VersionedNode>,
) -> Result<PublishState, StoreError> {
    if !node.category().is_versioned() {
        return Err(StoreError::InvalidCategory {
            location: node.location().clone(),
            category: node.category().clone(),
        });
    }

    let entry = entry.ok_or_else(|| StoreError::NotFound(node.location().clone()))?;

    let marker_consistent = !node.is_draft() || entry.draft().is_some();
    debug_assert!(
        marker_consistent,
        "draft-marked node {} has no draft revision in the store",
        node.location()
    );
    if !marker_consistent {
        warn!(location = %node.location(), "stale draft marker on node copy");
    }

    let state = match entry {
        VersionedNode::Draft(_) => PublishState::Private,
        VersionedNode::Published(_) => PublishState::Public,
        VersionedNode::Both { published, draft } => {
            if published.fingerprint() == draft.fingerprint() {
                PublishState::Public
            } else {
                PublishState::Draft
            }
        }
    };

    Ok(state)
}

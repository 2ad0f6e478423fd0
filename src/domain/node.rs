//! The in-memory representation of one unit of course content.

use std::collections::BTreeMap;

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};

use crate::domain::{Category, Location};

/// Own metadata of a node: explicitly set keys only.
///
/// Inherited metadata is derived state resolved by the store and is never
/// stored on the node itself.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One unit of course content: a course, chapter, sequential, vertical,
/// problem, and so on.
///
/// Nodes returned by the store are detached copies. Mutating a `Node` has
/// no effect on the store until it is passed back through
/// [`ModuleStore::update_item`](crate::store::ModuleStore::update_item).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    location: Location,
    children: Vec<Location>,
    metadata: Metadata,
    data: String,
    /// Marker set by the store when this copy came from a draft record.
    is_draft: bool,
}

impl Node {
    /// Constructs a new, empty node at the given location.
    #[must_use]
    pub const fn new(location: Location) -> Self {
        Self {
            location,
            children: Vec::new(),
            metadata: Metadata::new(),
            data: String::new(),
            is_draft: false,
        }
    }

    /// The node's location.
    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Re-addresses this detached copy.
    ///
    /// Combined with `update_item(..., allow_not_found: true)` this is how
    /// a node is copied to a new name (the copy at the old location is left
    /// behind, typically as an orphan).
    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    /// The node's category (carried by its location).
    #[must_use]
    pub const fn category(&self) -> &Category {
        self.location.category()
    }

    /// The ordered child locations. Order is presentation order.
    #[must_use]
    pub fn children(&self) -> &[Location] {
        &self.children
    }

    /// Mutable access to the children list.
    pub fn children_mut(&mut self) -> &mut Vec<Location> {
        &mut self.children
    }

    /// Whether this node has any children.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// The node's own metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable access to the node's own metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// The opaque content payload.
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Replaces the content payload.
    pub fn set_data(&mut self, data: String) {
        self.data = data;
    }

    /// Whether this copy came from a draft record.
    #[must_use]
    pub const fn is_draft(&self) -> bool {
        self.is_draft
    }

    pub(crate) const fn set_is_draft(&mut self, is_draft: bool) {
        self.is_draft = is_draft;
    }

    pub(crate) fn with_parts(
        location: Location,
        children: Vec<Location>,
        metadata: Metadata,
        data: String,
    ) -> Self {
        Self {
            location,
            children,
            metadata,
            data,
            is_draft: false,
        }
    }

    /// Returns a hash of the node's content (data, children, own
    /// metadata).
    ///
    /// Two revisions of a node with equal fingerprints are considered
    /// equal for publish-state resolution. The location and the
    /// `is_draft` marker deliberately do not contribute.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        content_fingerprint(&self.data, &self.children, &self.metadata)
    }
}

/// Calculates the content fingerprint shared by [`Node::fingerprint`] and
/// the store's internal records.
///
/// Children contribute through their canonical display form with the
/// revision stripped, so converting a child to a draft does not change the
/// parent's fingerprint.
///
/// # Panics
///
/// Panics if borsh serialization fails, which cannot happen for this data
/// structure.
pub(crate) fn content_fingerprint(
    data: &str,
    children: &[Location],
    metadata: &Metadata,
) -> String {
    #[derive(BorshSerialize)]
    struct FingerprintData<'a> {
        data: &'a str,
        children: Vec<String>,
        metadata: Vec<(&'a str, String)>,
    }

    let fingerprint_data = FingerprintData {
        data,
        children: children
            .iter()
            .map(|child| child.clone().into_published().to_string())
            .collect(),
        // BTreeMap iteration is key-ordered, so this encoding is stable.
        metadata: metadata
            .iter()
            .map(|(key, value)| (key.as_str(), value.to_string()))
            .collect(),
    };

    let encoded = borsh::to_vec(&fingerprint_data).expect("this should never fail");
    let hash = Sha256::digest(encoded);
    format!("{hash:x}")
}

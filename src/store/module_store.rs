//! The module store: a draft/publish versioned tree repository keyed by
//! [`Location`].
//!
//! Records are keyed by the published form of their location; the draft
//! shadow is modelled explicitly as a variant of [`VersionedNode`] rather
//! than as a second, convention-linked record. The store exclusively owns
//! its records: every [`Node`] handed out is a detached copy, and
//! mutations only take effect through [`ModuleStore::update_item`].

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    domain::{content_fingerprint, Category, CourseKey, Location, Metadata, Node},
    store::{inheritance, publish_state, PublishState},
};

/// Errors returned by the module store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested location has no record in the store.
    #[error("item {0} not found")]
    NotFound(Location),
    /// Creation collided with an existing record.
    #[error("item {0} already exists")]
    AlreadyExists(Location),
    /// The operation was invoked on a category that does not support it.
    /// This is a programming-contract violation, not a data error.
    #[error("category '{category}' of {location} does not support this operation")]
    InvalidCategory {
        /// The offending location.
        location: Location,
        /// Its category.
        category: Category,
    },
}

/// Revision filter for [`ModuleStore::get_items`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevisionOption {
    /// Return every node, preferring the draft incarnation where both
    /// exist.
    #[default]
    All,
    /// Return only nodes with a published incarnation, as published.
    PublishedOnly,
    /// Return only nodes with a draft incarnation.
    DraftOnly,
}

/// The persisted content of one revision of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeRecord {
    pub(crate) children: Vec<Location>,
    pub(crate) metadata: Metadata,
    pub(crate) data: String,
}

impl NodeRecord {
    fn from_node(node: &Node) -> Self {
        Self {
            children: node.children().to_vec(),
            metadata: node.metadata().clone(),
            data: node.data().to_string(),
        }
    }

    fn to_node(&self, location: Location, is_draft: bool) -> Node {
        let mut node = Node::with_parts(
            location,
            self.children.clone(),
            self.metadata.clone(),
            self.data.clone(),
        );
        node.set_is_draft(is_draft);
        node
    }

    pub(crate) fn fingerprint(&self) -> String {
        content_fingerprint(&self.data, &self.children, &self.metadata)
    }
}

/// The revisions that exist for one logical node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VersionedNode {
    /// Only a published copy exists.
    Published(NodeRecord),
    /// Only a draft copy exists (a private node).
    Draft(NodeRecord),
    /// Both copies exist; the draft shadows the published copy for
    /// authoring reads.
    Both {
        published: NodeRecord,
        draft: NodeRecord,
    },
}

impl VersionedNode {
    pub(crate) const fn published(&self) -> Option<&NodeRecord> {
        match self {
            Self::Published(record) | Self::Both {
                published: record, ..
            } => Some(record),
            Self::Draft(_) => None,
        }
    }

    pub(crate) const fn draft(&self) -> Option<&NodeRecord> {
        match self {
            Self::Draft(record) | Self::Both { draft: record, .. } => Some(record),
            Self::Published(_) => None,
        }
    }

    /// The record an authoring read should see, and whether it is a
    /// draft.
    const fn preferred(&self) -> (&NodeRecord, bool) {
        match self {
            Self::Published(record) => (record, false),
            Self::Draft(record) | Self::Both { draft: record, .. } => (record, true),
        }
    }

    fn with_draft(self, draft: NodeRecord) -> Self {
        match self {
            Self::Published(published) | Self::Both { published, .. } => {
                Self::Both { published, draft }
            }
            Self::Draft(_) => Self::Draft(draft),
        }
    }

    fn with_published(self, published: NodeRecord) -> Self {
        match self {
            Self::Published(_) => Self::Published(published),
            Self::Draft(draft) | Self::Both { draft, .. } => Self::Both { published, draft },
        }
    }

    fn without_draft(self) -> Option<Self> {
        match self {
            Self::Published(published) | Self::Both { published, .. } => {
                Some(Self::Published(published))
            }
            Self::Draft(_) => None,
        }
    }

    fn without_published(self) -> Option<Self> {
        match self {
            Self::Draft(draft) | Self::Both { draft, .. } => Some(Self::Draft(draft)),
            Self::Published(_) => None,
        }
    }

    /// Applies a transformation to every revision this entry holds.
    pub(crate) fn map_records(&mut self, mut f: impl FnMut(&mut NodeRecord)) {
        match self {
            Self::Published(record) | Self::Draft(record) => f(record),
            Self::Both { published, draft } => {
                f(published);
                f(draft);
            }
        }
    }
}

/// A versioned tree repository of course content.
///
/// All methods take `&self`: reads may run concurrently, writes are
/// serialized by an internal lock. The store provides per-node atomicity
/// only — multi-node sequences (append a child, then save the parent) are
/// the caller's responsibility to order.
#[derive(Debug, Default)]
pub struct ModuleStore {
    nodes: RwLock<BTreeMap<Location, VersionedNode>>,
}

/// Normalizes a location to the published form used as the record key.
fn base_key(location: &Location) -> Location {
    location.clone().into_published()
}

impl ModuleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the addressed incarnation of a node exists.
    #[must_use]
    pub fn has_item(&self, location: &Location) -> bool {
        let nodes = self.nodes.read();
        nodes.get(&base_key(location)).is_some_and(|entry| {
            if location.is_draft() {
                entry.draft().is_some()
            } else {
                true
            }
        })
    }

    /// Retrieves one node.
    ///
    /// A published-form location resolves to the draft incarnation when
    /// one exists (authoring semantics); address the revision explicitly
    /// via [`Location::into_draft`] to force a draft read. `depth` is a
    /// descendant-prefetch hint; it never changes the returned data, and
    /// this in-memory backend has nothing to prefetch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if neither incarnation exists, or
    /// if a draft was addressed explicitly and none exists.
    pub fn get_item(&self, location: &Location, depth: usize) -> Result<Node, StoreError> {
        let _ = depth;
        let key = base_key(location);
        let nodes = self.nodes.read();
        let entry = nodes
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(location.clone()))?;

        let (record, is_draft) = if location.is_draft() {
            let record = entry
                .draft()
                .ok_or_else(|| StoreError::NotFound(location.clone()))?;
            (record, true)
        } else {
            entry.preferred()
        };

        Ok(record.to_node(key, is_draft))
    }

    /// Returns all nodes of a course matching the category and revision
    /// filters, in location order.
    #[must_use]
    pub fn get_items(
        &self,
        course_key: &CourseKey,
        category: Option<&Category>,
        revision: RevisionOption,
    ) -> Vec<Node> {
        let nodes = self.nodes.read();
        nodes
            .iter()
            .filter(|(location, _)| location.course_key() == course_key)
            .filter(|(location, _)| category.is_none_or(|c| location.category() == c))
            .filter_map(|(location, entry)| match revision {
                RevisionOption::All => {
                    let (record, is_draft) = entry.preferred();
                    Some(record.to_node(location.clone(), is_draft))
                }
                RevisionOption::PublishedOnly => entry
                    .published()
                    .map(|record| record.to_node(location.clone(), false)),
                RevisionOption::DraftOnly => entry
                    .draft()
                    .map(|record| record.to_node(location.clone(), true)),
            })
            .collect()
    }

    /// Retrieves the course root node.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the course does not exist.
    pub fn get_course(&self, course_key: &CourseKey) -> Result<Node, StoreError> {
        self.get_item(&course_key.root_location(), 0)
    }

    /// Creates a course root node.
    ///
    /// The root is a direct-only category: it is written straight to the
    /// published revision and its name is the run identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the course root is
    /// already populated.
    #[instrument(skip(self))]
    pub fn create_course(&self, course_key: &CourseKey, user_id: u32) -> Result<Node, StoreError> {
        self.create_and_save_xmodule(&course_key.root_location(), user_id, None)
    }

    /// Creates a new node at the given location.
    ///
    /// Nodes in draft-capable categories are persisted as draft-only
    /// (private); direct-only categories are written straight to the
    /// published revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if any incarnation already
    /// exists at the location.
    pub fn create_and_save_xmodule(
        &self,
        location: &Location,
        user_id: u32,
        definition_data: Option<String>,
    ) -> Result<Node, StoreError> {
        let key = base_key(location);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&key) {
            return Err(StoreError::AlreadyExists(location.clone()));
        }

        let record = NodeRecord {
            children: Vec::new(),
            metadata: Metadata::new(),
            data: definition_data.unwrap_or_default(),
        };

        let is_draft = key.category().supports_drafts();
        let entry = if is_draft {
            VersionedNode::Draft(record.clone())
        } else {
            VersionedNode::Published(record.clone())
        };

        debug!(%key, user_id, is_draft, "created item");
        nodes.insert(key.clone(), entry);
        Ok(record.to_node(key, is_draft))
    }

    /// Persists mutations to an existing node (metadata, data, children).
    ///
    /// Writes go to the draft revision if the node's category supports
    /// drafts; otherwise directly to the published revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] unless `allow_not_found` is set,
    /// in which case the node is upserted (the mechanism behind
    /// copy-to-new-name flows that deliberately orphan the original).
    pub fn update_item(
        &self,
        node: &Node,
        user_id: u32,
        allow_not_found: bool,
    ) -> Result<Node, StoreError> {
        let key = base_key(node.location());
        let record = NodeRecord::from_node(node);
        let draft_capable = key.category().supports_drafts();

        let mut nodes = self.nodes.write();
        let entry = match nodes.remove(&key) {
            Some(existing) => {
                if draft_capable {
                    existing.with_draft(record.clone())
                } else {
                    existing.with_published(record.clone())
                }
            }
            None if allow_not_found => {
                debug!(%key, user_id, "upserting item via allow_not_found");
                if draft_capable {
                    VersionedNode::Draft(record.clone())
                } else {
                    VersionedNode::Published(record.clone())
                }
            }
            None => return Err(StoreError::NotFound(node.location().clone())),
        };

        nodes.insert(key.clone(), entry);
        debug!(%key, user_id, "updated item");
        Ok(record.to_node(key, draft_capable))
    }

    /// Creates a draft shadow copy of a currently published node.
    ///
    /// The published copy remains unchanged until explicitly republished.
    /// Idempotent: converting a node that already has a draft is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCategory`] for direct-only
    /// categories and [`StoreError::NotFound`] if the node does not
    /// exist.
    pub fn convert_to_draft(&self, location: &Location, user_id: u32) -> Result<Node, StoreError> {
        let key = base_key(location);
        if !key.category().supports_drafts() {
            return Err(StoreError::InvalidCategory {
                location: location.clone(),
                category: key.category().clone(),
            });
        }

        let mut nodes = self.nodes.write();
        let entry = nodes
            .remove(&key)
            .ok_or_else(|| StoreError::NotFound(location.clone()))?;

        let entry = match entry {
            VersionedNode::Published(published) => {
                debug!(%key, user_id, "converted to draft");
                VersionedNode::Both {
                    draft: published.clone(),
                    published,
                }
            }
            already_drafted @ (VersionedNode::Draft(_) | VersionedNode::Both { .. }) => {
                already_drafted
            }
        };

        let node = entry
            .draft()
            .expect("draft exists after conversion")
            .to_node(key.clone(), true);
        nodes.insert(key, entry);
        Ok(node)
    }

    /// Copies the draft (or current) content to the published revision.
    ///
    /// The draft is **not** deleted: authoring continues against the
    /// draft shadow after publishing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the node does not exist, or
    /// [`StoreError::InvalidCategory`] for unversioned categories.
    pub fn publish(&self, location: &Location, user_id: u32) -> Result<Node, StoreError> {
        let key = base_key(location);
        if !key.category().is_versioned() {
            return Err(StoreError::InvalidCategory {
                location: location.clone(),
                category: key.category().clone(),
            });
        }

        let mut nodes = self.nodes.write();
        let entry = nodes
            .remove(&key)
            .ok_or_else(|| StoreError::NotFound(location.clone()))?;

        let entry = match entry {
            VersionedNode::Published(published) => VersionedNode::Published(published),
            VersionedNode::Draft(draft) => VersionedNode::Both {
                published: draft.clone(),
                draft,
            },
            VersionedNode::Both { draft, .. } => VersionedNode::Both {
                published: draft.clone(),
                draft,
            },
        };

        debug!(%key, user_id, "published item");
        let node = entry
            .published()
            .expect("published exists after publish")
            .to_node(key.clone(), false);
        nodes.insert(key, entry);
        Ok(node)
    }

    /// Removes the published copy of a node, returning it to the private
    /// state. The draft copy is preserved (or created from the published
    /// content if none existed).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCategory`] for direct-only
    /// categories and [`StoreError::NotFound`] if no published copy
    /// exists.
    pub fn unpublish(&self, location: &Location, user_id: u32) -> Result<Node, StoreError> {
        let key = base_key(location);
        if !key.category().supports_drafts() {
            return Err(StoreError::InvalidCategory {
                location: location.clone(),
                category: key.category().clone(),
            });
        }

        let mut nodes = self.nodes.write();
        let entry = nodes
            .remove(&key)
            .ok_or_else(|| StoreError::NotFound(location.clone()))?;

        let entry = match entry {
            VersionedNode::Published(published) => VersionedNode::Draft(published),
            VersionedNode::Both { draft, .. } => VersionedNode::Draft(draft),
            draft_only @ VersionedNode::Draft(_) => {
                nodes.insert(key, draft_only);
                return Err(StoreError::NotFound(location.clone()));
            }
        };

        debug!(%key, user_id, "unpublished item");
        let node = entry
            .draft()
            .expect("draft exists after unpublish")
            .to_node(key.clone(), true);
        nodes.insert(key, entry);
        Ok(node)
    }

    /// Deletes the addressed revision of a node.
    ///
    /// Deleting the draft of a `Both` node leaves the published copy in
    /// place; the record disappears entirely once its last revision is
    /// deleted. Children of deleted nodes are untouched and may become
    /// orphans — orphaning is allowed, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the addressed revision does
    /// not exist.
    pub fn delete_item(&self, location: &Location, user_id: u32) -> Result<(), StoreError> {
        let key = base_key(location);
        let mut nodes = self.nodes.write();
        let entry = nodes
            .remove(&key)
            .ok_or_else(|| StoreError::NotFound(location.clone()))?;

        let addressed_exists = if location.is_draft() {
            entry.draft().is_some()
        } else {
            entry.published().is_some()
        };
        if !addressed_exists {
            nodes.insert(key, entry);
            return Err(StoreError::NotFound(location.clone()));
        }

        let remaining = if location.is_draft() {
            entry.without_draft()
        } else {
            entry.without_published()
        };
        if let Some(remaining) = remaining {
            nodes.insert(key.clone(), remaining);
        }
        debug!(%key, user_id, "deleted item revision");
        Ok(())
    }

    /// Removes every node of a course. Used when re-importing a course
    /// over itself; assets are not touched.
    #[instrument(skip(self))]
    pub fn delete_course(&self, course_key: &CourseKey, user_id: u32) {
        let mut nodes = self.nodes.write();
        nodes.retain(|location, _| location.course_key() != course_key);
    }

    /// Computes the publish state of a node: see
    /// [`PublishState`] for the resolution table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCategory`] if the node's category
    /// does not participate in versioning, or [`StoreError::NotFound`]
    /// if the node has no record at all.
    pub fn compute_publish_state(&self, node: &Node) -> Result<PublishState, StoreError> {
        let key = base_key(node.location());
        let nodes = self.nodes.read();
        let entry = nodes.get(&key);
        publish_state::resolve(node, entry)
    }

    /// Finds the parent of a node: the node whose children list contains
    /// it. Returns `None` for course roots and orphans.
    #[must_use]
    pub fn parent_of(&self, location: &Location) -> Option<Location> {
        let key = base_key(location);
        let nodes = self.nodes.read();
        nodes
            .iter()
            .filter(|(candidate, _)| candidate.course_key() == key.course_key())
            .find(|(_, entry)| {
                let (record, _) = entry.preferred();
                record
                    .children
                    .iter()
                    .any(|child| base_key(child) == key)
            })
            .map(|(parent, _)| parent.clone())
    }

    /// Returns the nodes of a course that are reachable by direct lookup
    /// but appear in no parent's children list (the course root is not an
    /// orphan).
    #[must_use]
    pub fn orphans(&self, course_key: &CourseKey) -> Vec<Location> {
        let nodes = self.nodes.read();

        let mut referenced: HashSet<Location> = HashSet::new();
        for (_, entry) in nodes
            .iter()
            .filter(|(location, _)| location.course_key() == course_key)
        {
            for record in [entry.published(), entry.draft()].into_iter().flatten() {
                referenced.extend(record.children.iter().map(base_key));
            }
        }

        let root = course_key.root_location();
        nodes
            .keys()
            .filter(|location| location.course_key() == course_key)
            .filter(|location| **location != root)
            .filter(|location| !referenced.contains(*location))
            .cloned()
            .collect()
    }

    /// Resolves the metadata a node inherits from its ancestors.
    ///
    /// This is read-only derived state — it is never persisted and never
    /// mixed into the node's own metadata. See
    /// [`INHERITABLE_KEYS`](crate::store::INHERITABLE_KEYS) for the keys
    /// that participate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the node does not exist.
    pub fn inherited_metadata(&self, location: &Location) -> Result<Metadata, StoreError> {
        if !self.has_item(location) {
            return Err(StoreError::NotFound(location.clone()));
        }
        Ok(inheritance::inherited_metadata(self, location))
    }

    pub(crate) fn versioned_entries(
        &self,
        course_key: &CourseKey,
    ) -> Vec<(Location, VersionedNode)> {
        let nodes = self.nodes.read();
        nodes
            .iter()
            .filter(|(location, _)| location.course_key() == course_key)
            .map(|(location, entry)| (location.clone(), entry.clone()))
            .collect()
    }

    pub(crate) fn insert_entry(&self, base: Location, entry: VersionedNode) {
        let key = base_key(&base);
        let mut nodes = self.nodes.write();
        if nodes.insert(key.clone(), entry).is_some() {
            warn!(%key, "replaced existing entry during bulk insert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, CourseKey};

    fn course_key() -> CourseKey {
        "MITx/999/Robot_Super_Course".parse().unwrap()
    }

    fn vertical(name: &str) -> Location {
        course_key()
            .make_usage_key(Category::Vertical, name)
            .unwrap()
    }

    #[test]
    fn get_item_fails_for_missing_location() {
        let store = ModuleStore::new();
        let err = store.get_item(&vertical("nope"), 0).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn create_is_private_and_collisions_are_rejected() {
        let store = ModuleStore::new();
        let location = vertical("v1");

        let node = store
            .create_and_save_xmodule(&location, 1, None)
            .unwrap();
        assert!(node.is_draft());
        assert_eq!(
            store.compute_publish_state(&node).unwrap(),
            PublishState::Private
        );

        let err = store
            .create_and_save_xmodule(&location, 1, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn publish_state_monotonicity() {
        let store = ModuleStore::new();
        let location = vertical("v1");

        // create → private
        let node = store
            .create_and_save_xmodule(&location, 1, None)
            .unwrap();
        assert_eq!(
            store.compute_publish_state(&node).unwrap(),
            PublishState::Private
        );

        // publish → public
        let node = store.publish(&location, 1).unwrap();
        assert_eq!(
            store.compute_publish_state(&node).unwrap(),
            PublishState::Public
        );

        // draft-path edit without publish → draft
        let mut node = store.get_item(&location, 0).unwrap();
        node.set_data("<p>edited</p>".to_string());
        let node = store.update_item(&node, 1, false).unwrap();
        assert_eq!(
            store.compute_publish_state(&node).unwrap(),
            PublishState::Draft
        );

        // republish → public again
        let node = store.publish(&location, 1).unwrap();
        assert_eq!(
            store.compute_publish_state(&node).unwrap(),
            PublishState::Public
        );
    }

    #[test]
    fn publish_keeps_the_draft_shadow() {
        let store = ModuleStore::new();
        let location = vertical("v1");

        store.create_and_save_xmodule(&location, 1, None).unwrap();
        store.publish(&location, 1).unwrap();

        // The draft incarnation is still addressable after publishing.
        let draft = store
            .get_item(&location.clone().into_draft(), 0)
            .unwrap();
        assert!(draft.is_draft());
    }

    #[test]
    fn convert_to_draft_is_idempotent() {
        let store = ModuleStore::new();
        let location = vertical("v1");

        store.create_and_save_xmodule(&location, 1, None).unwrap();
        store.publish(&location, 1).unwrap();

        let first = store.convert_to_draft(&location, 1).unwrap();
        let second = store.convert_to_draft(&location, 1).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.compute_publish_state(&second).unwrap(),
            PublishState::Public,
            "an untouched draft shadow is content-equal to the published copy"
        );
    }

    #[test]
    fn convert_to_draft_rejects_direct_only_categories() {
        let store = ModuleStore::new();
        store.create_course(&course_key(), 1).unwrap();

        let err = store
            .convert_to_draft(&course_key().root_location(), 1)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidCategory { .. }));
    }

    #[test]
    fn update_item_requires_existing_node_unless_allowed() {
        let store = ModuleStore::new();
        let node = Node::new(vertical("ghost"));

        let err = store.update_item(&node, 1, false).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let upserted = store.update_item(&node, 1, true).unwrap();
        assert!(upserted.is_draft());
        assert!(store.has_item(&vertical("ghost")));
    }

    #[test]
    fn direct_only_categories_write_straight_to_published() {
        let store = ModuleStore::new();
        let course = store.create_course(&course_key(), 1).unwrap();
        assert!(!course.is_draft());
        assert_eq!(
            store.compute_publish_state(&course).unwrap(),
            PublishState::Public
        );

        let mut course = store.get_course(&course_key()).unwrap();
        course
            .metadata_mut()
            .insert("display_name".to_string(), "Robot Super Course".into());
        let course = store.update_item(&course, 1, false).unwrap();
        assert_eq!(
            store.compute_publish_state(&course).unwrap(),
            PublishState::Public
        );
    }

    #[test]
    fn orphaned_copy_is_retrievable_with_children_intact() {
        let store = ModuleStore::new();
        store.create_course(&course_key(), 1).unwrap();

        let location = vertical("vertical_test");
        let child = course_key()
            .make_usage_key(Category::Problem, "p1")
            .unwrap();
        store.create_and_save_xmodule(&location, 1, None).unwrap();
        store.create_and_save_xmodule(&child, 1, None).unwrap();

        let mut vertical_node = store.get_item(&location, 0).unwrap();
        vertical_node.children_mut().push(child);
        store.update_item(&vertical_node, 1, false).unwrap();

        let mut root = store.get_course(&course_key()).unwrap();
        root.children_mut().push(location.clone());
        store.update_item(&root, 1, false).unwrap();

        // Re-address the detached copy and upsert: the copy at the new
        // name has no incoming references from any parent.
        let mut vertical_node = store.get_item(&location, 0).unwrap();
        vertical_node.set_location(vertical_node.location().with_name("no_references").unwrap());
        store.update_item(&vertical_node, 1, true).unwrap();

        let orphan = store.get_item(&vertical("no_references"), 0).unwrap();
        assert_eq!(orphan.location().name(), "no_references");
        assert_eq!(orphan.children().len(), vertical_node.children().len());

        let orphans = store.orphans(&course_key());
        assert!(orphans.contains(&vertical("no_references")));
        assert!(!orphans.contains(&location), "original is still referenced");
    }

    #[test]
    fn unpublish_returns_node_to_private() {
        let store = ModuleStore::new();
        let location = vertical("v1");

        store.create_and_save_xmodule(&location, 1, None).unwrap();
        store.publish(&location, 1).unwrap();
        let node = store.unpublish(&location, 1).unwrap();

        assert!(node.is_draft());
        assert_eq!(
            store.compute_publish_state(&node).unwrap(),
            PublishState::Private
        );
    }

    #[test]
    fn unpublish_without_published_copy_fails() {
        let store = ModuleStore::new();
        let location = vertical("v1");
        store.create_and_save_xmodule(&location, 1, None).unwrap();

        let err = store.unpublish(&location, 1).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.has_item(&location), "failed unpublish must not drop the node");
    }

    #[test]
    fn delete_item_removes_only_the_addressed_revision() {
        let store = ModuleStore::new();
        let location = vertical("v1");

        store.create_and_save_xmodule(&location, 1, None).unwrap();
        store.publish(&location, 1).unwrap();

        store
            .delete_item(&location.clone().into_draft(), 1)
            .unwrap();
        let node = store.get_item(&location, 0).unwrap();
        assert!(!node.is_draft());

        store.delete_item(&location, 1).unwrap();
        assert!(!store.has_item(&location));
    }

    #[test]
    fn get_items_filters_by_category_and_revision() {
        let store = ModuleStore::new();
        store.create_course(&course_key(), 1).unwrap();

        let published = vertical("a_published_vertical");
        store.create_and_save_xmodule(&published, 1, None).unwrap();
        store.publish(&published, 1).unwrap();

        let private = vertical("a_private_vertical");
        store.create_and_save_xmodule(&private, 1, None).unwrap();

        let sequential = course_key()
            .make_usage_key(Category::Sequential, "s1")
            .unwrap();
        store.create_and_save_xmodule(&sequential, 1, None).unwrap();

        let all_verticals =
            store.get_items(&course_key(), Some(&Category::Vertical), RevisionOption::All);
        assert_eq!(all_verticals.len(), 2);

        let published_only = store.get_items(
            &course_key(),
            Some(&Category::Vertical),
            RevisionOption::PublishedOnly,
        );
        assert_eq!(published_only.len(), 1);
        assert_eq!(published_only[0].location(), &published);
        assert!(!published_only[0].is_draft());

        let drafts = store.get_items(
            &course_key(),
            Some(&Category::Vertical),
            RevisionOption::DraftOnly,
        );
        assert_eq!(drafts.len(), 2, "published vertical keeps its draft shadow");

        let everything = store.get_items(&course_key(), None, RevisionOption::All);
        assert_eq!(everything.len(), 4);
    }

    #[test]
    fn parent_of_resolves_through_children_lists() {
        let store = ModuleStore::new();
        store.create_course(&course_key(), 1).unwrap();

        let chapter = course_key()
            .make_usage_key(Category::Chapter, "c1")
            .unwrap();
        store.create_and_save_xmodule(&chapter, 1, None).unwrap();

        let mut root = store.get_course(&course_key()).unwrap();
        root.children_mut().push(chapter.clone());
        store.update_item(&root, 1, false).unwrap();

        assert_eq!(
            store.parent_of(&chapter),
            Some(course_key().root_location())
        );
        assert_eq!(store.parent_of(&course_key().root_location()), None);
    }

    #[test]
    fn populates_branching_course() {
        // 2 chapters → 4 sequentials → 8 verticals → 16 problems.
        let store = ModuleStore::new();
        store.create_course(&course_key(), 1).unwrap();

        let stack = [
            Category::Chapter,
            Category::Sequential,
            Category::Vertical,
            Category::Problem,
        ];

        fn descend(
            store: &ModuleStore,
            parent: &Location,
            stack: &[Category],
            counter: &mut u32,
        ) {
            let Some((category, rest)) = stack.split_first() else {
                return;
            };
            let mut parent_node = store.get_item(parent, 0).unwrap();
            for _ in 0..2 {
                *counter += 1;
                let child = parent
                    .course_key()
                    .make_usage_key(category.clone(), &format!("{category}_{counter}"))
                    .unwrap();
                store.create_and_save_xmodule(&child, 1, None).unwrap();
                parent_node.children_mut().push(child.clone());
                descend(store, &child, rest, counter);
            }
            store.update_item(&parent_node, 1, false).unwrap();
        }

        let mut counter = 0;
        descend(&store, &course_key().root_location(), &stack, &mut counter);

        let verticals =
            store.get_items(&course_key(), Some(&Category::Vertical), RevisionOption::All);
        assert_eq!(verticals.len(), 8);

        let root = store.get_course(&course_key()).unwrap();
        assert_eq!(root.children().len(), 2);

        let problems =
            store.get_items(&course_key(), Some(&Category::Problem), RevisionOption::All);
        assert_eq!(problems.len(), 16);
        assert!(store.orphans(&course_key()).is_empty());
    }

    #[test]
    fn returned_nodes_are_detached_copies() {
        let store = ModuleStore::new();
        let location = vertical("v1");
        store.create_and_save_xmodule(&location, 1, None).unwrap();

        let mut node = store.get_item(&location, 0).unwrap();
        node.set_data("<p>local only</p>".to_string());

        let reread = store.get_item(&location, 0).unwrap();
        assert_eq!(reread.data(), "", "mutation must not leak into the store");
    }

    #[test]
    fn depth_hint_does_not_change_returned_data() {
        let store = ModuleStore::new();
        let location = vertical("v1");
        store.create_and_save_xmodule(&location, 1, None).unwrap();

        assert_eq!(
            store.get_item(&location, 0).unwrap(),
            store.get_item(&location, 3).unwrap()
        );
    }
}

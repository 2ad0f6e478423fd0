//! Course import, export and duplication.
//!
//! The import engine operates on explicit store handles; nothing here
//! reaches for shared global state. Tree import is best-effort: individual
//! node failures are collected and reported while the rest of the tree
//! still lands.

use std::collections::{BTreeMap, HashSet};

use petgraph::{algo::is_cyclic_directed, graphmap::DiGraphMap};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    content::{asset_url_prefix, Asset, ContentStore},
    domain::{Category, CourseKey, InvalidKeyError, Location, Metadata, Node},
    store::{ModuleStore, StoreError},
};

/// Attributes owned by each stored copy of an asset. Everything else
/// carries over verbatim when an asset is duplicated.
const COPY_OWNED_ASSET_KEYS: &[&str] = &[
    "_id",
    "filename",
    "uploadDate",
    "content_son",
    "thumbnail_location",
];

/// One node of an already-parsed course tree, as read from an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportNode {
    /// The node's category tag.
    pub category: Category,
    /// The node's name segment.
    pub name: String,
    /// Explicitly set metadata keys.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// The opaque content payload.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    /// Child trees, in presentation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ImportNode>,
}

/// Errors that abort an import before anything is written.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The tree contains a node nested under itself.
    #[error("import tree contains cyclic references")]
    CyclicReferences,
    /// The root node is not a course.
    #[error("root node category '{0}' cannot root a course")]
    InvalidRoot(Category),
}

/// Why one node of an otherwise-successful import failed.
#[derive(Debug, Error)]
pub enum NodeImportError {
    /// The node's name is not a valid key segment.
    #[error(transparent)]
    InvalidName(#[from] InvalidKeyError),
    /// The store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A per-node import failure. The failed node and its subtree are skipped;
/// the parent's children list omits them.
#[derive(Debug, Error)]
#[error("failed to import {category}/{name}")]
pub struct ImportFailure {
    /// The failed node's category.
    pub category: Category,
    /// The failed node's name.
    pub name: String,
    /// What went wrong.
    #[source]
    pub error: NodeImportError,
}

/// The outcome of a best-effort tree import.
#[derive(Debug)]
pub struct ImportReport {
    /// The imported course root.
    pub root: Location,
    /// Nodes written, root included.
    pub imported: usize,
    /// Nodes that could not be written.
    pub failures: Vec<ImportFailure>,
}

/// Errors raised by course duplication.
#[derive(Debug, Error)]
pub enum DuplicateError {
    /// The source course does not exist.
    #[error("source course {0} not found")]
    SourceMissing(CourseKey),
    /// The target course already exists. Callers decide whether to delete
    /// and retry.
    #[error("target course {0} already exists")]
    TargetExists(CourseKey),
}

/// The import engine, bound to explicit store handles.
#[derive(Debug, Clone, Copy)]
pub struct Importer<'a> {
    store: &'a ModuleStore,
    content: &'a ContentStore,
}

impl<'a> Importer<'a> {
    /// Binds the engine to a module store and an asset store.
    #[must_use]
    pub const fn new(store: &'a ModuleStore, content: &'a ContentStore) -> Self {
        Self { store, content }
    }

    /// Imports a course tree into the target course.
    ///
    /// Nodes are written depth-first in declaration order and published as
    /// they land, so a freshly imported course is fully public. The root
    /// node is renamed to the target run. Individual node failures are
    /// collected into the report rather than aborting the import.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] if the root is not a course or the tree
    /// contains cyclic references; in either case nothing is written.
    #[instrument(skip(self, root))]
    pub fn import_tree(
        &self,
        root: &ImportNode,
        target: &CourseKey,
        user_id: u32,
    ) -> Result<ImportReport, ImportError> {
        if root.category != Category::Course {
            return Err(ImportError::InvalidRoot(root.category.clone()));
        }
        if has_cycle(root) {
            return Err(ImportError::CyclicReferences);
        }

        let mut failures = Vec::new();
        let mut imported = 0;
        let root_location = target.root_location();
        self.import_node(root, root_location.clone(), user_id, &mut imported, &mut failures);

        debug!(%root_location, imported, failed = failures.len(), "import complete");
        Ok(ImportReport {
            root: root_location,
            imported,
            failures,
        })
    }

    /// Writes one node and its subtree; returns `false` if the node itself
    /// failed (the subtree is then skipped).
    fn import_node(
        &self,
        node: &ImportNode,
        location: Location,
        user_id: u32,
        imported: &mut usize,
        failures: &mut Vec<ImportFailure>,
    ) -> bool {
        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let child_location = match location
                .course_key()
                .make_usage_key(child.category.clone(), &child.name)
            {
                Ok(child_location) => child_location,
                Err(error) => {
                    failures.push(ImportFailure {
                        category: child.category.clone(),
                        name: child.name.clone(),
                        error: error.into(),
                    });
                    continue;
                }
            };
            if self.import_node(child, child_location.clone(), user_id, imported, failures) {
                children.push(child_location);
            }
        }

        let mut item = Node::new(location.clone());
        *item.children_mut() = children;
        *item.metadata_mut() = node.metadata.clone();
        item.set_data(node.data.clone());

        let written = self
            .store
            .update_item(&item, user_id, true)
            .map_err(NodeImportError::from)
            .and_then(|_| {
                if location.category().supports_drafts() {
                    self.store.publish(&location, user_id)?;
                }
                Ok(())
            });

        match written {
            Ok(()) => {
                *imported += 1;
                true
            }
            Err(error) => {
                failures.push(ImportFailure {
                    category: node.category.clone(),
                    name: node.name.clone(),
                    error,
                });
                false
            }
        }
    }

    /// Exports a course as an import tree, the inverse of
    /// [`import_tree`](Self::import_tree).
    ///
    /// Reads authoring-preferred content (drafts where they exist).
    /// Dangling child references are skipped; orphans are not exported, as
    /// they are unreachable from the root.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the course does not exist.
    pub fn export_tree(&self, course_key: &CourseKey) -> Result<ImportNode, StoreError> {
        let root = self.store.get_course(course_key)?;
        let mut visited = HashSet::new();
        Ok(self.export_node(&root, &mut visited))
    }

    fn export_node(&self, node: &Node, visited: &mut HashSet<Location>) -> ImportNode {
        let children = node
            .children()
            .iter()
            .filter_map(|child_location| {
                if !visited.insert(child_location.clone().into_published()) {
                    warn!(%child_location, "skipping repeated reference during export");
                    return None;
                }
                match self.store.get_item(child_location, 0) {
                    Ok(child) => Some(self.export_node(&child, visited)),
                    Err(_) => {
                        debug!(%child_location, "skipping dangling reference during export");
                        None
                    }
                }
            })
            .collect();

        ImportNode {
            category: node.category().clone(),
            name: node.location().name().to_string(),
            metadata: node.metadata().clone(),
            data: node.data().to_string(),
            children,
        }
    }

    /// Copies a whole course, nodes and assets, to a new course key.
    ///
    /// The copy preserves each node's draft/published structure, so
    /// publish states carry over exactly. Children are remapped to the
    /// target course and the root is renamed to the target run.
    /// Course-specific asset references in data and metadata are rewritten
    /// to the target course; portable `/static/` references are left
    /// untouched. Cross-course child references are dropped with a
    /// warning, leaving their subtrees behind as orphans in the source.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateError`] if the source is missing or the target
    /// already exists.
    #[instrument(skip(self))]
    pub fn duplicate_course(
        &self,
        source: &CourseKey,
        target: &CourseKey,
        user_id: u32,
    ) -> Result<(), DuplicateError> {
        if self.store.get_course(source).is_err() {
            return Err(DuplicateError::SourceMissing(source.clone()));
        }
        if self.store.get_course(target).is_ok() {
            return Err(DuplicateError::TargetExists(target.clone()));
        }

        let rewriter = ReferenceRewriter::new(source, target);
        let source_root = source.root_location();

        for (base, mut entry) in self.store.versioned_entries(source) {
            entry.map_records(|record| {
                record.children = remap_children(&record.children, source, target);
                record.data = rewriter.rewrite(&record.data);
                for value in record.metadata.values_mut() {
                    rewriter.rewrite_value(value);
                }
            });

            let target_base = if base == source_root {
                target.root_location()
            } else {
                base.map_into_course(target)
            };
            self.store.insert_entry(target_base, entry);
        }

        let (assets, count) = self.content.get_all_content_for_course(source);
        for (location, attributes) in assets {
            if let Err(error) = self.copy_asset(&location, &attributes, target) {
                warn!(%location, %error, "skipping unreadable asset during duplication");
            }
        }
        debug!(%source, %target, assets = count, "duplicated course");

        Ok(())
    }

    fn copy_asset(
        &self,
        location: &Location,
        attributes: &Metadata,
        target: &CourseKey,
    ) -> Result<(), crate::content::ContentError> {
        let record = self.content.find(location)?;
        let content_type = record.content_type().unwrap_or("application/octet-stream");

        let copy = Asset::new(
            location.map_into_course(target),
            content_type,
            record.data().to_vec(),
        )?;
        let copy_location = copy.location().clone();
        self.content.save(&copy);

        for (key, value) in attributes {
            if COPY_OWNED_ASSET_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.content
                .set_attr(&copy_location, key, value.clone())?;
        }
        Ok(())
    }
}

/// Remaps child references into the target course, dropping references
/// that do not belong to the source course.
fn remap_children(
    children: &[Location],
    source: &CourseKey,
    target: &CourseKey,
) -> Vec<Location> {
    children
        .iter()
        .filter_map(|child| {
            if child.course_key() == source {
                Some(child.map_into_course(target))
            } else {
                warn!(%child, "dropping malformed cross-course reference");
                None
            }
        })
        .collect()
}

/// Rewrites course-specific `/c4x/<org>/<course>/asset/` references to the
/// target course.
struct ReferenceRewriter {
    pattern: Regex,
    replacement: String,
}

impl ReferenceRewriter {
    fn new(source: &CourseKey, target: &CourseKey) -> Self {
        let pattern = Regex::new(&regex::escape(&asset_url_prefix(source)))
            .expect("an escaped literal is a valid pattern");
        Self {
            pattern,
            replacement: asset_url_prefix(target),
        }
    }

    fn rewrite(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }

    /// Rewrites every string in a metadata value, recursively.
    fn rewrite_value(&self, value: &mut Value) {
        match value {
            Value::String(text) => *text = self.rewrite(text),
            Value::Array(entries) => {
                for entry in entries {
                    self.rewrite_value(entry);
                }
            }
            Value::Object(map) => {
                for entry in map.values_mut() {
                    self.rewrite_value(entry);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
}

/// Whether any node of the tree is nested under a node with the same
/// identity (category and name).
fn has_cycle(root: &ImportNode) -> bool {
    fn id_of(
        ids: &mut BTreeMap<(String, String), usize>,
        node: &ImportNode,
    ) -> usize {
        let next = ids.len();
        *ids.entry((node.category.to_string(), node.name.clone()))
            .or_insert(next)
    }

    fn walk(
        node: &ImportNode,
        ids: &mut BTreeMap<(String, String), usize>,
        graph: &mut DiGraphMap<usize, ()>,
    ) {
        let from = id_of(ids, node);
        graph.add_node(from);
        for child in &node.children {
            let to = id_of(ids, child);
            graph.add_edge(from, to, ());
            walk(child, ids, graph);
        }
    }

    let mut ids = BTreeMap::new();
    let mut graph = DiGraphMap::new();
    walk(root, &mut ids, &mut graph);
    is_cyclic_directed(&graph)
}

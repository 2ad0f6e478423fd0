//! Versioned course-content storage
//!
//! Courses are trees of content nodes addressed by [`domain::Location`].
//! Draft-capable nodes carry a private draft revision alongside their
//! published copy; the [`store::ModuleStore`] resolves publish states and
//! metadata inheritance from the tree, the [`content::ContentStore`] holds
//! course assets, and the [`import::Importer`] moves whole courses in,
//! out, and between course keys.

pub mod domain;

/// The versioned tree store and its query layers.
pub mod store;

/// The asset store.
pub mod content;

/// Course import, export and duplication.
pub mod import;

/// Filesystem archive directory used for persistence.
pub mod archive;
pub use archive::{Archive, Loaded, Unloaded};

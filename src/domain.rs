//! Domain models for versioned course content.
//!
//! This module contains the core domain types: locations, categories,
//! nodes, courses, and configuration.

/// Category tags and their capabilities.
pub mod category;
pub use category::Category;

mod config;
pub use config::Config;

/// The course root and its lazily-derived state.
pub mod course;
pub use course::{Course, FetchError, GradingContext, HttpTocFetcher, Textbook, TocFetcher};

/// Canonical identifiers for nodes and assets.
pub mod location;
pub use location::{CourseKey, InvalidKeyError, KeyString, Location, Revision};

mod node;
pub(crate) use node::content_fingerprint;
pub use node::{Metadata, Node};

//! The course root node and its derived, lazily-computed state.

use std::{cell::OnceCell, collections::BTreeMap, time::Duration};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    domain::{CourseKey, Location, Node},
    store::{ModuleStore, StoreError},
};

/// Fetches a textbook's table of contents from its book URL.
///
/// Abstracted behind a trait so that consumers (and tests) can supply a
/// non-network implementation.
pub trait TocFetcher {
    /// Retrieves the raw table-of-contents document at the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the document cannot be retrieved.
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Errors that can occur when fetching a table of contents.
///
/// These are degraded-but-non-fatal: a course remains usable without its
/// tables of contents.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP request failed or returned a non-success status.
    #[error("unable to retrieve table of contents from {url}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The HTTP client could not be constructed.
    #[error("unable to construct HTTP client")]
    Client(#[source] reqwest::Error),
}

/// A [`TocFetcher`] backed by a blocking HTTP client with an explicit
/// timeout.
#[derive(Debug)]
pub struct HttpTocFetcher {
    client: reqwest::blocking::Client,
}

impl HttpTocFetcher {
    /// Constructs a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the underlying client cannot be
    /// initialised.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl TocFetcher for HttpTocFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!("retrieving textbook table of contents from {url}");
        let http_error = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };

        self.client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(http_error)?
            .text()
            .map_err(http_error)
    }
}

/// A textbook attached to a course.
///
/// The table of contents lives at `<book_url>toc.xml` and is fetched
/// lazily on first access, then cached for the lifetime of this object.
/// Fetch failures are not cached, so a transient failure can recover on a
/// later call. Not thread-safe across concurrent first access; the cell is
/// `!Sync` by construction.
#[derive(Debug)]
pub struct Textbook {
    title: String,
    book_url: String,
    table_of_contents: OnceCell<String>,
}

impl Textbook {
    /// Creates a textbook. No network access happens here.
    #[must_use]
    pub const fn new(title: String, book_url: String) -> Self {
        Self {
            title,
            book_url,
            table_of_contents: OnceCell::new(),
        }
    }

    /// The textbook's display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The base URL the textbook's resources are served from.
    #[must_use]
    pub fn book_url(&self) -> &str {
        &self.book_url
    }

    /// The raw table-of-contents document, fetched on first access and
    /// cached afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the document cannot be retrieved. The
    /// textbook (and its course) remain usable after a failure.
    pub fn table_of_contents(&self, fetcher: &dyn TocFetcher) -> Result<&str, FetchError> {
        if let Some(cached) = self.table_of_contents.get() {
            return Ok(cached);
        }

        let toc_url = format!("{}toc.xml", self.book_url);
        let document = fetcher.fetch(&toc_url)?;
        Ok(self.table_of_contents.get_or_init(|| document))
    }
}

/// A graded section and the scored descendants that can contribute to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedSection {
    /// The section (sequential) carrying the `graded` flag.
    pub section: Location,
    /// Descendants of the section whose category produces a score.
    pub scored_descendants: Vec<Location>,
}

/// A derived index over a course's descendant tree used for grading.
///
/// Never persisted; recomputed when the owning [`Course`] is
/// reconstructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradingContext {
    /// Graded sections keyed by their `format` metadata (assignment type).
    pub graded_sections: BTreeMap<String, Vec<GradedSection>>,
    /// Every scored location in any graded section, in tree order.
    pub all_scored: Vec<Location>,
}

/// A course: the root node plus textbook and grading state derived from
/// it.
///
/// Both the textbook tables of contents and the grading context are
/// memoized per object; callers needing freshness reconstruct the
/// `Course`.
#[derive(Debug)]
pub struct Course {
    node: Node,
    textbooks: Vec<Textbook>,
    grading_context: OnceCell<GradingContext>,
}

impl Course {
    /// Loads the course rooted at `course_key` from the store.
    ///
    /// Textbook entries are read from the root node's `textbooks`
    /// metadata; malformed entries are skipped with a warning rather than
    /// failing the load.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the course root does not exist.
    pub fn load(store: &ModuleStore, course_key: &CourseKey) -> Result<Self, StoreError> {
        let node = store.get_course(course_key)?;
        let textbooks = textbooks_from_metadata(node.metadata().get("textbooks"));

        Ok(Self {
            node,
            textbooks,
            grading_context: OnceCell::new(),
        })
    }

    /// The root node.
    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    /// The course key.
    #[must_use]
    pub const fn course_key(&self) -> &CourseKey {
        self.node.location().course_key()
    }

    /// The course's textbooks, in declaration order.
    #[must_use]
    pub fn textbooks(&self) -> &[Textbook] {
        &self.textbooks
    }

    /// The grading context, computed over the descendant tree on first
    /// access and cached for this object's lifetime.
    pub fn grading_context(&self, store: &ModuleStore) -> &GradingContext {
        self.grading_context
            .get_or_init(|| compute_grading_context(store, &self.node))
    }
}

fn textbooks_from_metadata(value: Option<&Value>) -> Vec<Textbook> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let title = entry.get("title").and_then(Value::as_str);
            let book_url = entry.get("book_url").and_then(Value::as_str);
            match (title, book_url) {
                (Some(title), Some(book_url)) => {
                    Some(Textbook::new(title.to_string(), book_url.to_string()))
                }
                _ => {
                    warn!("skipping malformed textbook entry: {entry}");
                    None
                }
            }
        })
        .collect()
}

/// Walks chapters and their sections, collecting the graded sections and
/// every scored descendant beneath them.
fn compute_grading_context(store: &ModuleStore, root: &Node) -> GradingContext {
    let mut context = GradingContext::default();

    for chapter_location in root.children() {
        let Ok(chapter) = store.get_item(chapter_location, 0) else {
            debug!("skipping dangling chapter reference {chapter_location}");
            continue;
        };

        for section_location in chapter.children() {
            let Ok(section) = store.get_item(section_location, 0) else {
                debug!("skipping dangling section reference {section_location}");
                continue;
            };

            if !is_graded(store, &section) {
                continue;
            }

            let mut scored_descendants = Vec::new();
            collect_scored(store, &section, &mut scored_descendants);

            let format = section
                .metadata()
                .get("format")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            context.all_scored.extend(scored_descendants.iter().cloned());
            context
                .graded_sections
                .entry(format)
                .or_default()
                .push(GradedSection {
                    section: section.location().clone(),
                    scored_descendants,
                });
        }
    }

    context
}

fn is_graded(store: &ModuleStore, section: &Node) -> bool {
    let own = section.metadata().get("graded").and_then(Value::as_bool);
    own.unwrap_or_else(|| {
        store
            .inherited_metadata(section.location())
            .ok()
            .and_then(|inherited| inherited.get("graded").and_then(Value::as_bool))
            .unwrap_or(false)
    })
}

fn collect_scored(store: &ModuleStore, node: &Node, scored: &mut Vec<Location>) {
    for child_location in node.children() {
        let Ok(child) = store.get_item(child_location, 0) else {
            debug!("skipping dangling reference {child_location}");
            continue;
        };
        if child.category().has_score() {
            scored.push(child.location().clone());
        }
        collect_scored(store, &child, scored);
    }
}

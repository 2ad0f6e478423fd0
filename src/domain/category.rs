//! Node categories and their capabilities.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The category of a content node.
///
/// The store treats categories as opaque beyond the capability methods
/// below; rendering behaviour is a consumer concern. Unknown categories
/// are preserved verbatim in [`Category::Other`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// The course root.
    Course,
    /// A top-level section of a course.
    Chapter,
    /// An ordered sequence of units within a chapter.
    Sequential,
    /// A unit holding leaf content.
    Vertical,
    /// A scored exercise.
    Problem,
    /// Raw HTML content.
    Html,
    /// A video block.
    Video,
    /// Course "about" page content.
    About,
    /// A static informational tab.
    StaticTab,
    /// A binary asset (handled by the content store, not versioned).
    Asset,
    /// Any category this crate has no special knowledge of.
    Other(String),
}

impl Category {
    /// Whether nodes of this category are written to a draft revision by
    /// default.
    ///
    /// Direct-only categories (the course root, about pages, static tabs)
    /// and assets are written straight to the published revision.
    #[must_use]
    pub const fn supports_drafts(&self) -> bool {
        !matches!(
            self,
            Self::Course | Self::About | Self::StaticTab | Self::Asset
        )
    }

    /// Whether this category participates in draft/publish versioning at
    /// all.
    ///
    /// Assets do not: asking for the publish state of an asset is a
    /// contract violation.
    #[must_use]
    pub const fn is_versioned(&self) -> bool {
        !matches!(self, Self::Asset)
    }

    /// Whether nodes of this category may have children.
    #[must_use]
    pub const fn accepts_children(&self) -> bool {
        matches!(
            self,
            Self::Course | Self::Chapter | Self::Sequential | Self::Vertical
        )
    }

    /// Whether nodes of this category produce a score.
    ///
    /// Used by the grading context to select the descendants that can
    /// affect a grade.
    #[must_use]
    pub const fn has_score(&self) -> bool {
        matches!(self, Self::Problem)
    }

    /// The canonical string form of this category.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Course => "course",
            Self::Chapter => "chapter",
            Self::Sequential => "sequential",
            Self::Vertical => "vertical",
            Self::Problem => "problem",
            Self::Html => "html",
            Self::Video => "video",
            Self::About => "about",
            Self::StaticTab => "static_tab",
            Self::Asset => "asset",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.as_str() {
            "course" => Self::Course,
            "chapter" => Self::Chapter,
            "sequential" => Self::Sequential,
            "vertical" => Self::Vertical,
            "problem" => Self::Problem,
            "html" => Self::Html,
            "video" => Self::Video,
            "about" => Self::About,
            "static_tab" => Self::StaticTab,
            "asset" => Self::Asset,
            _ => Self::Other(value),
        }
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

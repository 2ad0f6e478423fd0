//! Canonical addressing for course content.
//!
//! A [`Location`] identifies one logical node (or asset) in a course. The
//! draft and published incarnations of the same node share every field
//! except [`Revision`], so stores key their records by the published form
//! of the location and track revisions internally.

use std::{fmt, ops::Deref, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

use crate::domain::Category;

/// A validated identifier segment: non-empty, `[A-Za-z0-9_.-]+`.
///
/// Used for organisation, course, run and node names so that locations can
/// be round-tripped through their `org/course/run/category/name` display
/// form without ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyString(NonEmptyString);

impl KeyString {
    /// Creates a new `KeyString` from a string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidKeyError`] if the string is empty or contains
    /// characters outside `[A-Za-z0-9_.-]`.
    pub fn new(s: String) -> Result<Self, InvalidKeyError> {
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(InvalidKeyError(s));
        }

        let non_empty = NonEmptyString::new(s).map_err(InvalidKeyError)?;
        Ok(Self(non_empty))
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for KeyString {
    type Error = InvalidKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for KeyString {
    type Error = InvalidKeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl From<KeyString> for String {
    fn from(value: KeyString) -> Self {
        value.0.into()
    }
}

impl AsRef<str> for KeyString {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Deref for KeyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl fmt::Display for KeyString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeyString {
    type Err = InvalidKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Error returned when a string is not a valid key segment.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid key segment '{0}': must be non-empty and contain only [A-Za-z0-9_.-]")]
pub struct InvalidKeyError(String);

/// Identifies one course: `organisation/course/run`.
///
/// Example: `MITx/999/Robot_Super_Course`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CourseKey {
    org: KeyString,
    course: KeyString,
    run: KeyString,
}

impl CourseKey {
    /// Creates a course key from pre-validated segments.
    #[must_use]
    pub const fn new(org: KeyString, course: KeyString, run: KeyString) -> Self {
        Self { org, course, run }
    }

    /// The organisation segment.
    #[must_use]
    pub fn org(&self) -> &str {
        self.org.as_str()
    }

    /// The course number segment.
    #[must_use]
    pub fn course(&self) -> &str {
        self.course.as_str()
    }

    /// The run segment.
    #[must_use]
    pub fn run(&self) -> &str {
        self.run.as_str()
    }

    /// Builds the location of a node in this course.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidKeyError`] if `name` is not a valid key segment.
    pub fn make_usage_key(
        &self,
        category: Category,
        name: &str,
    ) -> Result<Location, InvalidKeyError> {
        Ok(Location::new(
            self.clone(),
            category,
            KeyString::new(name.to_string())?,
        ))
    }

    /// The location of this course's root node.
    ///
    /// By convention the root node's name is the run identifier.
    #[must_use]
    pub fn root_location(&self) -> Location {
        Location::new(self.clone(), Category::Course, self.run.clone())
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org, self.course, self.run)
    }
}

impl FromStr for CourseKey {
    type Err = InvalidKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(org), Some(course), Some(run), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidKeyError(s.to_string()));
        };
        Ok(Self {
            org: org.parse()?,
            course: course.parse()?,
            run: run.parse()?,
        })
    }
}

/// Which incarnation of a node a location addresses.
///
/// `Published` is the default; a location whose revision is `Draft` and one
/// whose revision is `Published` denote the draft and published copies of
/// the same logical node.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Revision {
    /// The revision visible to end consumers.
    #[default]
    Published,
    /// The editable, not-yet-published revision.
    Draft,
}

/// Canonical identifier for a content node or asset.
///
/// Equality, hashing and ordering use the full tuple, including the
/// revision. Locations are immutable; the `with_*`/`into_*` helpers return
/// modified copies.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Location {
    course_key: CourseKey,
    category: Category,
    name: KeyString,
    #[serde(default, skip_serializing_if = "is_published")]
    revision: Revision,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_published(revision: &Revision) -> bool {
    *revision == Revision::Published
}

impl Location {
    /// Creates a published-revision location.
    #[must_use]
    pub const fn new(course_key: CourseKey, category: Category, name: KeyString) -> Self {
        Self {
            course_key,
            category,
            name,
            revision: Revision::Published,
        }
    }

    /// The course this location belongs to.
    #[must_use]
    pub const fn course_key(&self) -> &CourseKey {
        &self.course_key
    }

    /// The node category.
    #[must_use]
    pub const fn category(&self) -> &Category {
        &self.category
    }

    /// The node name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The addressed revision.
    #[must_use]
    pub const fn revision(&self) -> Revision {
        self.revision
    }

    /// Whether this location addresses the draft incarnation.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.revision == Revision::Draft
    }

    /// This location, addressing the draft incarnation.
    #[must_use]
    pub fn into_draft(mut self) -> Self {
        self.revision = Revision::Draft;
        self
    }

    /// This location, addressing the published incarnation.
    #[must_use]
    pub fn into_published(mut self) -> Self {
        self.revision = Revision::Published;
        self
    }

    /// A copy of this location with a different name.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidKeyError`] if `name` is not a valid key segment.
    pub fn with_name(&self, name: &str) -> Result<Self, InvalidKeyError> {
        Ok(Self {
            name: KeyString::new(name.to_string())?,
            ..self.clone()
        })
    }

    /// Rewrites the course-identifying fields to the target course.
    ///
    /// This is a pure rewrite: category, name and revision are preserved.
    /// Callers that copy whole courses must additionally rename the course
    /// root node to the target run (see
    /// [`CourseKey::root_location`]); that special case is deliberately not
    /// applied here.
    #[must_use]
    pub fn map_into_course(&self, target: &CourseKey) -> Self {
        Self {
            course_key: target.clone(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.course_key, self.category, self.name)?;
        if self.revision == Revision::Draft {
            write!(f, "@draft")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course_key() -> CourseKey {
        "MITx/999/Robot_Super_Course".parse().unwrap()
    }

    #[test]
    fn course_key_round_trips_through_display() {
        let key = course_key();
        assert_eq!(key.org(), "MITx");
        assert_eq!(key.course(), "999");
        assert_eq!(key.run(), "Robot_Super_Course");
        assert_eq!(key.to_string().parse::<CourseKey>().unwrap(), key);
    }

    #[test]
    fn rejects_malformed_course_keys() {
        assert!("MITx/999".parse::<CourseKey>().is_err());
        assert!("MITx/999/run/extra".parse::<CourseKey>().is_err());
        assert!("MITx//run".parse::<CourseKey>().is_err());
        assert!("MITx/9 9/run".parse::<CourseKey>().is_err());
    }

    #[test]
    fn draft_and_published_locations_differ_only_in_revision() {
        let published = course_key()
            .make_usage_key(Category::Vertical, "vertical_test")
            .unwrap();
        let draft = published.clone().into_draft();

        assert_ne!(published, draft);
        assert_eq!(draft.clone().into_published(), published);
        assert_eq!(published.name(), draft.name());
        assert_eq!(published.course_key(), draft.course_key());
    }

    #[test]
    fn map_into_course_preserves_everything_but_the_course() {
        let target: CourseKey = "edX/toy/2012_Fall".parse().unwrap();
        let location = course_key()
            .make_usage_key(Category::Problem, "p1")
            .unwrap()
            .into_draft();

        let mapped = location.map_into_course(&target);

        assert_eq!(mapped.course_key(), &target);
        assert_eq!(mapped.category(), location.category());
        assert_eq!(mapped.name(), location.name());
        assert_eq!(mapped.revision(), location.revision());
    }

    #[test]
    fn root_location_uses_run_as_name() {
        let root = course_key().root_location();
        assert_eq!(root.category(), &Category::Course);
        assert_eq!(root.name(), "Robot_Super_Course");
    }

    #[test]
    fn with_name_validates_the_segment() {
        let location = course_key()
            .make_usage_key(Category::Vertical, "vertical_test")
            .unwrap();
        assert_eq!(location.with_name("no_references").unwrap().name(), "no_references");
        assert!(location.with_name("").is_err());
        assert!(location.with_name("has space").is_err());
    }
}

//! The asset store: course files (images, PDFs, captions) addressed by
//! asset locations.
//!
//! Assets live outside the draft/publish lifecycle. Each asset carries an
//! attribute map alongside its bytes; attributes stay mutable after
//! creation (the `locked` flag in particular), and assets are never
//! deleted implicitly by node operations.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Category, CourseKey, InvalidKeyError, Location, Metadata};

/// Attribute key for the download-protection flag.
pub const LOCKED_ASSET_KEY: &str = "locked";

/// Errors returned by the asset store.
#[derive(Debug, Error)]
pub enum ContentError {
    /// No asset exists at the given location.
    #[error("asset {0} not found")]
    NotFound(Location),
    /// The location does not address an asset.
    #[error("location {0} is not an asset location")]
    NotAnAsset(Location),
}

/// An asset to be saved: its location, MIME type and raw bytes.
#[derive(Debug, Clone)]
pub struct Asset {
    location: Location,
    content_type: String,
    data: Vec<u8>,
    thumbnail_location: Option<Location>,
}

impl Asset {
    /// Creates an asset.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotAnAsset`] if the location's category is
    /// not [`Category::Asset`].
    pub fn new(
        location: Location,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self, ContentError> {
        if location.category() != &Category::Asset {
            return Err(ContentError::NotAnAsset(location));
        }
        Ok(Self {
            location,
            content_type: content_type.into(),
            data,
            thumbnail_location: None,
        })
    }

    /// Attaches a thumbnail reference.
    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail_location: Location) -> Self {
        self.thumbnail_location = Some(thumbnail_location);
        self
    }

    /// The asset's location.
    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// The raw bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A stored asset: its attribute map and bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    attributes: Metadata,
    data: Vec<u8>,
}

impl AssetRecord {
    /// The attribute map.
    #[must_use]
    pub const fn attributes(&self) -> &Metadata {
        &self.attributes
    }

    /// The raw bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the asset is protected from anonymous download.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.attributes
            .get(LOCKED_ASSET_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The asset's declared MIME type.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.attributes.get("contentType").and_then(Value::as_str)
    }
}

/// The store of course assets, keyed by asset location.
#[derive(Debug, Default)]
pub struct ContentStore {
    assets: RwLock<BTreeMap<Location, AssetRecord>>,
}

impl ContentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The location an asset with the given name has within a course.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidKeyError`] if `name` is not a valid key segment.
    pub fn compute_location(
        course_key: &CourseKey,
        name: &str,
    ) -> Result<Location, InvalidKeyError> {
        course_key.make_usage_key(Category::Asset, name)
    }

    /// Saves an asset, building its attribute map. An existing asset at
    /// the same location is replaced, attributes included.
    pub fn save(&self, asset: &Asset) -> Metadata {
        let location = &asset.location;
        let course_key = location.course_key();
        let digest = Sha256::digest(&asset.data);

        let mut attributes = Metadata::new();
        attributes.insert("_id".to_string(), json!({ "name": location.name() }));
        attributes.insert("filename".to_string(), json!(location.name()));
        attributes.insert("contentType".to_string(), json!(asset.content_type));
        attributes.insert("uploadDate".to_string(), json!(Utc::now().to_rfc3339()));
        attributes.insert(
            "content_son".to_string(),
            json!({
                "org": course_key.org(),
                "course": course_key.course(),
                "name": location.name(),
            }),
        );
        attributes.insert("content_digest".to_string(), json!(format!("{digest:x}")));
        attributes.insert("uuid".to_string(), json!(Uuid::new_v4().to_string()));
        attributes.insert(LOCKED_ASSET_KEY.to_string(), json!(false));
        attributes.insert(
            "thumbnail_location".to_string(),
            asset
                .thumbnail_location
                .as_ref()
                .map_or(Value::Null, |thumbnail| json!(thumbnail.to_string())),
        );

        debug!(%location, size = asset.data.len(), "saved asset");
        let record = AssetRecord {
            attributes: attributes.clone(),
            data: asset.data.clone(),
        };
        self.assets.write().insert(location.clone(), record);
        attributes
    }

    /// Retrieves an asset.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if no asset exists at the
    /// location.
    pub fn find(&self, location: &Location) -> Result<AssetRecord, ContentError> {
        self.assets
            .read()
            .get(location)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(location.clone()))
    }

    /// Whether an asset exists at the location.
    #[must_use]
    pub fn has(&self, location: &Location) -> bool {
        self.assets.read().contains_key(location)
    }

    /// Sets one attribute on an existing asset.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if no asset exists at the
    /// location.
    pub fn set_attr(
        &self,
        location: &Location,
        key: &str,
        value: Value,
    ) -> Result<(), ContentError> {
        let mut assets = self.assets.write();
        let record = assets
            .get_mut(location)
            .ok_or_else(|| ContentError::NotFound(location.clone()))?;
        record.attributes.insert(key.to_string(), value);
        Ok(())
    }

    /// Retrieves an asset's attribute map.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if no asset exists at the
    /// location.
    pub fn get_attrs(&self, location: &Location) -> Result<Metadata, ContentError> {
        Ok(self.find(location)?.attributes)
    }

    /// Removes every asset of a course, returning how many were removed.
    ///
    /// Node operations never remove assets; callers replacing a whole
    /// course call this explicitly before re-copying.
    pub fn delete_all_content_for_course(&self, course_key: &CourseKey) -> usize {
        let mut assets = self.assets.write();
        let before = assets.len();
        assets.retain(|location, _| location.course_key() != course_key);
        let removed = before - assets.len();
        debug!(%course_key, removed, "purged course assets");
        removed
    }

    /// Returns every asset of a course (location plus attribute map) and
    /// the total count.
    #[must_use]
    pub fn get_all_content_for_course(
        &self,
        course_key: &CourseKey,
    ) -> (Vec<(Location, Metadata)>, usize) {
        let assets = self.assets.read();
        let records: Vec<_> = assets
            .iter()
            .filter(|(location, _)| location.course_key() == course_key)
            .map(|(location, record)| (location.clone(), record.attributes.clone()))
            .collect();
        let count = records.len();
        (records, count)
    }
}

/// The URL prefix under which a course's assets are served.
///
/// References carrying this prefix are course-specific and must be
/// rewritten when content is copied between courses; `/static/` references
/// are portable and are left alone.
#[must_use]
pub fn asset_url_prefix(course_key: &CourseKey) -> String {
    format!("/c4x/{}/{}/asset/", course_key.org(), course_key.course())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course_key() -> CourseKey {
        "MITx/999/Robot_Super_Course".parse().unwrap()
    }

    fn picture(name: &str) -> Asset {
        let location = ContentStore::compute_location(&course_key(), name).unwrap();
        Asset::new(location, "image/jpeg", vec![0xff, 0xd8, 0xff]).unwrap()
    }

    #[test]
    fn save_and_find_round_trip() {
        let store = ContentStore::new();
        let asset = picture("picture1.jpg");
        store.save(&asset);

        let record = store.find(asset.location()).unwrap();
        assert_eq!(record.data(), asset.data());
        assert_eq!(record.content_type(), Some("image/jpeg"));
        assert!(!record.locked());
        assert_eq!(
            record.attributes().get("_id"),
            Some(&json!({ "name": "picture1.jpg" }))
        );
        assert_eq!(
            record.attributes().get("filename"),
            Some(&json!("picture1.jpg"))
        );
    }

    #[test]
    fn find_missing_asset_fails() {
        let store = ContentStore::new();
        let location = ContentStore::compute_location(&course_key(), "missing.png").unwrap();
        assert!(matches!(
            store.find(&location),
            Err(ContentError::NotFound(_))
        ));
    }

    #[test]
    fn non_asset_locations_are_rejected() {
        let location = course_key()
            .make_usage_key(Category::Vertical, "v1")
            .unwrap();
        assert!(matches!(
            Asset::new(location, "text/html", Vec::new()),
            Err(ContentError::NotAnAsset(_))
        ));
    }

    #[test]
    fn locking_is_a_mutable_attribute() {
        let store = ContentStore::new();
        let asset = picture("picture1.jpg");
        store.save(&asset);

        store
            .set_attr(asset.location(), LOCKED_ASSET_KEY, json!(true))
            .unwrap();

        assert!(store.find(asset.location()).unwrap().locked());
    }

    #[test]
    fn course_listing_is_scoped_to_the_course() {
        let store = ContentStore::new();
        store.save(&picture("picture1.jpg"));
        store.save(&picture("picture2.jpg"));

        let other: CourseKey = "edX/toy/2012_Fall".parse().unwrap();
        let elsewhere = ContentStore::compute_location(&other, "other.jpg").unwrap();
        store.save(&Asset::new(elsewhere, "image/jpeg", vec![1]).unwrap());

        let (records, count) = store.get_all_content_for_course(&course_key());
        assert_eq!(count, 2);
        assert!(records
            .iter()
            .all(|(location, _)| location.course_key() == &course_key()));
    }

    #[test]
    fn course_purge_leaves_other_courses_alone() {
        let store = ContentStore::new();
        store.save(&picture("picture1.jpg"));
        store.save(&picture("picture2.jpg"));

        let other: CourseKey = "edX/toy/2012_Fall".parse().unwrap();
        let elsewhere = ContentStore::compute_location(&other, "other.jpg").unwrap();
        store.save(&Asset::new(elsewhere.clone(), "image/jpeg", vec![1]).unwrap());

        assert_eq!(store.delete_all_content_for_course(&course_key()), 2);
        let (_, count) = store.get_all_content_for_course(&course_key());
        assert_eq!(count, 0);
        assert!(store.has(&elsewhere));
    }

    #[test]
    fn thumbnail_reference_is_recorded() {
        let store = ContentStore::new();
        let thumbnail = ContentStore::compute_location(&course_key(), "thumb.jpg").unwrap();
        let asset = picture("picture1.jpg").with_thumbnail(thumbnail.clone());
        store.save(&asset);

        let attrs = store.get_attrs(asset.location()).unwrap();
        assert_eq!(
            attrs.get("thumbnail_location"),
            Some(&json!(thumbnail.to_string()))
        );
    }

    #[test]
    fn c4x_prefix_identifies_the_course() {
        assert_eq!(
            asset_url_prefix(&course_key()),
            "/c4x/MITx/999/asset/"
        );
    }
}

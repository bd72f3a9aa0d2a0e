//! Core data models used throughout facesort.
//!
//! These types describe persons, faces and images as the store returns them,
//! plus the transition records produced by reassignment. Most of them are
//! serialized directly into HTTP response bodies, so field names follow the
//! wire format.

use serde::{Deserialize, Serialize};

/// Bounding box of a detected face in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
}

impl FaceLocation {
    /// A box is well-formed when its edges are not inverted.
    pub fn is_valid(&self) -> bool {
        self.top <= self.bottom && self.left <= self.right
    }
}

/// A person's identity at the moment an operation observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRef {
    pub id: String,
    pub name: String,
}

/// One row of the person list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub person_id: String,
    pub person_name: String,
    pub total_faces: i64,
    pub total_images: i64,
    /// Cropped-face filename of the person's first face, if any was imported.
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonFace {
    pub face_id: String,
    pub image_id: String,
    pub cropped_face_filename: Option<String>,
    pub face_location: FaceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub image_id: String,
    pub filename: String,
    pub mime_type: String,
}

/// Full person view: every owned face and the distinct images they come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDetail {
    pub person_id: String,
    pub person_name: String,
    pub total_faces: i64,
    pub total_images: i64,
    pub faces: Vec<PersonFace>,
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonLink {
    pub person_id: String,
    pub person_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFace {
    pub face_id: String,
    pub cropped_face_filename: Option<String>,
    pub face_location: FaceLocation,
    pub person: PersonLink,
}

/// Full image view: the image and each detected face with its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetail {
    pub image_id: String,
    pub filename: String,
    pub mime_type: String,
    pub total_faces: i64,
    pub faces: Vec<ImageFace>,
}

/// One row of the image list: the image with its face and owner counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub image_id: String,
    pub filename: String,
    pub mime_type: String,
    /// Unix seconds.
    pub uploaded_at: i64,
    pub faces_count: i64,
    pub persons_count: i64,
    /// Distinct owners of the image's faces, in face order.
    pub persons: Vec<PersonLink>,
    pub has_faces: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryFace {
    pub face_id: String,
    pub image_id: String,
    pub filename: String,
    pub cropped_face_filename: Option<String>,
    pub face_location: FaceLocation,
}

/// A person with every face it owns, as shown on the gallery page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryPerson {
    pub person_id: String,
    pub person_name: String,
    pub total_faces: i64,
    pub faces: Vec<GalleryFace>,
}

/// Name requested for a person created by a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewPersonName {
    Custom(String),
    /// The store picks a unique placeholder inside the creating transaction.
    Placeholder,
}

/// Outcome of reassigning one face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceMove {
    pub face_id: String,
    pub from: PersonRef,
    pub to: PersonRef,
    /// The former owner, when the move left it without faces.
    pub deleted_empty_person: Option<PersonRef>,
}

impl FaceMove {
    pub fn is_noop(&self) -> bool {
        self.from.id == self.to.id
    }
}

/// Outcome of deleting one face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceRemoval {
    pub face_id: String,
    pub from: PersonRef,
    pub deleted_empty_person: Option<PersonRef>,
}

/// Outcome of deleting an image with all of its faces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRemoval {
    pub image_id: String,
    pub deleted_faces_count: i64,
    pub deleted_persons: Vec<PersonRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub person_id: String,
    pub old_name: String,
    pub new_name: String,
}

/// Raw store counters. Derived ratios live on [`GalleryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub total_persons: i64,
    pub total_images: i64,
    pub total_faces: i64,
    pub images_with_faces: i64,
    pub manual_face_assignments: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GalleryStats {
    /// Percentage of images with at least one face.
    pub face_coverage: f64,
    pub avg_faces_per_image: f64,
    pub avg_faces_per_person: f64,
}

// ============ Import batch ============

/// Output of the external clustering engine, loaded by `facesort import`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportBatch {
    #[serde(default)]
    pub images: Vec<ImportImage>,
    /// Display names for cluster labels. Unnamed clusters get a placeholder.
    #[serde(default)]
    pub clusters: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportImage {
    #[serde(default)]
    pub image_id: Option<String>,
    pub filename: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default)]
    pub faces: Vec<ImportFace>,
}

fn default_mime_type() -> String {
    "image/jpeg".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportFace {
    #[serde(default)]
    pub face_id: Option<String>,
    /// Cluster label; faces sharing a label in one batch become one person.
    #[serde(default)]
    pub cluster: Option<String>,
    pub location: FaceLocation,
    #[serde(default)]
    pub cropped_face_filename: Option<String>,
}

/// Counts of what one import batch created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub images: usize,
    pub faces: usize,
    pub persons: usize,
}

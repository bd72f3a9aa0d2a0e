//! HTTP wire types shared by the server and the client.
//!
//! Every response body carries a `status` discriminator. Success bodies
//! flatten the operation's fields next to `status` and `message`; error
//! bodies are [`ErrorResponse`]:
//!
//! ```json
//! { "status": "error", "message": "face not found: f9", "code": "not_found" }
//! ```
//!
//! Optional fields such as `deleted_empty_person` are omitted when absent.

use serde::{Deserialize, Serialize};

use crate::models::{
    FaceMove, FaceRemoval, GalleryPerson, ImageDetail, ImageRemoval, ImageSummary, PersonDetail,
    PersonSummary, Renamed,
};
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

// ============ Requests ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveFaceRequest {
    pub target_person_id: String,
    /// Owner the caller believes the face has; a mismatch is a conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_person_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveToNewRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_person_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

// ============ Responses ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveFaceResponse {
    pub status: Status,
    pub message: String,
    pub face_id: String,
    pub from_person: String,
    pub to_person: String,
    pub target_person_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_empty_person: Option<String>,
}

impl From<FaceMove> for MoveFaceResponse {
    fn from(moved: FaceMove) -> Self {
        let message = if moved.is_noop() {
            format!("Face already belongs to {}", moved.to.name)
        } else {
            format!("Face moved from {} to {}", moved.from.name, moved.to.name)
        };
        Self {
            status: Status::Success,
            message,
            face_id: moved.face_id,
            from_person: moved.from.name,
            to_person: moved.to.name,
            target_person_id: moved.to.id,
            deleted_empty_person: moved.deleted_empty_person.map(|p| p.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveToNewResponse {
    pub status: Status,
    pub message: String,
    pub face_id: String,
    pub from_person: String,
    pub new_person_id: String,
    pub new_person_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_empty_person: Option<String>,
}

impl From<FaceMove> for MoveToNewResponse {
    fn from(moved: FaceMove) -> Self {
        Self {
            status: Status::Success,
            message: format!(
                "Face moved from {} to new person {}",
                moved.from.name, moved.to.name
            ),
            face_id: moved.face_id,
            from_person: moved.from.name,
            new_person_id: moved.to.id,
            new_person_name: moved.to.name,
            deleted_empty_person: moved.deleted_empty_person.map(|p| p.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFaceResponse {
    pub status: Status,
    pub message: String,
    pub face_id: String,
    pub from_person: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_empty_person: Option<String>,
}

impl From<FaceRemoval> for DeleteFaceResponse {
    fn from(removed: FaceRemoval) -> Self {
        Self {
            status: Status::Success,
            message: format!("Face deleted from {}", removed.from.name),
            face_id: removed.face_id,
            from_person: removed.from.name,
            deleted_empty_person: removed.deleted_empty_person.map(|p| p.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteImageResponse {
    pub status: Status,
    pub message: String,
    pub image_id: String,
    pub deleted_faces_count: i64,
    pub deleted_persons: Vec<String>,
}

impl From<ImageRemoval> for DeleteImageResponse {
    fn from(removed: ImageRemoval) -> Self {
        Self {
            status: Status::Success,
            message: format!(
                "Image deleted with {} face(s)",
                removed.deleted_faces_count
            ),
            image_id: removed.image_id,
            deleted_faces_count: removed.deleted_faces_count,
            deleted_persons: removed.deleted_persons.into_iter().map(|p| p.name).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonListResponse {
    pub status: Status,
    pub message: String,
    pub persons: Vec<PersonSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonDetailResponse {
    pub status: Status,
    #[serde(flatten)]
    pub person: PersonDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDetailResponse {
    pub status: Status,
    #[serde(flatten)]
    pub image: ImageDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageListResponse {
    pub status: Status,
    pub message: String,
    pub images: Vec<ImageSummary>,
    pub total_images: usize,
    pub images_with_faces: usize,
    pub images_without_faces: usize,
}

impl From<Vec<ImageSummary>> for ImageListResponse {
    fn from(images: Vec<ImageSummary>) -> Self {
        let images_with_faces = images.iter().filter(|i| i.has_faces).count();
        Self {
            status: Status::Success,
            message: format!("Found {} images", images.len()),
            total_images: images.len(),
            images_with_faces,
            images_without_faces: images.len() - images_with_faces,
            images,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryResponse {
    pub status: Status,
    pub message: String,
    pub gallery: Vec<GalleryPerson>,
    pub total_persons: usize,
}

impl From<Vec<GalleryPerson>> for GalleryResponse {
    fn from(gallery: Vec<GalleryPerson>) -> Self {
        Self {
            status: Status::Success,
            message: format!("Gallery with {} persons", gallery.len()),
            total_persons: gallery.len(),
            gallery,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameResponse {
    pub status: Status,
    pub message: String,
    pub person_id: String,
    pub old_name: String,
    pub new_name: String,
}

impl From<Renamed> for RenameResponse {
    fn from(renamed: Renamed) -> Self {
        Self {
            status: Status::Success,
            message: format!("Renamed {} to {}", renamed.old_name, renamed.new_name),
            person_id: renamed.person_id,
            old_name: renamed.old_name,
            new_name: renamed.new_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub status: Status,
    pub message: String,
    pub data: Stats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub status: Status,
    pub message: String,
}

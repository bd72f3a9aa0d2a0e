//! Face reassignment service.
//!
//! [`Reassigner`] is the single entry point for operations that change face
//! ownership. It normalizes inputs, delegates the atomic work to a
//! [`FaceStore`], and logs every outcome, including the persons that ceased
//! to exist because they lost their last face.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`move_to_existing`](Reassigner::move_to_existing) | Face joins an existing person |
//! | [`move_to_new`](Reassigner::move_to_new) | Face becomes the first face of a new person |
//! | [`delete_face`](Reassigner::delete_face) | Face is removed |
//! | [`delete_image`](Reassigner::delete_image) | Image and its faces are removed |
//! | [`rename_person`](Reassigner::rename_person) | Display name changes, membership does not |
//!
//! In every case a person left without faces is deleted in the same store
//! transaction and reported back to the caller.

use std::sync::Arc;

use tracing::info;

use crate::error::{Result, StoreError};
use crate::models::{FaceMove, FaceRemoval, ImageRemoval, Renamed};
use crate::naming::normalize_custom_name;
use crate::store::FaceStore;

#[derive(Clone)]
pub struct Reassigner {
    store: Arc<dyn FaceStore>,
}

fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(StoreError::Validation(format!("{} must not be empty", kind)));
    }
    Ok(())
}

impl Reassigner {
    pub fn new(store: Arc<dyn FaceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn FaceStore> {
        &self.store
    }

    /// Move `face_id` under `target_person_id`.
    ///
    /// Moving a face to its current owner succeeds and reports the same
    /// person on both sides.
    pub async fn move_to_existing(
        &self,
        face_id: &str,
        target_person_id: &str,
        expected_owner: Option<&str>,
    ) -> Result<FaceMove> {
        require_id("face_id", face_id)?;
        require_id("target_person_id", target_person_id)?;

        let moved = self
            .store
            .move_face(face_id, target_person_id, expected_owner)
            .await?;

        if moved.is_noop() {
            info!(face_id, person_id = %moved.to.id, "face already owned by target");
        } else {
            info!(
                face_id,
                from = %moved.from.id,
                to = %moved.to.id,
                deleted_empty_person = ?moved.deleted_empty_person.as_ref().map(|p| &p.id),
                "face moved"
            );
        }
        Ok(moved)
    }

    /// Move `face_id` under a newly created person.
    ///
    /// A `custom_name` that is empty after trimming is treated as absent and
    /// the store assigns a placeholder name.
    pub async fn move_to_new(
        &self,
        face_id: &str,
        custom_name: Option<&str>,
        expected_owner: Option<&str>,
    ) -> Result<FaceMove> {
        require_id("face_id", face_id)?;

        let name = normalize_custom_name(custom_name);
        let moved = self
            .store
            .move_face_to_new(face_id, name, expected_owner)
            .await?;

        info!(
            face_id,
            from = %moved.from.id,
            new_person_id = %moved.to.id,
            new_person_name = %moved.to.name,
            deleted_empty_person = ?moved.deleted_empty_person.as_ref().map(|p| &p.id),
            "face moved to new person"
        );
        Ok(moved)
    }

    pub async fn delete_face(&self, face_id: &str) -> Result<FaceRemoval> {
        require_id("face_id", face_id)?;

        let removed = self.store.delete_face(face_id).await?;
        info!(
            face_id,
            from = %removed.from.id,
            deleted_empty_person = ?removed.deleted_empty_person.as_ref().map(|p| &p.id),
            "face deleted"
        );
        Ok(removed)
    }

    pub async fn delete_image(&self, image_id: &str) -> Result<ImageRemoval> {
        require_id("image_id", image_id)?;

        let removed = self.store.delete_image(image_id).await?;
        info!(
            image_id,
            deleted_faces = removed.deleted_faces_count,
            deleted_persons = removed.deleted_persons.len(),
            "image deleted"
        );
        Ok(removed)
    }

    /// Rename a person. The name is trimmed and must not end up empty.
    pub async fn rename_person(&self, person_id: &str, name: &str) -> Result<Renamed> {
        require_id("person_id", person_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation(
                "person name must not be empty".to_string(),
            ));
        }

        let renamed = self.store.rename_person(person_id, name).await?;
        info!(
            person_id,
            old_name = %renamed.old_name,
            new_name = %renamed.new_name,
            "person renamed"
        );
        Ok(renamed)
    }
}

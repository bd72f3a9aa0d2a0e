//! Storage abstraction for persons, faces and images.
//!
//! The [`FaceStore`] trait defines every storage operation the reassignment
//! service and HTTP layer need, enabling pluggable backends: SQLite for the
//! server, in-memory for tests.
//!
//! # Invariants
//!
//! Every implementation must uphold these between any two calls:
//!
//! - every face has exactly one owning person;
//! - no person has zero faces. Any operation that removes a person's last
//!   face deletes that person in the same transaction and reports it;
//! - person ids are never reused.
//!
//! Mutations are serialized per store, so two concurrent moves of the same
//! face apply one after the other and the second observes the first.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    FaceMove, FaceRemoval, GalleryPerson, ImageDetail, ImageRemoval, ImageSummary, ImportBatch,
    ImportSummary, NewPersonName, PersonDetail, PersonSummary, Renamed, StoreCounts,
};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_persons`](FaceStore::list_persons) | Person list with face/image counts |
/// | [`get_person`](FaceStore::get_person) | One person with faces and images |
/// | [`list_images`](FaceStore::list_images) | Image list with face/owner counts |
/// | [`get_image`](FaceStore::get_image) | One image with faces and owners |
/// | [`gallery`](FaceStore::gallery) | Every person with all of its faces |
/// | [`rename_person`](FaceStore::rename_person) | Change a display name |
/// | [`move_face`](FaceStore::move_face) | Reassign a face to an existing person |
/// | [`move_face_to_new`](FaceStore::move_face_to_new) | Reassign a face to a fresh person |
/// | [`delete_face`](FaceStore::delete_face) | Remove one face |
/// | [`delete_image`](FaceStore::delete_image) | Remove an image and its faces |
/// | [`import_batch`](FaceStore::import_batch) | Load clustering output |
/// | [`counts`](FaceStore::counts) | Totals for the stats view |
/// | [`reset`](FaceStore::reset) | Remove everything |
#[async_trait]
pub trait FaceStore: Send + Sync {
    async fn list_persons(&self) -> Result<Vec<PersonSummary>>;

    async fn get_person(&self, person_id: &str) -> Result<Option<PersonDetail>>;

    /// Images in upload order, then by id.
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    async fn get_image(&self, image_id: &str) -> Result<Option<ImageDetail>>;

    /// Persons ordered like [`list_persons`](FaceStore::list_persons), each
    /// with its faces in creation order. Read as one consistent snapshot.
    async fn gallery(&self) -> Result<Vec<GalleryPerson>>;

    /// `new_name` is stored as given; callers trim and validate it.
    async fn rename_person(&self, person_id: &str, new_name: &str) -> Result<Renamed>;

    /// Reassign `face_id` to `target_person_id`.
    ///
    /// A move to the current owner succeeds without changing anything, even
    /// when `expected_owner` names someone else; that is how a retried move
    /// lands. Otherwise, when `expected_owner` is given and the face is owned
    /// by someone else, fails with `Conflict` and changes nothing.
    async fn move_face(
        &self,
        face_id: &str,
        target_person_id: &str,
        expected_owner: Option<&str>,
    ) -> Result<FaceMove>;

    /// Reassign `face_id` to a newly created person.
    async fn move_face_to_new(
        &self,
        face_id: &str,
        name: NewPersonName,
        expected_owner: Option<&str>,
    ) -> Result<FaceMove>;

    async fn delete_face(&self, face_id: &str) -> Result<FaceRemoval>;

    async fn delete_image(&self, image_id: &str) -> Result<ImageRemoval>;

    /// Insert a validated batch in one transaction.
    async fn import_batch(&self, batch: &ImportBatch) -> Result<ImportSummary>;

    async fn counts(&self) -> Result<StoreCounts>;

    async fn reset(&self) -> Result<()>;
}

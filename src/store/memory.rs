//! In-memory [`FaceStore`] implementation for tests.
//!
//! All state lives in one `HashMap`-backed table set behind a single
//! `std::sync::Mutex`, so every operation is trivially atomic and mutations
//! are serialized. No lock is held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::FaceStore;
use crate::error::{Entity, Result, StoreError};
use crate::import::{plan_import, PlannedPerson};
use crate::models::{
    FaceLocation, FaceMove, FaceRemoval, GalleryFace, GalleryPerson, ImageDetail, ImageFace,
    ImageRef, ImageRemoval, ImageSummary, ImportBatch, ImportSummary, NewPersonName, PersonDetail,
    PersonFace, PersonLink, PersonRef, PersonSummary, Renamed, StoreCounts,
};
use crate::naming::{pick_placeholder, DEFAULT_PLACEHOLDER_PREFIX};

struct PersonRow {
    id: String,
    name: String,
}

struct ImageRow {
    id: String,
    filename: String,
    mime_type: String,
    uploaded_at: i64,
}

struct FaceRow {
    id: String,
    image_id: String,
    person_id: String,
    location: FaceLocation,
    crop_filename: Option<String>,
    manually_assigned: bool,
    created_at: i64,
}

#[derive(Default)]
struct State {
    persons: HashMap<String, PersonRow>,
    images: HashMap<String, ImageRow>,
    faces: HashMap<String, FaceRow>,
}

impl State {
    /// Faces owned by `person_id`, in creation order.
    fn faces_of(&self, person_id: &str) -> Vec<&FaceRow> {
        let mut faces: Vec<&FaceRow> = self
            .faces
            .values()
            .filter(|f| f.person_id == person_id)
            .collect();
        faces.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        faces
    }

    fn faces_in(&self, image_id: &str) -> Vec<&FaceRow> {
        let mut faces: Vec<&FaceRow> = self
            .faces
            .values()
            .filter(|f| f.image_id == image_id)
            .collect();
        faces.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        faces
    }

    fn person_ref(&self, person_id: &str) -> Option<PersonRef> {
        self.persons.get(person_id).map(|p| PersonRef {
            id: p.id.clone(),
            name: p.name.clone(),
        })
    }

    fn owner_of(&self, face_id: &str) -> Result<PersonRef> {
        let face = self
            .faces
            .get(face_id)
            .ok_or_else(|| StoreError::not_found(Entity::Face, face_id))?;
        self.person_ref(&face.person_id).ok_or_else(|| {
            StoreError::Internal(format!(
                "face {} references missing person {}",
                face_id, face.person_id
            ))
        })
    }

    fn name_taken(&self, name: &str) -> bool {
        self.persons.values().any(|p| p.name == name)
    }

    /// Delete `person_id` if it no longer owns any face.
    fn remove_if_empty(&mut self, person_id: &str) -> Option<PersonRef> {
        if self.faces.values().any(|f| f.person_id == person_id) {
            return None;
        }
        self.persons.remove(person_id).map(|p| PersonRef {
            id: p.id,
            name: p.name,
        })
    }

    /// `Conflict` unless `expected` is absent or names the current owner.
    fn check_expected(
        &self,
        face_id: &str,
        owner: &PersonRef,
        expected: Option<&str>,
    ) -> Result<()> {
        match expected {
            Some(expected) if expected != owner.id => Err(StoreError::Conflict {
                face_id: face_id.to_string(),
                expected: self.person_ref(expected).unwrap_or_else(|| PersonRef {
                    id: expected.to_string(),
                    name: expected.to_string(),
                }),
                actual: owner.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn resolve_name(&self, prefix: &str, person_id: &str, name: &NewPersonName) -> String {
        match name {
            NewPersonName::Custom(name) => name.clone(),
            NewPersonName::Placeholder => {
                pick_placeholder(prefix, person_id, |candidate| self.name_taken(candidate))
            }
        }
    }
}


/// In-memory store for tests.
pub struct InMemoryStore {
    state: Mutex<State>,
    placeholder_prefix: String,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_placeholder_prefix(DEFAULT_PLACEHOLDER_PREFIX)
    }

    pub fn with_placeholder_prefix(prefix: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            placeholder_prefix: prefix.into(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Internal("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaceStore for InMemoryStore {
    async fn list_persons(&self) -> Result<Vec<PersonSummary>> {
        let state = self.lock()?;
        let mut persons: Vec<PersonSummary> = state
            .persons
            .values()
            .map(|p| {
                let faces = state.faces_of(&p.id);
                let images: HashSet<&str> = faces.iter().map(|f| f.image_id.as_str()).collect();
                PersonSummary {
                    person_id: p.id.clone(),
                    person_name: p.name.clone(),
                    total_faces: faces.len() as i64,
                    total_images: images.len() as i64,
                    thumbnail: faces.first().and_then(|f| f.crop_filename.clone()),
                }
            })
            .collect();
        persons.sort_by(|a, b| {
            b.total_faces
                .cmp(&a.total_faces)
                .then_with(|| a.person_name.cmp(&b.person_name))
                .then_with(|| a.person_id.cmp(&b.person_id))
        });
        Ok(persons)
    }

    async fn get_person(&self, person_id: &str) -> Result<Option<PersonDetail>> {
        let state = self.lock()?;
        let person = match state.persons.get(person_id) {
            Some(p) => p,
            None => return Ok(None),
        };
        let faces = state.faces_of(person_id);

        let mut seen = HashSet::new();
        let mut images = Vec::new();
        for face in &faces {
            if seen.insert(face.image_id.as_str()) {
                if let Some(image) = state.images.get(&face.image_id) {
                    images.push(ImageRef {
                        image_id: image.id.clone(),
                        filename: image.filename.clone(),
                        mime_type: image.mime_type.clone(),
                    });
                }
            }
        }

        Ok(Some(PersonDetail {
            person_id: person.id.clone(),
            person_name: person.name.clone(),
            total_faces: faces.len() as i64,
            total_images: images.len() as i64,
            faces: faces
                .iter()
                .map(|f| PersonFace {
                    face_id: f.id.clone(),
                    image_id: f.image_id.clone(),
                    cropped_face_filename: f.crop_filename.clone(),
                    face_location: f.location,
                })
                .collect(),
            images,
        }))
    }

    async fn get_image(&self, image_id: &str) -> Result<Option<ImageDetail>> {
        let state = self.lock()?;
        let image = match state.images.get(image_id) {
            Some(i) => i,
            None => return Ok(None),
        };
        let faces = state
            .faces_in(image_id)
            .into_iter()
            .map(|f| {
                let owner = state.person_ref(&f.person_id).ok_or_else(|| {
                    StoreError::Internal(format!("face {} has no owner", f.id))
                })?;
                Ok(ImageFace {
                    face_id: f.id.clone(),
                    cropped_face_filename: f.crop_filename.clone(),
                    face_location: f.location,
                    person: PersonLink {
                        person_id: owner.id,
                        person_name: owner.name,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ImageDetail {
            image_id: image.id.clone(),
            filename: image.filename.clone(),
            mime_type: image.mime_type.clone(),
            total_faces: faces.len() as i64,
            faces,
        }))
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let state = self.lock()?;
        let mut images: Vec<&ImageRow> = state.images.values().collect();
        images.sort_by(|a, b| (a.uploaded_at, &a.id).cmp(&(b.uploaded_at, &b.id)));

        images
            .into_iter()
            .map(|image| {
                let faces = state.faces_in(&image.id);
                let mut persons: Vec<PersonLink> = Vec::new();
                for face in &faces {
                    if persons.iter().any(|p| p.person_id == face.person_id) {
                        continue;
                    }
                    let owner = state.person_ref(&face.person_id).ok_or_else(|| {
                        StoreError::Internal(format!("face {} has no owner", face.id))
                    })?;
                    persons.push(PersonLink {
                        person_id: owner.id,
                        person_name: owner.name,
                    });
                }
                Ok(ImageSummary {
                    image_id: image.id.clone(),
                    filename: image.filename.clone(),
                    mime_type: image.mime_type.clone(),
                    uploaded_at: image.uploaded_at,
                    faces_count: faces.len() as i64,
                    persons_count: persons.len() as i64,
                    persons,
                    has_faces: !faces.is_empty(),
                })
            })
            .collect()
    }

    async fn gallery(&self) -> Result<Vec<GalleryPerson>> {
        let state = self.lock()?;
        let mut gallery = state
            .persons
            .values()
            .map(|p| {
                let faces = state
                    .faces_of(&p.id)
                    .into_iter()
                    .map(|f| {
                        let image = state.images.get(&f.image_id).ok_or_else(|| {
                            StoreError::Internal(format!("face {} has no image", f.id))
                        })?;
                        Ok(GalleryFace {
                            face_id: f.id.clone(),
                            image_id: image.id.clone(),
                            filename: image.filename.clone(),
                            cropped_face_filename: f.crop_filename.clone(),
                            face_location: f.location,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(GalleryPerson {
                    person_id: p.id.clone(),
                    person_name: p.name.clone(),
                    total_faces: faces.len() as i64,
                    faces,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        gallery.sort_by(|a, b| {
            b.total_faces
                .cmp(&a.total_faces)
                .then_with(|| a.person_name.cmp(&b.person_name))
                .then_with(|| a.person_id.cmp(&b.person_id))
        });
        Ok(gallery)
    }

    async fn rename_person(&self, person_id: &str, new_name: &str) -> Result<Renamed> {
        let mut state = self.lock()?;
        let person = state
            .persons
            .get_mut(person_id)
            .ok_or_else(|| StoreError::not_found(Entity::Person, person_id))?;
        let old_name = std::mem::replace(&mut person.name, new_name.to_string());
        Ok(Renamed {
            person_id: person_id.to_string(),
            old_name,
            new_name: new_name.to_string(),
        })
    }

    async fn move_face(
        &self,
        face_id: &str,
        target_person_id: &str,
        expected_owner: Option<&str>,
    ) -> Result<FaceMove> {
        let mut state = self.lock()?;
        let from = state.owner_of(face_id)?;
        let to = state
            .person_ref(target_person_id)
            .ok_or_else(|| StoreError::not_found(Entity::Person, target_person_id))?;

        // Already where the caller wants it, whoever they thought owned it.
        if from.id == to.id {
            return Ok(FaceMove {
                face_id: face_id.to_string(),
                from,
                to,
                deleted_empty_person: None,
            });
        }
        state.check_expected(face_id, &from, expected_owner)?;

        if let Some(face) = state.faces.get_mut(face_id) {
            face.person_id = to.id.clone();
            face.manually_assigned = true;
        }
        let deleted_empty_person = state.remove_if_empty(&from.id);

        Ok(FaceMove {
            face_id: face_id.to_string(),
            from,
            to,
            deleted_empty_person,
        })
    }

    async fn move_face_to_new(
        &self,
        face_id: &str,
        name: NewPersonName,
        expected_owner: Option<&str>,
    ) -> Result<FaceMove> {
        let mut state = self.lock()?;
        let from = state.owner_of(face_id)?;
        state.check_expected(face_id, &from, expected_owner)?;

        let new_id = uuid::Uuid::new_v4().to_string();
        let new_name = state.resolve_name(&self.placeholder_prefix, &new_id, &name);
        state.persons.insert(
            new_id.clone(),
            PersonRow {
                id: new_id.clone(),
                name: new_name.clone(),
            },
        );

        if let Some(face) = state.faces.get_mut(face_id) {
            face.person_id = new_id.clone();
            face.manually_assigned = true;
        }
        let deleted_empty_person = state.remove_if_empty(&from.id);

        Ok(FaceMove {
            face_id: face_id.to_string(),
            from,
            to: PersonRef {
                id: new_id,
                name: new_name,
            },
            deleted_empty_person,
        })
    }

    async fn delete_face(&self, face_id: &str) -> Result<FaceRemoval> {
        let mut state = self.lock()?;
        let from = state.owner_of(face_id)?;
        state.faces.remove(face_id);
        let deleted_empty_person = state.remove_if_empty(&from.id);
        Ok(FaceRemoval {
            face_id: face_id.to_string(),
            from,
            deleted_empty_person,
        })
    }

    async fn delete_image(&self, image_id: &str) -> Result<ImageRemoval> {
        let mut state = self.lock()?;
        if state.images.remove(image_id).is_none() {
            return Err(StoreError::not_found(Entity::Image, image_id));
        }

        let face_ids: Vec<String> = state
            .faces
            .values()
            .filter(|f| f.image_id == image_id)
            .map(|f| f.id.clone())
            .collect();
        let mut owners: Vec<String> = Vec::new();
        for id in &face_ids {
            if let Some(face) = state.faces.remove(id) {
                if !owners.contains(&face.person_id) {
                    owners.push(face.person_id);
                }
            }
        }
        owners.sort();

        let deleted_persons = owners
            .iter()
            .filter_map(|owner| state.remove_if_empty(owner))
            .collect();

        Ok(ImageRemoval {
            image_id: image_id.to_string(),
            deleted_faces_count: face_ids.len() as i64,
            deleted_persons,
        })
    }

    async fn import_batch(&self, batch: &ImportBatch) -> Result<ImportSummary> {
        let plan = plan_import(batch)?;
        let mut state = self.lock()?;

        for image in &plan.images {
            if state.images.contains_key(&image.id) {
                return Err(StoreError::Validation(format!(
                    "image already exists: {}",
                    image.id
                )));
            }
            for face in &image.faces {
                if state.faces.contains_key(&face.id) {
                    return Err(StoreError::Validation(format!(
                        "face already exists: {}",
                        face.id
                    )));
                }
            }
        }

        let now = Utc::now().timestamp();
        for PlannedPerson { id, name } in &plan.persons {
            let name = state.resolve_name(&self.placeholder_prefix, id, name);
            state.persons.insert(
                id.clone(),
                PersonRow {
                    id: id.clone(),
                    name,
                },
            );
        }
        for image in &plan.images {
            state.images.insert(
                image.id.clone(),
                ImageRow {
                    id: image.id.clone(),
                    filename: image.filename.clone(),
                    mime_type: image.mime_type.clone(),
                    uploaded_at: now,
                },
            );
            for face in &image.faces {
                state.faces.insert(
                    face.id.clone(),
                    FaceRow {
                        id: face.id.clone(),
                        image_id: image.id.clone(),
                        person_id: plan.persons[face.person].id.clone(),
                        location: face.location,
                        crop_filename: face.cropped_face_filename.clone(),
                        manually_assigned: false,
                        created_at: now,
                    },
                );
            }
        }

        Ok(plan.summary())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let state = self.lock()?;
        let images_with_faces: HashSet<&str> =
            state.faces.values().map(|f| f.image_id.as_str()).collect();
        Ok(StoreCounts {
            total_persons: state.persons.len() as i64,
            total_images: state.images.len() as i64,
            total_faces: state.faces.len() as i64,
            images_with_faces: images_with_faces.len() as i64,
            manual_face_assignments: state.faces.values().filter(|f| f.manually_assigned).count()
                as i64,
        })
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.lock()?;
        *state = State::default();
        Ok(())
    }
}

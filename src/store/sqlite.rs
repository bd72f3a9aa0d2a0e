//! SQLite-backed [`FaceStore`] implementation.
//!
//! Every mutation runs in one transaction while holding the store's write
//! lock, so reassignments are serialized and the empty-person cleanup commits
//! together with the change that caused it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use super::FaceStore;
use crate::error::{Entity, Result, StoreError};
use crate::import::plan_import;
use crate::models::{
    FaceLocation, FaceMove, FaceRemoval, GalleryFace, GalleryPerson, ImageDetail, ImageFace,
    ImageRef, ImageRemoval, ImageSummary, ImportBatch, ImportSummary, NewPersonName, PersonDetail,
    PersonFace, PersonLink, PersonRef, PersonSummary, Renamed, StoreCounts,
};
use crate::naming::placeholder_candidates;

/// SQLite implementation of the [`FaceStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    placeholder_prefix: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, placeholder_prefix: &str) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
            placeholder_prefix: placeholder_prefix.to_string(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn location_from_row(row: &sqlx::sqlite::SqliteRow) -> FaceLocation {
    FaceLocation {
        top: row.get("box_top"),
        right: row.get("box_right"),
        bottom: row.get("box_bottom"),
        left: row.get("box_left"),
    }
}

/// Current owner of `face_id`.
async fn owner_of(conn: &mut SqliteConnection, face_id: &str) -> Result<PersonRef> {
    let row = sqlx::query(
        "SELECT p.id, p.name FROM faces f JOIN persons p ON p.id = f.person_id WHERE f.id = ?",
    )
    .bind(face_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found(Entity::Face, face_id))?;

    Ok(PersonRef {
        id: row.get("id"),
        name: row.get("name"),
    })
}

async fn person_ref(conn: &mut SqliteConnection, person_id: &str) -> Result<Option<PersonRef>> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM persons WHERE id = ?")
        .bind(person_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(name.map(|name| PersonRef {
        id: person_id.to_string(),
        name,
    }))
}

/// `Conflict` unless `expected` is absent or names the current owner.
async fn check_expected(
    conn: &mut SqliteConnection,
    face_id: &str,
    owner: &PersonRef,
    expected: Option<&str>,
) -> Result<()> {
    let expected = match expected {
        Some(expected) if expected != owner.id => expected,
        _ => return Ok(()),
    };
    let expected = person_ref(conn, expected).await?.unwrap_or_else(|| PersonRef {
        id: expected.to_string(),
        name: expected.to_string(),
    });
    Err(StoreError::Conflict {
        face_id: face_id.to_string(),
        expected,
        actual: owner.clone(),
    })
}

/// Delete `person` if it no longer owns any face.
async fn remove_if_empty(
    conn: &mut SqliteConnection,
    person: &PersonRef,
) -> Result<Option<PersonRef>> {
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM faces WHERE person_id = ?")
        .bind(&person.id)
        .fetch_one(&mut *conn)
        .await?;
    if remaining > 0 {
        return Ok(None);
    }

    sqlx::query("DELETE FROM persons WHERE id = ?")
        .bind(&person.id)
        .execute(&mut *conn)
        .await?;
    debug!(person_id = %person.id, person_name = %person.name, "removed empty person");
    Ok(Some(person.clone()))
}

async fn resolve_name(
    conn: &mut SqliteConnection,
    prefix: &str,
    person_id: &str,
    name: &NewPersonName,
) -> Result<String> {
    match name {
        NewPersonName::Custom(name) => Ok(name.clone()),
        NewPersonName::Placeholder => {
            for candidate in placeholder_candidates(prefix, person_id) {
                let taken: bool =
                    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM persons WHERE name = ?")
                        .bind(&candidate)
                        .fetch_one(&mut *conn)
                        .await?;
                if !taken {
                    return Ok(candidate);
                }
            }
            Err(StoreError::Internal(
                "placeholder candidates exhausted".to_string(),
            ))
        }
    }
}

async fn insert_person(conn: &mut SqliteConnection, id: &str, name: &str) -> Result<()> {
    sqlx::query("INSERT INTO persons (id, name, created_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(Utc::now().timestamp())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn assign_face(conn: &mut SqliteConnection, face_id: &str, person_id: &str) -> Result<()> {
    sqlx::query("UPDATE faces SET person_id = ?, manually_assigned = 1 WHERE id = ?")
        .bind(person_id)
        .bind(face_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl FaceStore for SqliteStore {
    async fn list_persons(&self) -> Result<Vec<PersonSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.id,
                p.name,
                COUNT(f.id) AS total_faces,
                COUNT(DISTINCT f.image_id) AS total_images,
                (SELECT f2.crop_filename FROM faces f2
                 WHERE f2.person_id = p.id
                 ORDER BY f2.created_at ASC, f2.id ASC LIMIT 1) AS thumbnail
            FROM persons p
            JOIN faces f ON f.person_id = p.id
            GROUP BY p.id, p.name
            ORDER BY total_faces DESC, p.name ASC, p.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PersonSummary {
                person_id: row.get("id"),
                person_name: row.get("name"),
                total_faces: row.get("total_faces"),
                total_images: row.get("total_images"),
                thumbnail: row.get("thumbnail"),
            })
            .collect())
    }

    async fn get_person(&self, person_id: &str) -> Result<Option<PersonDetail>> {
        // One read transaction so the faces and images come from the same
        // snapshot as the person row.
        let mut tx = self.pool.begin().await?;
        let person = match person_ref(&mut tx, person_id).await? {
            Some(p) => p,
            None => return Ok(None),
        };

        let face_rows = sqlx::query(
            r#"
            SELECT id, image_id, crop_filename, box_top, box_right, box_bottom, box_left
            FROM faces WHERE person_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(person_id)
        .fetch_all(&mut *tx)
        .await?;

        let image_rows = sqlx::query(
            r#"
            SELECT i.id, i.filename, i.mime_type
            FROM images i
            WHERE i.id IN (SELECT image_id FROM faces WHERE person_id = ?)
            ORDER BY i.uploaded_at ASC, i.id ASC
            "#,
        )
        .bind(person_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let faces: Vec<PersonFace> = face_rows
            .iter()
            .map(|row| PersonFace {
                face_id: row.get("id"),
                image_id: row.get("image_id"),
                cropped_face_filename: row.get("crop_filename"),
                face_location: location_from_row(row),
            })
            .collect();
        let images: Vec<ImageRef> = image_rows
            .iter()
            .map(|row| ImageRef {
                image_id: row.get("id"),
                filename: row.get("filename"),
                mime_type: row.get("mime_type"),
            })
            .collect();

        Ok(Some(PersonDetail {
            person_id: person.id,
            person_name: person.name,
            total_faces: faces.len() as i64,
            total_images: images.len() as i64,
            faces,
            images,
        }))
    }

    async fn get_image(&self, image_id: &str) -> Result<Option<ImageDetail>> {
        let mut tx = self.pool.begin().await?;
        let image_row = sqlx::query("SELECT id, filename, mime_type FROM images WHERE id = ?")
            .bind(image_id)
            .fetch_optional(&mut *tx)
            .await?;
        let image_row = match image_row {
            Some(row) => row,
            None => return Ok(None),
        };

        let face_rows = sqlx::query(
            r#"
            SELECT f.id, f.crop_filename, f.box_top, f.box_right, f.box_bottom, f.box_left,
                   p.id AS person_id, p.name AS person_name
            FROM faces f
            JOIN persons p ON p.id = f.person_id
            WHERE f.image_id = ?
            ORDER BY f.created_at ASC, f.id ASC
            "#,
        )
        .bind(image_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let faces: Vec<ImageFace> = face_rows
            .iter()
            .map(|row| ImageFace {
                face_id: row.get("id"),
                cropped_face_filename: row.get("crop_filename"),
                face_location: location_from_row(row),
                person: PersonLink {
                    person_id: row.get("person_id"),
                    person_name: row.get("person_name"),
                },
            })
            .collect();

        Ok(Some(ImageDetail {
            image_id: image_row.get("id"),
            filename: image_row.get("filename"),
            mime_type: image_row.get("mime_type"),
            total_faces: faces.len() as i64,
            faces,
        }))
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let mut tx = self.pool.begin().await?;
        let image_rows = sqlx::query(
            r#"
            SELECT id, filename, mime_type, uploaded_at
            FROM images
            ORDER BY uploaded_at ASC, id ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        let face_rows = sqlx::query(
            r#"
            SELECT f.image_id, p.id AS person_id, p.name AS person_name
            FROM faces f
            JOIN persons p ON p.id = f.person_id
            ORDER BY f.created_at ASC, f.id ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut by_image: HashMap<String, (i64, Vec<PersonLink>)> = HashMap::new();
        for row in &face_rows {
            let (faces_count, persons) = by_image
                .entry(row.get::<String, _>("image_id"))
                .or_default();
            *faces_count += 1;
            let person_id: String = row.get("person_id");
            if !persons.iter().any(|p| p.person_id == person_id) {
                persons.push(PersonLink {
                    person_id,
                    person_name: row.get("person_name"),
                });
            }
        }

        Ok(image_rows
            .iter()
            .map(|row| {
                let image_id: String = row.get("id");
                let (faces_count, persons) = by_image.remove(&image_id).unwrap_or_default();
                ImageSummary {
                    image_id,
                    filename: row.get("filename"),
                    mime_type: row.get("mime_type"),
                    uploaded_at: row.get("uploaded_at"),
                    faces_count,
                    persons_count: persons.len() as i64,
                    persons,
                    has_faces: faces_count > 0,
                }
            })
            .collect())
    }

    async fn gallery(&self) -> Result<Vec<GalleryPerson>> {
        let mut tx = self.pool.begin().await?;
        let person_rows = sqlx::query("SELECT id, name FROM persons")
            .fetch_all(&mut *tx)
            .await?;
        let face_rows = sqlx::query(
            r#"
            SELECT f.id, f.person_id, f.image_id, i.filename, f.crop_filename,
                   f.box_top, f.box_right, f.box_bottom, f.box_left
            FROM faces f
            JOIN images i ON i.id = f.image_id
            ORDER BY f.created_at ASC, f.id ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut by_person: HashMap<String, Vec<GalleryFace>> = HashMap::new();
        for row in &face_rows {
            by_person
                .entry(row.get::<String, _>("person_id"))
                .or_default()
                .push(GalleryFace {
                    face_id: row.get("id"),
                    image_id: row.get("image_id"),
                    filename: row.get("filename"),
                    cropped_face_filename: row.get("crop_filename"),
                    face_location: location_from_row(row),
                });
        }

        let mut gallery: Vec<GalleryPerson> = person_rows
            .iter()
            .map(|row| {
                let person_id: String = row.get("id");
                let faces = by_person.remove(&person_id).unwrap_or_default();
                GalleryPerson {
                    person_id,
                    person_name: row.get("name"),
                    total_faces: faces.len() as i64,
                    faces,
                }
            })
            .collect();
        gallery.sort_by(|a, b| {
            b.total_faces
                .cmp(&a.total_faces)
                .then_with(|| a.person_name.cmp(&b.person_name))
                .then_with(|| a.person_id.cmp(&b.person_id))
        });
        Ok(gallery)
    }

    async fn rename_person(&self, person_id: &str, new_name: &str) -> Result<Renamed> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let person = person_ref(&mut tx, person_id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::Person, person_id))?;
        sqlx::query("UPDATE persons SET name = ? WHERE id = ?")
            .bind(new_name)
            .bind(person_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Renamed {
            person_id: person.id,
            old_name: person.name,
            new_name: new_name.to_string(),
        })
    }

    async fn move_face(
        &self,
        face_id: &str,
        target_person_id: &str,
        expected_owner: Option<&str>,
    ) -> Result<FaceMove> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let from = owner_of(&mut tx, face_id).await?;
        let to = person_ref(&mut tx, target_person_id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::Person, target_person_id))?;

        // Already at the target, so a retried move succeeds even though the
        // expected owner is now stale. Dropping the transaction rolls it back.
        if from.id == to.id {
            return Ok(FaceMove {
                face_id: face_id.to_string(),
                from,
                to,
                deleted_empty_person: None,
            });
        }
        check_expected(&mut tx, face_id, &from, expected_owner).await?;

        assign_face(&mut tx, face_id, &to.id).await?;
        let deleted_empty_person = remove_if_empty(&mut tx, &from).await?;
        tx.commit().await?;

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
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let from = owner_of(&mut tx, face_id).await?;
        check_expected(&mut tx, face_id, &from, expected_owner).await?;

        let new_id = uuid::Uuid::new_v4().to_string();
        let new_name = resolve_name(&mut tx, &self.placeholder_prefix, &new_id, &name).await?;
        insert_person(&mut tx, &new_id, &new_name).await?;
        assign_face(&mut tx, face_id, &new_id).await?;
        let deleted_empty_person = remove_if_empty(&mut tx, &from).await?;
        tx.commit().await?;

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
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let from = owner_of(&mut tx, face_id).await?;
        sqlx::query("DELETE FROM faces WHERE id = ?")
            .bind(face_id)
            .execute(&mut *tx)
            .await?;
        let deleted_empty_person = remove_if_empty(&mut tx, &from).await?;
        tx.commit().await?;

        Ok(FaceRemoval {
            face_id: face_id.to_string(),
            from,
            deleted_empty_person,
        })
    }

    async fn delete_image(&self, image_id: &str) -> Result<ImageRemoval> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM images WHERE id = ?")
            .bind(image_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(StoreError::not_found(Entity::Image, image_id));
        }

        let owner_rows = sqlx::query(
            r#"
            SELECT DISTINCT p.id, p.name
            FROM faces f JOIN persons p ON p.id = f.person_id
            WHERE f.image_id = ?
            ORDER BY p.id ASC
            "#,
        )
        .bind(image_id)
        .fetch_all(&mut *tx)
        .await?;
        let owners: Vec<PersonRef> = owner_rows
            .iter()
            .map(|row| PersonRef {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect();

        let deleted_faces = sqlx::query("DELETE FROM faces WHERE image_id = ?")
            .bind(image_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(image_id)
            .execute(&mut *tx)
            .await?;

        let mut deleted_persons = Vec::new();
        for owner in &owners {
            if let Some(removed) = remove_if_empty(&mut tx, owner).await? {
                deleted_persons.push(removed);
            }
        }
        tx.commit().await?;

        Ok(ImageRemoval {
            image_id: image_id.to_string(),
            deleted_faces_count: deleted_faces as i64,
            deleted_persons,
        })
    }

    async fn import_batch(&self, batch: &ImportBatch) -> Result<ImportSummary> {
        let plan = plan_import(batch)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        for image in &plan.images {
            let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM images WHERE id = ?")
                .bind(&image.id)
                .fetch_one(&mut *tx)
                .await?;
            if exists {
                return Err(StoreError::Validation(format!(
                    "image already exists: {}",
                    image.id
                )));
            }
            for face in &image.faces {
                let exists: bool =
                    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM faces WHERE id = ?")
                        .bind(&face.id)
                        .fetch_one(&mut *tx)
                        .await?;
                if exists {
                    return Err(StoreError::Validation(format!(
                        "face already exists: {}",
                        face.id
                    )));
                }
            }
        }

        for person in &plan.persons {
            let name =
                resolve_name(&mut tx, &self.placeholder_prefix, &person.id, &person.name).await?;
            insert_person(&mut tx, &person.id, &name).await?;
        }

        let now = Utc::now().timestamp();
        for image in &plan.images {
            sqlx::query(
                "INSERT INTO images (id, filename, mime_type, uploaded_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&image.id)
            .bind(&image.filename)
            .bind(&image.mime_type)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            for face in &image.faces {
                sqlx::query(
                    r#"
                    INSERT INTO faces (id, image_id, person_id, box_top, box_right, box_bottom,
                                       box_left, crop_filename, manually_assigned, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
                    "#,
                )
                .bind(&face.id)
                .bind(&image.id)
                .bind(&plan.persons[face.person].id)
                .bind(face.location.top)
                .bind(face.location.right)
                .bind(face.location.bottom)
                .bind(face.location.left)
                .bind(&face.cropped_face_filename)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(plan.summary())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM persons) AS total_persons,
                (SELECT COUNT(*) FROM images) AS total_images,
                (SELECT COUNT(*) FROM faces) AS total_faces,
                (SELECT COUNT(DISTINCT image_id) FROM faces) AS images_with_faces,
                (SELECT COUNT(*) FROM faces WHERE manually_assigned = 1) AS manual_face_assignments
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreCounts {
            total_persons: row.get("total_persons"),
            total_images: row.get("total_images"),
            total_faces: row.get("total_faces"),
            images_with_faces: row.get("images_with_faces"),
            manual_face_assignments: row.get("manual_face_assignments"),
        })
    }

    async fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM faces").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM images").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM persons").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

//! Import of clustering-engine output.
//!
//! The detection and clustering engine runs outside facesort. Its output is
//! an [`ImportBatch`] JSON document: images, the faces found in each, and a
//! cluster label per face. [`plan_import`] validates a batch and turns it into
//! an [`ImportPlan`] with every id assigned and every face bound to a planned
//! person; stores then apply the plan in one transaction.
//!
//! Grouping rules:
//!
//! - faces sharing a `cluster` label within one batch become one new person,
//!   named from `clusters[label]` when present;
//! - a face without a label becomes the sole face of its own person;
//! - unnamed persons get a placeholder (see [`crate::naming`]).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::error::{Result, StoreError};
use crate::models::{FaceLocation, ImportBatch, ImportSummary, NewPersonName};
use crate::naming::normalize_custom_name;
use crate::store::sqlite::SqliteStore;
use crate::store::FaceStore;

#[derive(Debug, Clone)]
pub struct PlannedPerson {
    pub id: String,
    pub name: NewPersonName,
}

#[derive(Debug, Clone)]
pub struct PlannedFace {
    pub id: String,
    /// Index into [`ImportPlan::persons`].
    pub person: usize,
    pub location: FaceLocation,
    pub cropped_face_filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlannedImage {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub faces: Vec<PlannedFace>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub persons: Vec<PlannedPerson>,
    pub images: Vec<PlannedImage>,
}

impl ImportPlan {
    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            images: self.images.len(),
            faces: self.images.iter().map(|i| i.faces.len()).sum(),
            persons: self.persons.len(),
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validate `batch` and assign ids and owners.
///
/// Fails with `Validation` on an empty filename, an inverted face box, or an
/// id repeated within the batch. Collisions with ids already in a store are
/// checked by the store.
pub fn plan_import(batch: &ImportBatch) -> Result<ImportPlan> {
    let mut plan = ImportPlan::default();
    let mut by_label: HashMap<&str, usize> = HashMap::new();
    let mut image_ids = HashSet::new();
    let mut face_ids = HashSet::new();

    for image in &batch.images {
        if image.filename.trim().is_empty() {
            return Err(StoreError::Validation(
                "image filename must not be empty".to_string(),
            ));
        }
        let image_id = image.image_id.clone().unwrap_or_else(new_id);
        if !image_ids.insert(image_id.clone()) {
            return Err(StoreError::Validation(format!(
                "duplicate image id in batch: {}",
                image_id
            )));
        }

        let mut faces = Vec::with_capacity(image.faces.len());
        for face in &image.faces {
            if !face.location.is_valid() {
                return Err(StoreError::Validation(format!(
                    "inverted face box in {}: {:?}",
                    image.filename, face.location
                )));
            }
            let face_id = face.face_id.clone().unwrap_or_else(new_id);
            if !face_ids.insert(face_id.clone()) {
                return Err(StoreError::Validation(format!(
                    "duplicate face id in batch: {}",
                    face_id
                )));
            }

            let person = match face.cluster.as_deref() {
                Some(label) => *by_label.entry(label).or_insert_with(|| {
                    plan.persons.push(PlannedPerson {
                        id: new_id(),
                        name: normalize_custom_name(batch.clusters.get(label).map(String::as_str)),
                    });
                    plan.persons.len() - 1
                }),
                None => {
                    plan.persons.push(PlannedPerson {
                        id: new_id(),
                        name: NewPersonName::Placeholder,
                    });
                    plan.persons.len() - 1
                }
            };

            faces.push(PlannedFace {
                id: face_id,
                person,
                location: face.location,
                cropped_face_filename: face.cropped_face_filename.clone(),
            });
        }

        plan.images.push(PlannedImage {
            id: image_id,
            filename: image.filename.clone(),
            mime_type: image.mime_type.clone(),
            faces,
        });
    }

    Ok(plan)
}

/// CLI entry point: load a batch file into the configured database.
pub async fn run_import(config: &Config, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let batch: ImportBatch = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file: {}", path.display()))?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), &config.naming.placeholder_prefix);
    let summary = store.import_batch(&batch).await?;
    pool.close().await;

    info!(
        images = summary.images,
        faces = summary.faces,
        persons = summary.persons,
        "import committed"
    );
    println!("Import {}", path.display());
    println!("  images:  {}", summary.images);
    println!("  faces:   {}", summary.faces);
    println!("  persons: {}", summary.persons);
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImportFace, ImportImage};

    fn face(cluster: Option<&str>) -> ImportFace {
        ImportFace {
            face_id: None,
            cluster: cluster.map(str::to_string),
            location: FaceLocation {
                top: 10,
                right: 50,
                bottom: 60,
                left: 5,
            },
            cropped_face_filename: None,
        }
    }

    fn image(filename: &str, faces: Vec<ImportFace>) -> ImportImage {
        ImportImage {
            image_id: None,
            filename: filename.to_string(),
            mime_type: "image/jpeg".to_string(),
            faces,
        }
    }

    #[test]
    fn shared_label_maps_to_one_person() {
        let mut batch = ImportBatch {
            images: vec![
                image("a.jpg", vec![face(Some("c1")), face(None)]),
                image("b.jpg", vec![face(Some("c1"))]),
            ],
            ..Default::default()
        };
        batch.clusters.insert("c1".to_string(), "Alice".to_string());

        let plan = plan_import(&batch).unwrap();
        assert_eq!(plan.persons.len(), 2);
        assert_eq!(plan.images[0].faces[0].person, plan.images[1].faces[0].person);
        assert_ne!(plan.images[0].faces[1].person, plan.images[0].faces[0].person);
        assert_eq!(
            plan.persons[plan.images[0].faces[0].person].name,
            NewPersonName::Custom("Alice".to_string())
        );
        assert_eq!(
            plan.summary(),
            ImportSummary {
                images: 2,
                faces: 3,
                persons: 2
            }
        );
    }

    #[test]
    fn inverted_box_is_rejected() {
        let mut bad = face(Some("c1"));
        bad.location.top = 100;
        let batch = ImportBatch {
            images: vec![image("a.jpg", vec![bad])],
            ..Default::default()
        };
        assert!(matches!(
            plan_import(&batch),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_face_id_is_rejected() {
        let mut f1 = face(None);
        f1.face_id = Some("f1".to_string());
        let f2 = f1.clone();
        let batch = ImportBatch {
            images: vec![image("a.jpg", vec![f1, f2])],
            ..Default::default()
        };
        assert!(matches!(
            plan_import(&batch),
            Err(StoreError::Validation(_))
        ));
    }
}

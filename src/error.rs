//! Error types for store and reassignment operations.
//!
//! [`StoreError`] is the taxonomy every [`FaceStore`](crate::store::FaceStore)
//! backend reports. The HTTP layer maps each variant to a status code and a
//! machine-readable `code` field (see [`StoreError::code`]).

use thiserror::Error;

use crate::models::PersonRef;

/// Result type for store and service operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The kind of entity a [`StoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Face,
    Person,
    Image,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Face => "face",
            Entity::Person => "person",
            Entity::Image => "image",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// A referenced face, person or image does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// The face is not owned by the person the caller expected.
    ///
    /// `expected` carries the id as its name when that person no longer
    /// exists.
    #[error(
        "face {} now belongs to \"{}\", not \"{}\"",
        .face_id,
        .actual.name,
        .expected.name
    )]
    Conflict {
        face_id: String,
        expected: PersonRef,
        actual: PersonRef,
    },

    /// Rejected input (empty rename, malformed import).
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Machine-readable error code carried in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Conflict { .. } => "conflict",
            StoreError::Validation(_) => "validation",
            StoreError::Database(_) | StoreError::Internal(_) => "internal",
        }
    }
}

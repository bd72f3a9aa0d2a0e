//! HTTP API server.
//!
//! Exposes the person/face store and the reassignment operations as a JSON
//! API for the management console and the `facesort` CLI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/persons` | Person list for galleries and the move picker |
//! | `GET`    | `/persons/{id}` | Person with faces and images |
//! | `PUT`    | `/persons/{id}/rename` | Rename a person |
//! | `PUT`    | `/faces/{id}/move` | Move a face to an existing person |
//! | `PUT`    | `/faces/{id}/move-to-new` | Move a face to a new person |
//! | `DELETE` | `/faces/{id}` | Delete a face |
//! | `GET`    | `/images` | Image list with face and owner counts |
//! | `GET`    | `/images/{id}` | Image with faces and their owners |
//! | `DELETE` | `/images/{id}` | Delete an image and its faces |
//! | `GET`    | `/gallery` | Every person with all of its faces |
//! | `GET`    | `/stats` | Gallery statistics |
//! | `DELETE` | `/reset` | Remove all persons, faces and images |
//!
//! # Error Contract
//!
//! Every error is a JSON body with a body-level discriminator, so clients can
//! check `status` rather than only the transport code:
//!
//! ```json
//! { "status": "error", "message": "person not found: p9", "code": "not_found" }
//! ```
//!
//! Codes: `not_found` (404), `conflict` (409), `validation` (400),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser console can
//! be served from a different origin.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api::{
    DeleteFaceResponse, DeleteImageResponse, ErrorResponse, GalleryResponse, ImageDetailResponse,
    ImageListResponse, MessageResponse, MoveFaceRequest, MoveFaceResponse, MoveToNewRequest,
    MoveToNewResponse, PersonDetailResponse, PersonListResponse, RenameRequest, RenameResponse,
    Status, StatsResponse,
};
use crate::config::Config;
use crate::db;
use crate::error::{Entity, StoreError};
use crate::migrate;
use crate::reassign::Reassigner;
use crate::stats::Stats;
use crate::store::sqlite::SqliteStore;
use crate::store::FaceStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    service: Reassigner,
}

impl AppState {
    pub fn new(store: Arc<dyn FaceStore>) -> Self {
        Self {
            service: Reassigner::new(store),
        }
    }

    fn store(&self) -> &Arc<dyn FaceStore> {
        self.service.store()
    }
}

/// Builds the router with all routes and layers. Split out from
/// [`run_server`] so tests can serve it on their own listener.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/persons", get(handle_list_persons))
        .route("/persons/{id}", get(handle_get_person))
        .route("/persons/{id}/rename", put(handle_rename_person))
        .route("/faces/{id}", delete(handle_delete_face))
        .route("/faces/{id}/move", put(handle_move_face))
        .route("/faces/{id}/move-to-new", put(handle_move_face_to_new))
        .route("/images", get(handle_list_images))
        .route(
            "/images/{id}",
            get(handle_get_image).delete(handle_delete_image),
        )
        .route("/gallery", get(handle_gallery))
        .route("/stats", get(handle_stats))
        .route("/reset", delete(handle_reset))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` backed by the configured
/// SQLite database. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store = SqliteStore::new(pool, &config.naming.placeholder_prefix);

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(
        "facesort v{} listening on http://{}",
        env!("CARGO_PKG_VERSION"),
        listener.local_addr()?
    );

    serve(listener, AppState::new(Arc::new(store))).await
}

/// Serves the API on an already-bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

// ============ Error response ============

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: Status::Error,
            message: self.message,
            code: Some(self.code.to_string()),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Conflict { .. } => StatusCode::CONFLICT,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::Database(_) | StoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        } else {
            warn!(error = %err, "request rejected");
        }
        AppError {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "validation",
        message: message.into(),
    }
}

/// Parse a JSON request body into `T`.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    if body.is_empty() {
        return Err(bad_request("request body must not be empty"));
    }
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid JSON body: {}", e)))
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Persons ============

async fn handle_list_persons(State(state): State<AppState>) -> ApiResult<PersonListResponse> {
    let persons = state.store().list_persons().await?;
    Ok(Json(PersonListResponse {
        status: Status::Success,
        message: format!("Found {} persons", persons.len()),
        total: persons.len(),
        persons,
    }))
}

async fn handle_get_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PersonDetailResponse> {
    let person = state
        .store()
        .get_person(&id)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Person, &id))?;
    Ok(Json(PersonDetailResponse {
        status: Status::Success,
        person,
    }))
}

async fn handle_rename_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<RenameResponse> {
    let request: RenameRequest = parse_body(&body)?;
    let renamed = state.service.rename_person(&id, &request.name).await?;
    Ok(Json(renamed.into()))
}

// ============ Faces ============

async fn handle_move_face(
    State(state): State<AppState>,
    Path(face_id): Path<String>,
    body: Bytes,
) -> ApiResult<MoveFaceResponse> {
    let request: MoveFaceRequest = parse_body(&body)?;
    let moved = state
        .service
        .move_to_existing(
            &face_id,
            &request.target_person_id,
            request.expected_person_id.as_deref(),
        )
        .await?;
    Ok(Json(moved.into()))
}

async fn handle_move_face_to_new(
    State(state): State<AppState>,
    Path(face_id): Path<String>,
    body: Bytes,
) -> ApiResult<MoveToNewResponse> {
    // The body is optional: no body means "no custom name".
    let request: MoveToNewRequest = if body.is_empty() {
        MoveToNewRequest::default()
    } else {
        parse_body(&body)?
    };
    let moved = state
        .service
        .move_to_new(
            &face_id,
            request.custom_name.as_deref(),
            request.expected_person_id.as_deref(),
        )
        .await?;
    Ok(Json(moved.into()))
}

async fn handle_delete_face(
    State(state): State<AppState>,
    Path(face_id): Path<String>,
) -> ApiResult<DeleteFaceResponse> {
    let removed = state.service.delete_face(&face_id).await?;
    Ok(Json(removed.into()))
}

// ============ Images ============

async fn handle_list_images(State(state): State<AppState>) -> ApiResult<ImageListResponse> {
    let images = state.store().list_images().await?;
    Ok(Json(images.into()))
}

async fn handle_get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ImageDetailResponse> {
    let image = state
        .store()
        .get_image(&id)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Image, &id))?;
    Ok(Json(ImageDetailResponse {
        status: Status::Success,
        image,
    }))
}

async fn handle_delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeleteImageResponse> {
    let removed = state.service.delete_image(&id).await?;
    Ok(Json(removed.into()))
}

// ============ Gallery / stats / reset ============

async fn handle_gallery(State(state): State<AppState>) -> ApiResult<GalleryResponse> {
    let gallery = state.store().gallery().await?;
    Ok(Json(gallery.into()))
}

async fn handle_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let counts = state.store().counts().await?;
    Ok(Json(StatsResponse {
        status: Status::Success,
        message: "Statistics retrieved".to_string(),
        data: Stats::from(counts),
    }))
}

async fn handle_reset(State(state): State<AppState>) -> ApiResult<MessageResponse> {
    state.store().reset().await?;
    warn!("store reset: all persons, faces and images removed");
    Ok(Json(MessageResponse {
        status: Status::Success,
        message: "All data has been reset".to_string(),
    }))
}

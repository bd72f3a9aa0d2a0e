//! HTTP client for the facesort API.
//!
//! [`ApiClient`] wraps a `reqwest::Client` with the configured base URL and
//! timeout. Every call inspects the body-level `status` discriminator before
//! treating a response as successful: a `200` whose body says
//! `"status": "error"` is a failure.
//!
//! Failures come back as [`ApiError`]. The kind is taken from the body's
//! `code` field when present, otherwise from the HTTP status. Network
//! failures and timeouts are [`ApiError::Transport`]; they say nothing about
//! whether the server applied the operation.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::api::{
    DeleteFaceResponse, DeleteImageResponse, GalleryResponse, ImageDetailResponse,
    ImageListResponse, MessageResponse, MoveFaceRequest, MoveFaceResponse, MoveToNewRequest,
    MoveToNewResponse, PersonDetailResponse, PersonListResponse, RenameRequest, RenameResponse,
    StatsResponse,
};
use crate::config::ClientConfig;
use crate::controller::ReassignApi;
use crate::models::PersonSummary;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{}", .message.as_deref().unwrap_or("not found"))]
    NotFound { message: Option<String> },

    #[error("{}", .message.as_deref().unwrap_or("conflict"))]
    Conflict { message: Option<String> },

    #[error("{}", .message.as_deref().unwrap_or("invalid request"))]
    Validation { message: Option<String> },

    #[error("server error {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },

    #[error("request failed: {0}")]
    Transport(String),
}

impl ApiError {
    /// The message the server put in the error body, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::NotFound { message }
            | ApiError::Conflict { message }
            | ApiError::Validation { message }
            | ApiError::Server { message, .. } => message.as_deref(),
            ApiError::Transport(_) => None,
        }
    }

    /// Whether the caller's view of the affected entity is known to be stale.
    pub fn invalidates_view(&self) -> bool {
        matches!(self, ApiError::NotFound { .. } | ApiError::Conflict { .. })
    }

    fn classify(status: StatusCode, code: Option<&str>, message: Option<String>) -> Self {
        match (code, status) {
            (Some("not_found"), _) | (None, StatusCode::NOT_FOUND) => ApiError::NotFound { message },
            (Some("conflict"), _) | (None, StatusCode::CONFLICT) => ApiError::Conflict { message },
            (Some("validation"), _)
            | (None, StatusCode::BAD_REQUEST)
            | (None, StatusCode::UNPROCESSABLE_ENTITY) => ApiError::Validation { message },
            _ => ApiError::Server {
                status: status.as_u16(),
                message,
            },
        }
    }
}

/// Client for the facesort HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_base_url(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let body: Value = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(ApiError::Transport(format!("undecodable response: {}", e)))
            }
            Err(_) => return Err(ApiError::classify(status, None, None)),
        };

        let body_status = body.get("status").and_then(Value::as_str);
        if body_status == Some("error") || !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            let code = body.get("code").and_then(Value::as_str);
            debug!(%status, ?code, ?message, "api call failed");
            return Err(ApiError::classify(status, code, message));
        }

        serde_json::from_value(body)
            .map_err(|e| ApiError::Transport(format!("unexpected response shape: {}", e)))
    }

    async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.http.put(self.url(path)).json(body)).await
    }

    pub async fn health(&self) -> Result<(), ApiError> {
        let _: Value = self.send(self.http.get(self.url("/health"))).await?;
        Ok(())
    }

    pub async fn list_persons(&self) -> Result<PersonListResponse, ApiError> {
        self.send(self.http.get(self.url("/persons"))).await
    }

    pub async fn get_person(&self, person_id: &str) -> Result<PersonDetailResponse, ApiError> {
        self.send(self.http.get(self.url(&format!("/persons/{}", person_id))))
            .await
    }

    pub async fn rename_person(
        &self,
        person_id: &str,
        name: &str,
    ) -> Result<RenameResponse, ApiError> {
        let body = RenameRequest {
            name: name.to_string(),
        };
        self.put_json(&format!("/persons/{}/rename", person_id), &body)
            .await
    }

    pub async fn move_face(
        &self,
        face_id: &str,
        target_person_id: &str,
        expected_person_id: Option<&str>,
    ) -> Result<MoveFaceResponse, ApiError> {
        let body = MoveFaceRequest {
            target_person_id: target_person_id.to_string(),
            expected_person_id: expected_person_id.map(str::to_string),
        };
        self.put_json(&format!("/faces/{}/move", face_id), &body)
            .await
    }

    pub async fn move_face_to_new(
        &self,
        face_id: &str,
        custom_name: Option<&str>,
        expected_person_id: Option<&str>,
    ) -> Result<MoveToNewResponse, ApiError> {
        let body = MoveToNewRequest {
            custom_name: custom_name.map(str::to_string),
            expected_person_id: expected_person_id.map(str::to_string),
        };
        self.put_json(&format!("/faces/{}/move-to-new", face_id), &body)
            .await
    }

    pub async fn delete_face(&self, face_id: &str) -> Result<DeleteFaceResponse, ApiError> {
        self.send(self.http.delete(self.url(&format!("/faces/{}", face_id))))
            .await
    }

    pub async fn list_images(&self) -> Result<ImageListResponse, ApiError> {
        self.send(self.http.get(self.url("/images"))).await
    }

    pub async fn get_image(&self, image_id: &str) -> Result<ImageDetailResponse, ApiError> {
        self.send(self.http.get(self.url(&format!("/images/{}", image_id))))
            .await
    }

    pub async fn delete_image(&self, image_id: &str) -> Result<DeleteImageResponse, ApiError> {
        self.send(self.http.delete(self.url(&format!("/images/{}", image_id))))
            .await
    }

    pub async fn gallery(&self) -> Result<GalleryResponse, ApiError> {
        self.send(self.http.get(self.url("/gallery"))).await
    }

    pub async fn stats(&self) -> Result<StatsResponse, ApiError> {
        self.send(self.http.get(self.url("/stats"))).await
    }

    pub async fn reset(&self) -> Result<MessageResponse, ApiError> {
        self.send(self.http.delete(self.url("/reset"))).await
    }
}

#[async_trait]
impl ReassignApi for ApiClient {
    async fn list_persons(&self) -> Result<Vec<PersonSummary>, ApiError> {
        Ok(ApiClient::list_persons(self).await?.persons)
    }

    async fn move_face(
        &self,
        face_id: &str,
        target_person_id: &str,
        expected_person_id: Option<&str>,
    ) -> Result<MoveFaceResponse, ApiError> {
        ApiClient::move_face(self, face_id, target_person_id, expected_person_id).await
    }

    async fn move_face_to_new(
        &self,
        face_id: &str,
        custom_name: Option<&str>,
        expected_person_id: Option<&str>,
    ) -> Result<MoveToNewResponse, ApiError> {
        ApiClient::move_face_to_new(self, face_id, custom_name, expected_person_id).await
    }

    async fn delete_face(&self, face_id: &str) -> Result<DeleteFaceResponse, ApiError> {
        ApiClient::delete_face(self, face_id).await
    }
}

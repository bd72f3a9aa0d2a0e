use async_trait::async_trait;
use facesort::api::{DeleteFaceResponse, MoveFaceResponse, MoveToNewResponse};
use facesort::client::{ApiClient, ApiError};
use facesort::commands;
use facesort::controller::{
    Destination, Effect, MoveController, MoveState, Notice, ReassignApi, View,
};
use facesort::models::{ImportBatch, PersonSummary};
use facesort::server::{serve, AppState};
use facesort::store::memory::InMemoryStore;
use facesort::store::FaceStore;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

// ─── Helpers ────────────────────────────────────────────────────────

/// Alice owns f1 and f2, Bob owns f3. img3 has no faces.
fn gallery() -> ImportBatch {
    serde_json::from_value(json!({
        "images": [
            {"image_id": "img1", "filename": "beach.jpg", "faces": [
                {"face_id": "f1", "cluster": "a", "location": {"top": 0, "right": 10, "bottom": 10, "left": 0}},
                {"face_id": "f2", "cluster": "a", "location": {"top": 0, "right": 30, "bottom": 10, "left": 20}}
            ]},
            {"image_id": "img2", "filename": "party.jpg", "faces": [
                {"face_id": "f3", "cluster": "b", "location": {"top": 0, "right": 10, "bottom": 10, "left": 0}}
            ]},
            {"image_id": "img3", "filename": "empty.jpg", "faces": []}
        ],
        "clusters": {"a": "Alice", "b": "Bob"}
    }))
    .unwrap()
}

/// Start a server over a seeded in-memory store and return its base URL.
async fn start_server() -> String {
    let store = InMemoryStore::new();
    store.import_batch(&gallery()).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, AppState::new(Arc::new(store))));

    let base_url = format!("http://{}", addr);
    wait_for_server(&base_url).await;
    base_url
}

async fn wait_for_server(base_url: &str) {
    let client = reqwest::Client::new();
    let url = format!("{}/health", base_url);
    for _ in 0..50 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Server did not become ready within 5 seconds");
}

fn api(base_url: &str) -> ApiClient {
    ApiClient::with_base_url(base_url, Duration::from_secs(5)).unwrap()
}

async fn person_id(client: &ApiClient, name: &str) -> String {
    client
        .list_persons()
        .await
        .unwrap()
        .persons
        .into_iter()
        .find(|p| p.person_name == name)
        .unwrap()
        .person_id
}

/// Applies every call on the server but reports the first move as a
/// network failure, like a response lost after the server committed.
struct LostFirstResponse {
    inner: ApiClient,
    lost: AtomicBool,
}

#[async_trait]
impl ReassignApi for LostFirstResponse {
    async fn list_persons(&self) -> Result<Vec<PersonSummary>, ApiError> {
        Ok(self.inner.list_persons().await?.persons)
    }

    async fn move_face(
        &self,
        face_id: &str,
        target_person_id: &str,
        expected_person_id: Option<&str>,
    ) -> Result<MoveFaceResponse, ApiError> {
        let moved = self
            .inner
            .move_face(face_id, target_person_id, expected_person_id)
            .await?;
        if !self.lost.swap(true, Ordering::SeqCst) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        Ok(moved)
    }

    async fn move_face_to_new(
        &self,
        face_id: &str,
        custom_name: Option<&str>,
        expected_person_id: Option<&str>,
    ) -> Result<MoveToNewResponse, ApiError> {
        self.inner
            .move_face_to_new(face_id, custom_name, expected_person_id)
            .await
    }

    async fn delete_face(&self, face_id: &str) -> Result<DeleteFaceResponse, ApiError> {
        self.inner.delete_face(face_id).await
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_version() {
    let base_url = start_server().await;
    let body: Value = reqwest::get(format!("{}/health", base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_face_returns_error_body() {
    let base_url = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{}/faces/nope/move", base_url))
        .json(&json!({"target_person_id": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "not_found");
    assert!(body["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let base_url = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{}/faces/f1/move", base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn test_move_to_new_without_body_uses_placeholder() {
    let base_url = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{}/faces/f1/move-to-new", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["from_person"], "Alice");
    assert!(body["new_person_name"]
        .as_str()
        .unwrap()
        .starts_with("Unknown "));
    assert!(body.get("deleted_empty_person").is_none());
}

#[tokio::test]
async fn test_move_last_face_reports_deleted_person() {
    let base_url = start_server().await;
    let client = api(&base_url);
    let alice = person_id(&client, "Alice").await;

    let moved = client.move_face("f3", &alice, None).await.unwrap();
    assert_eq!(moved.from_person, "Bob");
    assert_eq!(moved.to_person, "Alice");
    assert_eq!(moved.target_person_id, alice);
    assert_eq!(moved.deleted_empty_person.as_deref(), Some("Bob"));

    let listed = client.list_persons().await.unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.persons[0].total_faces, 3);
}

#[tokio::test]
async fn test_client_maps_conflict() {
    let base_url = start_server().await;
    let client = api(&base_url);
    let alice = person_id(&client, "Alice").await;
    let bob = person_id(&client, "Bob").await;

    let err = client.move_face("f1", &bob, Some(&bob)).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict { .. }));
    assert_eq!(
        err.server_message(),
        Some("face f1 now belongs to \"Alice\", not \"Bob\"")
    );

    let moved = client.move_face("f1", &bob, Some(&alice)).await.unwrap();
    assert!(moved.deleted_empty_person.is_none());
}

#[tokio::test]
async fn test_client_maps_validation_and_not_found() {
    let base_url = start_server().await;
    let client = api(&base_url);

    let err = client.rename_person("nobody", "Zed").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));

    let alice = person_id(&client, "Alice").await;
    let err = client.rename_person(&alice, "   ").await.unwrap_err();
    assert!(matches!(err, ApiError::Validation { .. }));

    let renamed = client.rename_person(&alice, "Alicia").await.unwrap();
    assert_eq!(renamed.old_name, "Alice");
    assert_eq!(renamed.new_name, "Alicia");
}

#[tokio::test]
async fn test_client_reports_transport_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = api(&format!("http://{}", addr));
    let err = client.list_persons().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}

#[tokio::test]
async fn test_delete_image_and_stats() {
    let base_url = start_server().await;
    let client = api(&base_url);

    let removed = client.delete_image("img2").await.unwrap();
    assert_eq!(removed.deleted_faces_count, 1);
    assert_eq!(removed.deleted_persons, vec!["Bob".to_string()]);

    let image = client.get_image("img1").await.unwrap().image;
    assert_eq!(image.total_faces, 2);
    assert_eq!(image.faces[0].person.person_name, "Alice");

    let stats = client.stats().await.unwrap().data;
    assert_eq!(stats.total_persons, 1);
    assert_eq!(stats.total_images, 2);
    assert_eq!(stats.total_faces, 2);
    assert_eq!(stats.gallery_stats.face_coverage, 50.0);

    client.reset().await.unwrap();
    assert_eq!(client.list_persons().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_controller_moves_and_navigates() {
    let base_url = start_server().await;
    let client = api(&base_url);
    let alice = person_id(&client, "Alice").await;
    let bob = person_id(&client, "Bob").await;

    let mut controller = MoveController::new(Arc::new(client.clone()), View::Person(bob.clone()));
    let opened = controller.begin_move("f3", Some(&bob)).await.unwrap();
    assert!(opened.is_empty());

    let candidates: Vec<_> = controller
        .candidates("ali")
        .iter()
        .map(|p| p.person_id.clone())
        .collect();
    assert_eq!(candidates, vec![alice.clone()]);

    let effects = controller
        .confirm(Destination::Existing {
            person_id: alice.clone(),
        })
        .await
        .unwrap();
    assert_eq!(
        effects,
        vec![
            Effect::CloseDialog,
            Effect::Notify(Notice::FaceMoved {
                to_person: "Alice".to_string(),
                deleted_empty_person: Some("Bob".to_string()),
            }),
            Effect::Navigate(View::Person(alice.clone())),
        ]
    );
    assert!(matches!(
        client.get_person(&bob).await.unwrap_err(),
        ApiError::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_controller_stale_move_refetches() {
    let base_url = start_server().await;
    let client = api(&base_url);
    let alice = person_id(&client, "Alice").await;
    let bob = person_id(&client, "Bob").await;

    let mut controller =
        MoveController::new(Arc::new(client.clone()), View::Person(alice.clone()));
    controller.begin_move("f1", Some(&alice)).await.unwrap();

    // Another operator moves f1 away while the dialog is open.
    client.move_face_to_new("f1", Some("Carol"), None).await.unwrap();

    let effects = controller
        .confirm(Destination::Existing { person_id: bob })
        .await
        .unwrap();
    assert!(matches!(&effects[0], Effect::Notify(n) if n.is_error()));
    assert_eq!(effects[1], Effect::Refetch(View::Person(alice)));
}

#[tokio::test]
async fn test_controller_delete_last_face_goes_to_list() {
    let base_url = start_server().await;
    let client = api(&base_url);
    let bob = person_id(&client, "Bob").await;

    let mut controller = MoveController::new(Arc::new(client.clone()), View::Person(bob));
    let effects = controller.delete_face("f3").await.unwrap();
    assert_eq!(
        effects,
        vec![
            Effect::Notify(Notice::FaceDeleted {
                deleted_empty_person: Some("Bob".to_string()),
            }),
            Effect::Navigate(View::PersonList),
        ]
    );
    assert_eq!(controller.view(), &View::PersonList);
}

#[tokio::test]
async fn test_client_treats_error_status_in_ok_body_as_failure() {
    use axum::{routing::get, Json, Router};

    let app = Router::new().route(
        "/persons",
        get(|| async { Json(json!({"status": "error", "message": "index rebuilding"})) }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = api(&format!("http://{}", addr));
    let err = client.list_persons().await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Server {
            status: 200,
            message: Some("index rebuilding".to_string()),
        }
    );
}

#[tokio::test]
async fn test_list_images_and_gallery() {
    let base_url = start_server().await;
    let client = api(&base_url);

    let listed = client.list_images().await.unwrap();
    assert_eq!(listed.total_images, 3);
    assert_eq!(listed.images_with_faces, 2);
    assert_eq!(listed.images_without_faces, 1);
    assert_eq!(listed.images[0].image_id, "img1");
    assert_eq!(listed.images[0].persons_count, 1);
    assert_eq!(listed.images[0].persons[0].person_name, "Alice");
    assert!(!listed.images[2].has_faces);

    let gallery = client.gallery().await.unwrap();
    assert_eq!(gallery.total_persons, 2);
    assert_eq!(gallery.gallery[0].person_name, "Alice");
    let faces: Vec<_> = gallery.gallery[0]
        .faces
        .iter()
        .map(|f| f.face_id.as_str())
        .collect();
    assert_eq!(faces, vec!["f1", "f2"]);
    assert_eq!(gallery.gallery[1].faces[0].filename, "party.jpg");

    let raw: Value = reqwest::get(format!("{}/gallery", base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(raw["status"], "success");
    assert_eq!(raw["gallery"][1]["total_faces"], 1);
}

#[tokio::test]
async fn test_controller_retry_after_lost_response_lands() {
    let base_url = start_server().await;
    let client = api(&base_url);
    let alice = person_id(&client, "Alice").await;
    let bob = person_id(&client, "Bob").await;

    let lossy = Arc::new(LostFirstResponse {
        inner: client.clone(),
        lost: AtomicBool::new(false),
    });
    let mut controller = MoveController::new(lossy, View::Person(alice.clone()));
    controller.begin_move("f1", Some(&alice)).await.unwrap();

    let effects = controller
        .confirm(Destination::Existing {
            person_id: bob.clone(),
        })
        .await
        .unwrap();
    assert!(matches!(&effects[..], [Effect::Notify(n)] if n.is_error()));
    assert!(matches!(controller.state(), MoveState::Selecting { .. }));

    // The server already applied the move; retrying must not conflict.
    let effects = controller
        .confirm(Destination::Existing {
            person_id: bob.clone(),
        })
        .await
        .unwrap();
    assert_eq!(effects.last(), Some(&Effect::Navigate(View::Person(bob.clone()))));

    let image = client.get_image("img1").await.unwrap().image;
    let f1 = image.faces.iter().find(|f| f.face_id == "f1").unwrap();
    assert_eq!(f1.person.person_id, bob);
}

#[tokio::test]
async fn test_move_to_new_proceeds_when_person_list_fails() {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, put};
    use axum::{Json, Router};

    let requested: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = requested.clone();
    let app = Router::new()
        .route(
            "/persons",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"status": "error", "message": "database is locked", "code": "internal"})),
                )
            }),
        )
        .route(
            "/faces/{id}/move-to-new",
            put(move |Path(id): Path<String>, Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    let name = body["custom_name"].clone();
                    seen.lock().unwrap().push(body);
                    Json(json!({
                        "status": "success",
                        "message": "moved",
                        "face_id": id,
                        "from_person": "Alice",
                        "new_person_id": "p-new",
                        "new_person_name": name,
                    }))
                }
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = api(&format!("http://{}", addr));
    commands::run_move(&client, "f1", Some("p-alice"), None, Some("Dave"))
        .await
        .unwrap();

    let requested = requested.lock().unwrap();
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0]["custom_name"], "Dave");
    assert_eq!(requested[0]["expected_person_id"], "p-alice");
}

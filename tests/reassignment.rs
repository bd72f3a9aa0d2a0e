use facesort::config::{ClientConfig, Config, DbConfig, NamingConfig, ServerConfig};
use facesort::error::{Entity, StoreError};
use facesort::models::{ImportBatch, PersonSummary};
use facesort::reassign::Reassigner;
use facesort::store::memory::InMemoryStore;
use facesort::store::sqlite::SqliteStore;
use facesort::store::FaceStore;
use facesort::{db, migrate};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: tmp.path().join("data").join("facesort.sqlite"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        client: ClientConfig::default(),
        naming: NamingConfig::default(),
    }
}

fn memory_store() -> Arc<dyn FaceStore> {
    Arc::new(InMemoryStore::new())
}

async fn sqlite_store(tmp: &TempDir) -> Arc<dyn FaceStore> {
    let cfg = test_config(tmp);
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    Arc::new(SqliteStore::new(pool, &cfg.naming.placeholder_prefix))
}

/// Alice owns f1 and f2, Bob owns f3, Carol owns f4, f5 belongs to an
/// unnamed person. img3 has no faces.
fn gallery() -> ImportBatch {
    serde_json::from_value(json!({
        "images": [
            {"image_id": "img1", "filename": "beach.jpg", "faces": [
                {"face_id": "f1", "cluster": "c1", "location": {"top": 0, "right": 10, "bottom": 10, "left": 0}, "cropped_face_filename": "f1.jpg"},
                {"face_id": "f2", "cluster": "c1", "location": {"top": 0, "right": 30, "bottom": 10, "left": 20}},
                {"face_id": "f3", "cluster": "c2", "location": {"top": 0, "right": 50, "bottom": 10, "left": 40}}
            ]},
            {"image_id": "img2", "filename": "party.jpg", "faces": [
                {"face_id": "f4", "cluster": "c3", "location": {"top": 5, "right": 15, "bottom": 15, "left": 5}},
                {"face_id": "f5", "location": {"top": 5, "right": 35, "bottom": 15, "left": 25}}
            ]},
            {"image_id": "img3", "filename": "landscape.png", "mime_type": "image/png", "faces": []}
        ],
        "clusters": {"c1": "Alice", "c2": "Bob", "c3": "Carol"}
    }))
    .unwrap()
}

async fn seeded(store: Arc<dyn FaceStore>) -> Reassigner {
    store.import_batch(&gallery()).await.unwrap();
    Reassigner::new(store)
}

async fn persons(service: &Reassigner) -> Vec<PersonSummary> {
    service.store().list_persons().await.unwrap()
}

async fn person_id(service: &Reassigner, name: &str) -> String {
    persons(service)
        .await
        .into_iter()
        .find(|p| p.person_name == name)
        .unwrap_or_else(|| panic!("no person named {}", name))
        .person_id
}

async fn owner_of(service: &Reassigner, image_id: &str, face_id: &str) -> String {
    let image = service.store().get_image(image_id).await.unwrap().unwrap();
    image
        .faces
        .into_iter()
        .find(|f| f.face_id == face_id)
        .unwrap()
        .person
        .person_id
}

/// No person in the store may have zero faces.
async fn assert_no_empty_persons(service: &Reassigner) {
    for p in persons(service).await {
        assert!(p.total_faces > 0, "person {} has no faces", p.person_name);
    }
}

macro_rules! on_both_stores {
    ($($scenario:ident),* $(,)?) => {
        $(
            mod $scenario {
                #[tokio::test]
                async fn memory() {
                    super::$scenario(super::memory_store()).await;
                }

                #[tokio::test]
                async fn sqlite() {
                    let tmp = tempfile::TempDir::new().unwrap();
                    super::$scenario(super::sqlite_store(&tmp).await).await;
                }
            }
        )*
    };
}

on_both_stores!(
    move_keeps_nonempty_source,
    move_last_face_deletes_source,
    move_to_new_with_custom_name,
    move_to_new_generates_unique_placeholder,
    delete_face_cleans_up_empty_person,
    move_to_current_owner_is_noop,
    unknown_ids_are_not_found,
    stale_expected_owner_conflicts,
    delete_image_removes_faces_and_empty_persons,
    concurrent_moves_of_one_face_serialize,
    invalid_import_commits_nothing,
    rename_changes_name_not_membership,
    counts_track_manual_assignments,
    retried_move_after_success_is_noop,
    image_list_reports_faces_and_owners,
    gallery_groups_faces_by_person,
    detail_views_stay_consistent_during_moves,
);

// ─── Scenarios ──────────────────────────────────────────────────────

async fn move_keeps_nonempty_source(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let alice = person_id(&service, "Alice").await;
    let bob = person_id(&service, "Bob").await;

    let moved = service.move_to_existing("f1", &bob, None).await.unwrap();
    assert_eq!(moved.from.name, "Alice");
    assert_eq!(moved.to.name, "Bob");
    assert!(moved.deleted_empty_person.is_none());

    let alice_detail = service.store().get_person(&alice).await.unwrap().unwrap();
    assert_eq!(alice_detail.total_faces, 1);
    let bob_detail = service.store().get_person(&bob).await.unwrap().unwrap();
    assert_eq!(bob_detail.total_faces, 2);
    assert_eq!(owner_of(&service, "img1", "f1").await, bob);
}

async fn move_last_face_deletes_source(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let bob = person_id(&service, "Bob").await;
    let carol = person_id(&service, "Carol").await;

    let moved = service.move_to_existing("f4", &bob, None).await.unwrap();
    let deleted = moved.deleted_empty_person.unwrap();
    assert_eq!(deleted.id, carol);
    assert_eq!(deleted.name, "Carol");

    assert!(service.store().get_person(&carol).await.unwrap().is_none());
    assert_no_empty_persons(&service).await;
}

async fn move_to_new_with_custom_name(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let before = persons(&service).await.len();

    let moved = service
        .move_to_new("f2", Some("  Dave  "), None)
        .await
        .unwrap();
    assert_eq!(moved.from.name, "Alice");
    assert_eq!(moved.to.name, "Dave");
    assert!(moved.deleted_empty_person.is_none());

    let dave = service.store().get_person(&moved.to.id).await.unwrap().unwrap();
    assert_eq!(dave.total_faces, 1);
    assert_eq!(dave.faces[0].face_id, "f2");
    assert_eq!(persons(&service).await.len(), before + 1);
}

async fn move_to_new_generates_unique_placeholder(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;

    let mut names = HashSet::new();
    for face in ["f1", "f2", "f3"] {
        let moved = service.move_to_new(face, Some("   "), None).await.unwrap();
        let suffix = moved.to.name.strip_prefix("Unknown ").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(names.insert(moved.to.name));
    }

    // Alice and Bob lost all their faces along the way.
    let listed = persons(&service).await;
    assert!(listed.iter().all(|p| p.person_name != "Alice"));
    assert!(listed.iter().all(|p| p.person_name != "Bob"));
    let all_names: HashSet<_> = listed.iter().map(|p| p.person_name.clone()).collect();
    assert_eq!(all_names.len(), listed.len());
    assert_no_empty_persons(&service).await;
}

async fn delete_face_cleans_up_empty_person(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let alice = person_id(&service, "Alice").await;
    let bob = person_id(&service, "Bob").await;

    let removed = service.delete_face("f1").await.unwrap();
    assert_eq!(removed.from.id, alice);
    assert!(removed.deleted_empty_person.is_none());

    let removed = service.delete_face("f3").await.unwrap();
    assert_eq!(removed.deleted_empty_person.unwrap().id, bob);
    assert!(service.store().get_person(&bob).await.unwrap().is_none());

    let image = service.store().get_image("img1").await.unwrap().unwrap();
    assert_eq!(image.total_faces, 1);
    assert_no_empty_persons(&service).await;
}

async fn move_to_current_owner_is_noop(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let carol = person_id(&service, "Carol").await;
    let before = persons(&service).await;

    let moved = service
        .move_to_existing("f4", &carol, Some(&carol))
        .await
        .unwrap();
    assert!(moved.is_noop());
    assert_eq!(moved.from, moved.to);
    assert!(moved.deleted_empty_person.is_none());
    assert_eq!(persons(&service).await, before);

    let counts = service.store().counts().await.unwrap();
    assert_eq!(counts.manual_face_assignments, 0);
}

async fn unknown_ids_are_not_found(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let alice = person_id(&service, "Alice").await;
    let before = persons(&service).await;

    let err = service.move_to_existing("nope", &alice, None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: Entity::Face, .. }));

    let err = service.move_to_existing("f3", "nobody", None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: Entity::Person, .. }));

    let err = service.move_to_new("nope", None, None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: Entity::Face, .. }));

    let err = service.delete_face("nope").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    let err = service.delete_image("nope").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: Entity::Image, .. }));

    let err = service.move_to_existing("", &alice, None).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    assert_eq!(persons(&service).await, before);
}

async fn stale_expected_owner_conflicts(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let alice = person_id(&service, "Alice").await;
    let bob = person_id(&service, "Bob").await;
    let carol = person_id(&service, "Carol").await;

    // Someone else moved f1 first.
    service.move_to_existing("f1", &carol, Some(&alice)).await.unwrap();

    let err = service
        .move_to_existing("f1", &bob, Some(&alice))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert_eq!(err.code(), "conflict");
    assert_eq!(
        err.to_string(),
        "face f1 now belongs to \"Carol\", not \"Alice\""
    );

    let err = service
        .move_to_new("f1", Some("Eve"), Some(&alice))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    assert_eq!(owner_of(&service, "img1", "f1").await, carol);
    assert!(persons(&service).await.iter().all(|p| p.person_name != "Eve"));
}

async fn delete_image_removes_faces_and_empty_persons(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let alice = person_id(&service, "Alice").await;

    let removed = service.delete_image("img1").await.unwrap();
    assert_eq!(removed.deleted_faces_count, 3);
    let mut gone: Vec<_> = removed.deleted_persons.iter().map(|p| p.name.clone()).collect();
    gone.sort();
    assert_eq!(gone, vec!["Alice", "Bob"]);

    assert!(service.store().get_person(&alice).await.unwrap().is_none());
    assert!(service.store().get_image("img1").await.unwrap().is_none());

    let removed = service.delete_image("img3").await.unwrap();
    assert_eq!(removed.deleted_faces_count, 0);
    assert!(removed.deleted_persons.is_empty());

    let counts = service.store().counts().await.unwrap();
    assert_eq!(counts.total_images, 1);
    assert_eq!(counts.total_faces, 2);
    assert_no_empty_persons(&service).await;
}

async fn concurrent_moves_of_one_face_serialize(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let bob = person_id(&service, "Bob").await;

    let a = {
        let service = service.clone();
        let bob = bob.clone();
        tokio::spawn(async move { service.move_to_existing("f4", &bob, None).await })
    };
    let b = {
        let service = service.clone();
        let bob = bob.clone();
        tokio::spawn(async move { service.move_to_existing("f4", &bob, None).await })
    };
    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();

    // Exactly one of them did the move and removed Carol.
    let deletions = [&first, &second]
        .iter()
        .filter(|m| m.deleted_empty_person.is_some())
        .count();
    assert_eq!(deletions, 1);
    assert!(first.is_noop() ^ second.is_noop());
    assert_eq!(owner_of(&service, "img2", "f4").await, bob);
    assert_no_empty_persons(&service).await;
}

async fn invalid_import_commits_nothing(store: Arc<dyn FaceStore>) {
    let batch: ImportBatch = serde_json::from_value(json!({
        "images": [
            {"filename": "ok.jpg", "faces": [
                {"location": {"top": 0, "right": 10, "bottom": 10, "left": 0}}
            ]},
            {"filename": "bad.jpg", "faces": [
                {"location": {"top": 20, "right": 10, "bottom": 10, "left": 0}}
            ]}
        ]
    }))
    .unwrap();

    let err = store.import_batch(&batch).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.total_images, 0);
    assert_eq!(counts.total_persons, 0);
}

async fn rename_changes_name_not_membership(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let alice = person_id(&service, "Alice").await;

    let renamed = service.rename_person(&alice, "  Alicia ").await.unwrap();
    assert_eq!(renamed.old_name, "Alice");
    assert_eq!(renamed.new_name, "Alicia");

    let detail = service.store().get_person(&alice).await.unwrap().unwrap();
    assert_eq!(detail.person_name, "Alicia");
    assert_eq!(detail.total_faces, 2);

    let err = service.rename_person(&alice, "   ").await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

async fn counts_track_manual_assignments(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let bob = person_id(&service, "Bob").await;

    let counts = service.store().counts().await.unwrap();
    assert_eq!(counts.total_persons, 4);
    assert_eq!(counts.total_images, 3);
    assert_eq!(counts.total_faces, 5);
    assert_eq!(counts.images_with_faces, 2);

    service.move_to_existing("f1", &bob, None).await.unwrap();
    service.move_to_new("f2", None, None).await.unwrap();

    let counts = service.store().counts().await.unwrap();
    assert_eq!(counts.manual_face_assignments, 2);
    assert_eq!(counts.total_persons, 4);

    service.store().reset().await.unwrap();
    let counts = service.store().counts().await.unwrap();
    assert_eq!(counts.total_faces, 0);
    assert!(persons(&service).await.is_empty());
}

async fn retried_move_after_success_is_noop(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let alice = person_id(&service, "Alice").await;
    let bob = person_id(&service, "Bob").await;
    let carol = person_id(&service, "Carol").await;

    let first = service.move_to_existing("f1", &bob, Some(&alice)).await.unwrap();
    assert!(!first.is_noop());

    // Same request again, as sent when the first response never arrived.
    let retried = service.move_to_existing("f1", &bob, Some(&alice)).await.unwrap();
    assert!(retried.is_noop());
    assert_eq!(retried.to.name, "Bob");
    assert!(retried.deleted_empty_person.is_none());
    assert_eq!(owner_of(&service, "img1", "f1").await, bob);

    // A different target still trips over the stale owner.
    let err = service
        .move_to_existing("f1", &carol, Some(&alice))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert_eq!(owner_of(&service, "img1", "f1").await, bob);
}

async fn image_list_reports_faces_and_owners(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;
    let bob = person_id(&service, "Bob").await;

    let images = service.store().list_images().await.unwrap();
    let ids: Vec<_> = images.iter().map(|i| i.image_id.as_str()).collect();
    assert_eq!(ids, vec!["img1", "img2", "img3"]);

    let beach = &images[0];
    assert_eq!(beach.faces_count, 3);
    assert_eq!(beach.persons_count, 2);
    let names: HashSet<_> = beach.persons.iter().map(|p| p.person_name.as_str()).collect();
    assert_eq!(names, HashSet::from(["Alice", "Bob"]));
    assert!(beach.has_faces);

    let landscape = &images[2];
    assert_eq!(landscape.mime_type, "image/png");
    assert_eq!(landscape.faces_count, 0);
    assert!(landscape.persons.is_empty());
    assert!(!landscape.has_faces);

    // Owners follow reassignment.
    service.move_to_existing("f4", &bob, None).await.unwrap();
    let images = service.store().list_images().await.unwrap();
    let party = images.iter().find(|i| i.image_id == "img2").unwrap();
    assert_eq!(party.faces_count, 2);
    assert!(party.persons.iter().any(|p| p.person_id == bob));
    assert!(party.persons.iter().all(|p| p.person_name != "Carol"));
}

async fn gallery_groups_faces_by_person(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;

    let gallery = service.store().gallery().await.unwrap();
    let listed = persons(&service).await;
    let gallery_ids: Vec<_> = gallery.iter().map(|p| p.person_id.clone()).collect();
    let listed_ids: Vec<_> = listed.iter().map(|p| p.person_id.clone()).collect();
    assert_eq!(gallery_ids, listed_ids);

    let alice = &gallery[0];
    assert_eq!(alice.person_name, "Alice");
    assert_eq!(alice.total_faces, 2);
    let faces: Vec<_> = alice.faces.iter().map(|f| f.face_id.as_str()).collect();
    assert_eq!(faces, vec!["f1", "f2"]);
    assert_eq!(alice.faces[0].filename, "beach.jpg");
    assert_eq!(alice.faces[0].cropped_face_filename.as_deref(), Some("f1.jpg"));

    let total: i64 = gallery.iter().map(|p| p.total_faces).sum();
    assert_eq!(total, service.store().counts().await.unwrap().total_faces);
    assert!(gallery.iter().all(|p| p.total_faces as usize == p.faces.len()));
}

async fn detail_views_stay_consistent_during_moves(store: Arc<dyn FaceStore>) {
    let service = seeded(store).await;

    // Keeps creating a new person for f4 and so deleting the previous one.
    let writer = {
        let service = service.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                let name = format!("Carol {}", i);
                service.move_to_new("f4", Some(name.as_str()), None).await.unwrap();
            }
        })
    };

    for _ in 0..20 {
        for p in service.store().list_persons().await.unwrap() {
            if let Some(detail) = service.store().get_person(&p.person_id).await.unwrap() {
                assert!(!detail.faces.is_empty(), "{} read without faces", detail.person_name);
                assert_eq!(detail.total_faces as usize, detail.faces.len());
                assert_eq!(detail.total_images as usize, detail.images.len());
                assert!(!detail.images.is_empty());
            }
        }
        let party = service.store().get_image("img2").await.unwrap().unwrap();
        assert_eq!(party.total_faces, 2);
        assert_eq!(party.faces.len(), 2);
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
    assert_no_empty_persons(&service).await;
    assert_eq!(owner_of(&service, "img2", "f4").await, person_id(&service, "Carol 19").await);
}

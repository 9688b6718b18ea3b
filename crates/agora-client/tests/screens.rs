//! Screens driven against the SQLite-backed local backend.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;

use agora_client::screens::hub::Attachment;
use agora_client::{
    AppContext, ChatRoom, ClientConfig, Gallery, Notices, Screen, StudentHub, SyncError,
    VideoWall,
};
use agora_shared::constants::*;
use agora_shared::models::MaterialKind;
use agora_shared::{BackendError, CollectionStore, ValidationError};
use agora_store::{Database, LocalBackend, LocalBackendConfig};

async fn setup() -> (tempfile::TempDir, Arc<LocalBackend>, AppContext) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("agora.db")).unwrap();
    let backend = Arc::new(
        LocalBackend::open(db, LocalBackendConfig::new(dir.path().join("objects")))
            .await
            .unwrap(),
    );
    let config = ClientConfig {
        data_dir: dir.path().to_path_buf(),
        ..ClientConfig::default()
    };
    let ctx = AppContext::new(backend.clone(), Notices::discard(), config);
    (dir, backend, ctx)
}

#[tokio::test]
async fn chat_messages_stream_into_the_open_room() {
    let (_dir, backend, ctx) = setup().await;
    let mut chat = ChatRoom::new(ctx);
    assert!(matches!(chat.open().await, Err(SyncError::Unauthenticated)));

    backend.sign_in_or_register("ravi@example.org").unwrap();
    chat.open().await.unwrap();
    assert!(chat.messages().is_empty());

    chat.send("  namaste  ").await.unwrap();
    chat.send("second").await.unwrap();
    assert_eq!(chat.poll(), 2);

    let contents: Vec<_> = chat.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["namaste", "second"]);
    assert!(chat.messages().iter().all(|m| chat.is_mine(m)));
}

#[tokio::test]
async fn gallery_upload_stores_object_and_record() {
    let (_dir, backend, ctx) = setup().await;
    let user = backend.sign_in_or_register("meera@example.org").unwrap();
    let mut gallery = Gallery::new(ctx);
    gallery.open().await.unwrap();

    let post = gallery
        .post_image("fest.jpg", Bytes::from_static(b"jpeg bytes"), Some("Annual fest".into()))
        .await
        .unwrap();

    let prefix = format!(
        "http://localhost:54321/{PUBLIC_OBJECT_PATH}/{BUCKET_POSTS}/{}/",
        user.id
    );
    assert!(post.image_url.starts_with(&prefix), "{}", post.image_url);
    assert_eq!(backend.count(COLLECTION_POSTS).unwrap(), 1);
    assert_eq!(backend.list_objects(BUCKET_POSTS).unwrap().len(), 1);
    assert_eq!(gallery.posts().len(), 1);
    assert_eq!(gallery.poll(), 0);
}

#[tokio::test]
async fn backend_refuses_deleting_someone_elses_post() {
    let (_dir, backend, ctx) = setup().await;
    backend.sign_in_or_register("owner@example.org").unwrap();
    let mut owner_view = Gallery::new(ctx.clone());
    let post = owner_view
        .post_image("a.png", Bytes::from_static(b"png"), None)
        .await
        .unwrap();

    backend.sign_in_or_register("other@example.org").unwrap();

    // A view that never loaded the post cannot gate locally.
    let mut other_view = Gallery::new(ctx);
    let err = other_view.delete_post(post.id).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(BackendError::Forbidden(_))));

    // A loaded view stops before calling the backend.
    let err = owner_view.delete_post(post.id).await.unwrap_err();
    assert!(matches!(err, SyncError::NotPermitted(_)));
    assert_eq!(backend.count(COLLECTION_POSTS).unwrap(), 1);
}

#[tokio::test]
async fn oversized_video_is_rejected_before_upload() {
    let (dir, backend, _) = setup().await;
    backend.sign_in_or_register("vid@example.org").unwrap();
    let config = ClientConfig {
        data_dir: dir.path().to_path_buf(),
        max_upload_size: 4,
        ..ClientConfig::default()
    };
    let mut wall = VideoWall::new(AppContext::new(backend.clone(), Notices::discard(), config));

    let err = wall
        .upload_video("big.mp4", Bytes::from_static(b"too big"), "Big one")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Validation(ValidationError::FileTooLarge { size: 7, max: 4 })
    ));
    assert!(backend.list_objects(BUCKET_VIDEOS).unwrap().is_empty());
}

#[tokio::test]
async fn hub_doubt_lifecycle() {
    let (_dir, backend, ctx) = setup().await;
    let asker = backend.sign_in_or_register("asker@example.org").unwrap();
    let mut hub = StudentHub::new(ctx);
    hub.open().await.unwrap();

    let doubt = hub
        .ask("Integration by parts", "Which term is u?", Some("Mathematics"))
        .await
        .unwrap();
    hub.toggle_doubt(doubt.id).await.unwrap();

    backend.sign_in_or_register("helper@example.org").unwrap();
    let answer = hub.answer(doubt.id, "Use LIATE").await.unwrap();
    assert!(matches!(
        hub.accept_answer(doubt.id, answer.id).await,
        Err(SyncError::NotPermitted(_))
    ));

    backend.sign_in(&asker.email).unwrap();
    hub.accept_answer(doubt.id, answer.id).await.unwrap();
    assert!(hub.answers(doubt.id).unwrap()[0].is_accepted);

    hub.mark_resolved(doubt.id).await.unwrap();
    assert!(hub.doubts()[0].is_resolved);

    // Resolution cannot be undone, even bypassing the screen.
    let err = backend
        .update(COLLECTION_DOUBTS, doubt.id, json!({ "is_resolved": false }))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Constraint(_)));

    hub.delete_doubt(doubt.id).await.unwrap();
    assert_eq!(backend.count(COLLECTION_DOUBTS).unwrap(), 0);
    assert_eq!(backend.count(COLLECTION_DOUBT_ANSWERS).unwrap(), 0);
}

#[tokio::test]
async fn shared_material_file_lands_in_the_users_namespace() {
    let (_dir, backend, ctx) = setup().await;
    let user = backend.sign_in_or_register("notes@example.org").unwrap();
    let mut hub = StudentHub::new(ctx);
    hub.open().await.unwrap();

    let material = hub
        .share_material(
            "Organic reactions",
            Some("Chapter 12"),
            "Chemistry",
            MaterialKind::Notes,
            Some(Attachment {
                file_name: "organic.pdf".into(),
                data: Bytes::from_static(b"%PDF-1.7"),
            }),
        )
        .await
        .unwrap();

    let objects = backend.list_objects(BUCKET_STUDY_MATERIALS).unwrap();
    assert_eq!(objects.len(), 1);
    assert!(objects[0].key.starts_with(&user.id.namespace()));
    assert!(material.file_url.unwrap().ends_with(&objects[0].key));
    assert_eq!(hub.stats().materials, 1);
    assert_eq!(hub.stats().contributors, 1);
}

#[tokio::test]
async fn closing_screens_releases_every_subscription() {
    let (_dir, backend, ctx) = setup().await;
    backend.sign_in_or_register("x@example.org").unwrap();

    let mut chat = ChatRoom::new(ctx.clone());
    let mut hub = StudentHub::new(ctx.clone());
    chat.open().await.unwrap();
    hub.open().await.unwrap();
    let doubt = hub.ask("Q", "details", None).await.unwrap();
    hub.toggle_doubt(doubt.id).await.unwrap();
    assert_eq!(backend.active_subscriptions(), 4);

    hub.close();
    assert_eq!(backend.active_subscriptions(), 1);

    drop(chat);
    assert_eq!(backend.active_subscriptions(), 0);
}

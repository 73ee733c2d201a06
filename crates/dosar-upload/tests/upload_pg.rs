//! Upload lifecycle against a live PostgreSQL instance.
//!
//! Run with `DOSAR_TEST_DATABASE_URL=postgres://… cargo test -- --ignored`.

use uuid::Uuid;

use dosar_blob::BlobStore;
use dosar_store::Store;
use dosar_types::UploadStatus;
use dosar_upload::{UploadCoordinator, UploadError};

async fn setup() -> Option<(tempfile::TempDir, UploadCoordinator, Store)> {
    let url = std::env::var("DOSAR_TEST_DATABASE_URL").ok()?;
    let store = Store::connect(&url).await.expect("connect test database");
    let dir = tempfile::tempdir().expect("tempdir");
    let blob = BlobStore::open(dir.path().join("objects"), dir.path().join("uploads"))
        .expect("open blob store");
    Some((dir, UploadCoordinator::new(store.clone(), blob), store))
}

#[tokio::test]
#[ignore = "requires DOSAR_TEST_DATABASE_URL"]
async fn chunked_upload_finalizes_into_a_source_file() {
    let Some((_dir, uploads, store)) = setup().await else { return };
    let salt = Uuid::new_v4().to_string();

    let session = uploads
        .create("transcript.txt", 16, None, Some(2))
        .await
        .unwrap();
    assert_eq!(session.status, UploadStatus::Open);

    // Out-of-order receipt; the set stays sorted.
    let receipt = uploads.put_chunk(session.id, 1, salt.as_bytes()).await.unwrap();
    assert_eq!(receipt.received_chunks, vec![1]);
    let receipt = uploads.put_chunk(session.id, 0, b"prefix:").await.unwrap();
    assert_eq!(receipt.received_chunks, vec![0, 1]);

    let source = uploads.finalize(session.id).await.unwrap();
    assert_eq!(source.name, "transcript.txt");
    assert_eq!(source.size as usize, 7 + salt.len());

    let refreshed = store.get_upload_session(session.id).await.unwrap();
    assert_eq!(refreshed.status, UploadStatus::Finalized);
    assert_eq!(refreshed.final_sha256.as_deref(), Some(source.sha256.as_str()));
}

#[tokio::test]
#[ignore = "requires DOSAR_TEST_DATABASE_URL"]
async fn repeated_finalize_returns_the_same_source_file() {
    let Some((_dir, uploads, _store)) = setup().await else { return };
    let session = uploads.create("again.txt", 4, None, None).await.unwrap();
    uploads
        .put_chunk(session.id, 0, Uuid::new_v4().as_bytes())
        .await
        .unwrap();
    let first = uploads.finalize(session.id).await.unwrap();
    let second = uploads.finalize(session.id).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.sha256, second.sha256);
}

#[tokio::test]
#[ignore = "requires DOSAR_TEST_DATABASE_URL"]
async fn same_content_dedupes_across_sessions() {
    let Some((_dir, uploads, _store)) = setup().await else { return };
    let content = Uuid::new_v4().to_string();

    let a = uploads.create("a.txt", 36, None, None).await.unwrap();
    uploads.put_chunk(a.id, 0, content.as_bytes()).await.unwrap();
    let first = uploads.finalize(a.id).await.unwrap();

    let b = uploads.create("b.txt", 36, None, None).await.unwrap();
    uploads.put_chunk(b.id, 0, content.as_bytes()).await.unwrap();
    let second = uploads.finalize(b.id).await.unwrap();

    assert_eq!(first.id, second.id, "digest hit resolves to the same row");
}

#[tokio::test]
#[ignore = "requires DOSAR_TEST_DATABASE_URL"]
async fn incomplete_sessions_refuse_to_finalize() {
    let Some((_dir, uploads, _store)) = setup().await else { return };
    let session = uploads.create("short.txt", 8, None, Some(3)).await.unwrap();
    uploads.put_chunk(session.id, 0, b"only one").await.unwrap();

    match uploads.finalize(session.id).await {
        Err(UploadError::MissingChunks { expected: 3, received: 1 }) => {}
        other => panic!("expected MissingChunks, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires DOSAR_TEST_DATABASE_URL"]
async fn finalized_sessions_reject_further_chunks() {
    let Some((_dir, uploads, _store)) = setup().await else { return };
    let session = uploads.create("done.txt", 4, None, None).await.unwrap();
    uploads
        .put_chunk(session.id, 0, Uuid::new_v4().as_bytes())
        .await
        .unwrap();
    uploads.finalize(session.id).await.unwrap();

    match uploads.put_chunk(session.id, 1, b"late").await {
        Err(UploadError::AlreadyFinalized) => {}
        other => panic!("expected AlreadyFinalized, got {other:?}"),
    }
}

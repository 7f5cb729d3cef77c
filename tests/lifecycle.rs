//! Bucket and artifact lifecycle scenarios against injected in-memory
//! collaborators.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::io::AsyncReadExt;

use artifact_store::clock::FixedClock;
use artifact_store::models::artifact::{Artifact, ArtifactState, DEFAULT_DEADLINE_MINS};
use artifact_store::models::bucket::BucketState;
use artifact_store::objectstore::memory::MemoryObjectStore;
use artifact_store::services::artifact_service::{
    AppendChunkReq, ArtifactContent, ArtifactService, CreateArtifactReq, ServiceError,
};
use artifact_store::store::memory::MemoryStore;

fn service() -> (ArtifactService, Arc<MemoryObjectStore>) {
    let objects = Arc::new(MemoryObjectStore::new());
    let clock = FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    let service = ArtifactService::new(
        Arc::new(MemoryStore::new()),
        objects.clone(),
        Arc::new(clock),
    );
    (service, objects)
}

fn body(content: &str) -> Box<std::io::Cursor<Vec<u8>>> {
    Box::new(std::io::Cursor::new(content.as_bytes().to_vec()))
}

fn chunk(offset: i64, content: &str) -> AppendChunkReq {
    AppendChunkReq {
        byte_offset: offset,
        size: content.len() as i64,
        content: content.into(),
    }
}

async fn read_content(service: &ArtifactService, artifact: &Artifact) -> Vec<u8> {
    match service.get_content(artifact).await.unwrap() {
        ArtifactContent::Stored { mut reader, size } => {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            assert_eq!(out.len() as i64, size);
            out
        }
        ArtifactContent::Chunked(bytes) => bytes.to_vec(),
    }
}

#[tokio::test]
async fn happy_put_roundtrip() {
    let (service, objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();
    let artifact = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "a.bin".into(),
                chunked: false,
                size: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(artifact.state, ArtifactState::WaitingForUpload);
    assert_eq!(artifact.deadline_mins, DEFAULT_DEADLINE_MINS);

    let updated = service
        .put_artifact(&artifact, Some("5"), body("hello"))
        .await
        .unwrap();
    assert_eq!(updated.state, ArtifactState::Uploaded);
    assert_eq!(updated.s3_url, updated.object_key());

    // The byte length delivered to the object store equals the declared
    // size.
    assert_eq!(objects.get(&updated.s3_url).unwrap(), b"hello");

    assert_eq!(read_content(&service, &updated).await, b"hello");
}

#[tokio::test]
async fn put_with_wrong_content_length_is_rejected() {
    let (service, objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();
    let artifact = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "a.bin".into(),
                size: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = service
        .put_artifact(&artifact, Some("4"), body("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = service
        .put_artifact(&artifact, None, body("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = service
        .put_artifact(&artifact, Some("five"), body("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let unchanged = service.get_artifact("B", "a.bin").await.unwrap();
    assert_eq!(unchanged.state, ArtifactState::WaitingForUpload);
    assert!(objects.is_empty());
}

#[tokio::test]
async fn failed_put_flips_artifact_to_error() {
    let (service, objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();
    let artifact = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "a.bin".into(),
                size: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    objects.fail_puts(true);
    let err = service
        .put_artifact(&artifact, Some("5"), body("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Object(_)));

    let failed = service.get_artifact("B", "a.bin").await.unwrap();
    assert_eq!(failed.state, ArtifactState::Error);

    let err = service.get_content(&failed).await.unwrap_err();
    assert!(matches!(err, ServiceError::NoContent));
}

#[tokio::test]
async fn append_then_close_merges_in_order() {
    let (service, objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();
    let artifact = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "log".into(),
                chunked: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(artifact.state, ArtifactState::Appending);
    assert_eq!(artifact.size, 0);

    service
        .append_log_chunk(&artifact, chunk(0, "abc"))
        .await
        .unwrap();
    let after_second = service
        .append_log_chunk(&artifact, chunk(3, "de"))
        .await
        .unwrap();
    assert_eq!(after_second.size, 5);

    // A live appending artifact reads back the chunks accepted so far.
    assert_eq!(read_content(&service, &after_second).await, b"abcde");

    service.close_artifact(&artifact, true).await.unwrap();

    let merged = service.get_artifact("B", "log").await.unwrap();
    assert_eq!(merged.state, ArtifactState::Uploaded);
    assert_eq!(objects.get(&merged.s3_url).unwrap(), b"abcde");
    assert_eq!(read_content(&service, &merged).await, b"abcde");
}

#[tokio::test]
async fn close_is_idempotent_on_uploaded() {
    let (service, _objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();
    let artifact = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "log".into(),
                chunked: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    service
        .append_log_chunk(&artifact, chunk(0, "z"))
        .await
        .unwrap();
    service.close_artifact(&artifact, true).await.unwrap();

    // Closing again succeeds and changes nothing.
    service.close_artifact(&artifact, true).await.unwrap();
    let merged = service.get_artifact("B", "log").await.unwrap();
    assert_eq!(merged.state, ArtifactState::Uploaded);
}

#[tokio::test]
async fn chunked_artifact_with_no_chunks_closes_without_data() {
    let (service, _objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();
    let artifact = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "log".into(),
                chunked: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    service.close_artifact(&artifact, true).await.unwrap();

    let closed = service.get_artifact("B", "log").await.unwrap();
    assert_eq!(closed.state, ArtifactState::ClosedWithoutData);
    assert!(closed.s3_url.is_empty());
}

#[tokio::test]
async fn bucket_close_cascades_to_all_artifacts() {
    let (service, objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();

    let appending = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "log".into(),
                chunked: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    service
        .append_log_chunk(&appending, chunk(0, "z"))
        .await
        .unwrap();

    service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "never-uploaded".into(),
                size: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let closed = service.close_bucket("B").await.unwrap();
    assert_eq!(closed.state, BucketState::Closed);
    assert!(closed.date_closed.is_some());

    let merged = service.get_artifact("B", "log").await.unwrap();
    assert_eq!(merged.state, ArtifactState::Uploaded);
    assert_eq!(objects.get(&merged.s3_url).unwrap(), b"z");

    let abandoned = service.get_artifact("B", "never-uploaded").await.unwrap();
    assert_eq!(abandoned.state, ArtifactState::ClosedWithoutData);

    // Closing a closed bucket is a client error.
    let err = service.close_bucket("B").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn cascade_aborts_on_first_failure_but_bucket_stays_closed() {
    let (service, objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();

    // Artifacts cascade in name order; the first one fails its merge.
    let failing = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "a-fails".into(),
                chunked: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    service
        .append_log_chunk(&failing, chunk(0, "abc"))
        .await
        .unwrap();

    let untouched = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "b-later".into(),
                chunked: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    service
        .append_log_chunk(&untouched, chunk(0, "xyz"))
        .await
        .unwrap();

    objects.fail_puts(true);
    let err = service.close_bucket("B").await.unwrap_err();
    assert!(matches!(err, ServiceError::Object(_)));

    // Partial cascade is observable: the bucket closed, the failing
    // artifact is stuck mid-flight, the later one was never reached.
    let closed = service.get_bucket("B").await.unwrap();
    assert_eq!(closed.state, BucketState::Closed);
    assert_eq!(
        service.get_artifact("B", "a-fails").await.unwrap().state,
        ArtifactState::Uploading
    );
    assert_eq!(
        service.get_artifact("B", "b-later").await.unwrap().state,
        ArtifactState::Appending
    );
}

#[tokio::test]
async fn cascade_tolerates_already_terminal_artifacts() {
    let (service, objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();

    // One artifact driven to ERROR before the bucket closes.
    let failing = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "broken".into(),
                size: 3,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    objects.fail_puts(true);
    let _ = service
        .put_artifact(&failing, Some("3"), body("abc"))
        .await
        .unwrap_err();
    objects.fail_puts(false);

    let other = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "ok".into(),
                chunked: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    service
        .append_log_chunk(&other, chunk(0, "hi"))
        .await
        .unwrap();

    service.close_bucket("B").await.unwrap();

    assert_eq!(
        service.get_artifact("B", "broken").await.unwrap().state,
        ArtifactState::Error
    );
    assert_eq!(
        service.get_artifact("B", "ok").await.unwrap().state,
        ArtifactState::Uploaded
    );

    // The direct close endpoint still rejects a terminal ERROR artifact.
    let broken = service.get_artifact("B", "broken").await.unwrap();
    let err = service.close_artifact(&broken, true).await.unwrap_err();
    assert!(matches!(err, ServiceError::IllegalState(_)));
}

#[tokio::test]
async fn creation_rules_are_enforced() {
    let (service, _objects) = service();

    let err = service.create_bucket("", "alice").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = service.create_bucket("B", "").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let bucket = service.create_bucket("B", "alice").await.unwrap();
    let err = service.create_bucket("B", "bob").await.unwrap_err();
    assert!(matches!(err, ServiceError::BucketExists(_)));

    // Missing name, missing size for a fixed upload.
    let err = service
        .create_artifact(&bucket, CreateArtifactReq::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "a.bin".into(),
                size: 0,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    // Duplicate artifact names within a bucket.
    service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "a.bin".into(),
                size: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "a.bin".into(),
                size: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ArtifactExists(_)));

    // A caller-supplied deadline is preserved; zero takes the default.
    let explicit = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "with-deadline".into(),
                chunked: true,
                deadline_mins: 7,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(explicit.deadline_mins, 7);

    // No artifacts in a closed bucket.
    let closed = service.close_bucket("B").await.unwrap();
    let err = service
        .create_artifact(
            &closed,
            CreateArtifactReq {
                name: "late".into(),
                chunked: true,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn content_is_unavailable_before_upload() {
    let (service, _objects) = service();
    let bucket = service.create_bucket("B", "alice").await.unwrap();
    let artifact = service
        .create_artifact(
            &bucket,
            CreateArtifactReq {
                name: "a.bin".into(),
                size: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = service.get_content(&artifact).await.unwrap_err();
    assert!(matches!(err, ServiceError::ContentAwaitingUpload));
}

#[tokio::test]
async fn missing_entities_are_typed_not_found() {
    let (service, _objects) = service();
    let err = service.get_bucket("missing").await.unwrap_err();
    assert!(matches!(err, ServiceError::BucketNotFound(_)));

    service.create_bucket("B", "alice").await.unwrap();
    let err = service.get_artifact("B", "missing").await.unwrap_err();
    assert!(matches!(err, ServiceError::ArtifactNotFound { .. }));
}

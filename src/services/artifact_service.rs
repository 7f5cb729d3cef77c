//! ArtifactService — bucket and artifact lifecycle over injected
//! collaborators.
//!
//! Owns the artifact state machine, the contiguous-append validation,
//! the chunk-merge pipeline and the bucket close cascade. Storage
//! concerns stay behind [`MetadataStore`] and [`ObjectStore`]; time goes
//! through [`Clock`]. Mutating operations serialize per artifact via a
//! keyed async mutex and re-read the row under the lock before checking
//! state.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::clock::Clock;
use crate::models::artifact::{Artifact, ArtifactState, DEFAULT_DEADLINE_MINS};
use crate::models::bucket::{Bucket, BucketState};
use crate::models::logchunk::LogChunk;
use crate::objectstore::{Acl, ObjectReader, ObjectStore, ObjectStoreError, BINARY_CONTENT_TYPE};
use crate::store::{MetadataStore, StoreError};

/// Capacity of the in-process pipe between the chunk producer and the
/// object-store uploader. Bounds merge memory regardless of artifact
/// size.
const MERGE_PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketExists(String),
    #[error("artifact `{name}` not found in bucket `{bucket}`")]
    ArtifactNotFound { bucket: String, name: String },
    #[error("artifact `{0}` already exists")]
    ArtifactExists(String),
    #[error("{0}")]
    Validation(String),
    #[error("unexpected artifact state: {0}")]
    IllegalState(ArtifactState),
    #[error("waiting for content to finish uploading")]
    ContentUploading,
    #[error("waiting for content to be uploaded")]
    ContentAwaitingUpload,
    #[error("artifact has no content")]
    NoContent,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Object(#[from] ObjectStoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

fn validation(msg: impl Into<String>) -> ServiceError {
    ServiceError::Validation(msg.into())
}

/// Request body for artifact creation.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CreateArtifactReq {
    pub name: String,
    pub chunked: bool,
    pub size: i64,
    pub deadline_mins: u32,
}

/// Request body for a chunk append. `content` arrives as a JSON string
/// and is stored as bytes.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AppendChunkReq {
    pub byte_offset: i64,
    pub size: i64,
    pub content: String,
}

/// Content of an artifact, shaped for the read path.
pub enum ArtifactContent {
    /// Streaming reader over the merged blob in the object store.
    Stored { reader: ObjectReader, size: i64 },
    /// Concatenation of the persisted chunks of a live or finalized
    /// append stream.
    Chunked(Bytes),
}

impl std::fmt::Debug for ArtifactContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactContent::Stored { size, .. } => {
                f.debug_struct("Stored").field("size", size).finish()
            }
            ArtifactContent::Chunked(bytes) => f.debug_tuple("Chunked").field(bytes).finish(),
        }
    }
}

#[derive(Clone)]
pub struct ArtifactService {
    store: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    write_locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl ArtifactService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            objects,
            clock,
            write_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cheap metadata-store probe for readiness checks.
    pub async fn check_store(&self) -> Result<(), StoreError> {
        self.store.list_buckets().await.map(|_| ())
    }

    // --- buckets ---

    pub async fn list_buckets(&self) -> ServiceResult<Vec<Bucket>> {
        Ok(self.store.list_buckets().await?)
    }

    pub async fn get_bucket(&self, id: &str) -> ServiceResult<Bucket> {
        self.fetch_bucket(id).await
    }

    pub async fn create_bucket(&self, id: &str, owner: &str) -> ServiceResult<Bucket> {
        if id.is_empty() {
            return Err(validation("bucket id not provided"));
        }
        if owner.is_empty() {
            return Err(validation("bucket owner not provided"));
        }

        // Not-found is the success path here: anything else means the id
        // is taken or the store is unhealthy.
        match self.store.get_bucket(id).await {
            Ok(_) => return Err(ServiceError::BucketExists(id.to_string())),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        let bucket = Bucket {
            id: id.to_string(),
            owner: owner.to_string(),
            date_created: self.clock.now(),
            date_closed: None,
            state: BucketState::Open,
        };
        self.store.insert_bucket(&bucket).await.map_err(|err| match err {
            StoreError::Duplicate(_) => ServiceError::BucketExists(id.to_string()),
            other => other.into(),
        })?;

        tracing::info!(bucket = %bucket.id, owner = %bucket.owner, "created bucket");
        Ok(bucket)
    }

    /// Close the bucket, then close every contained artifact. The first
    /// artifact error aborts the cascade; the bucket stays `CLOSED`.
    pub async fn close_bucket(&self, id: &str) -> ServiceResult<Bucket> {
        let mut bucket = self.fetch_bucket(id).await?;
        if bucket.state != BucketState::Open {
            return Err(validation("bucket is already closed"));
        }

        bucket.state = BucketState::Closed;
        bucket.date_closed = Some(self.clock.now());
        self.store.update_bucket(&bucket).await?;

        let artifacts = self.store.list_artifacts_in_bucket(&bucket.id).await?;
        for artifact in artifacts {
            self.close_artifact(&artifact, false).await?;
        }

        tracing::info!(bucket = %bucket.id, "closed bucket");
        Ok(bucket)
    }

    // --- artifacts ---

    pub async fn list_artifacts(&self, bucket_id: &str) -> ServiceResult<Vec<Artifact>> {
        Ok(self.store.list_artifacts_in_bucket(bucket_id).await?)
    }

    pub async fn get_artifact(&self, bucket_id: &str, name: &str) -> ServiceResult<Artifact> {
        self.fetch_artifact(bucket_id, name).await
    }

    pub async fn create_artifact(
        &self,
        bucket: &Bucket,
        req: CreateArtifactReq,
    ) -> ServiceResult<Artifact> {
        if req.name.is_empty() {
            return Err(validation("artifact name not provided"));
        }
        if bucket.state != BucketState::Open {
            return Err(validation("bucket is already closed"));
        }

        match self.store.get_artifact_by_name(&bucket.id, &req.name).await {
            Ok(_) => return Err(ServiceError::ArtifactExists(req.name)),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        let deadline_mins = if req.deadline_mins == 0 {
            DEFAULT_DEADLINE_MINS
        } else {
            req.deadline_mins
        };

        let (state, size) = if req.chunked {
            (ArtifactState::Appending, 0)
        } else {
            if req.size <= 0 {
                return Err(validation("cannot create a new upload artifact without size"));
            }
            (ArtifactState::WaitingForUpload, req.size)
        };

        let artifact = Artifact {
            id: 0,
            bucket_id: bucket.id.clone(),
            name: req.name.clone(),
            size,
            deadline_mins,
            date_created: self.clock.now(),
            state,
            s3_url: String::new(),
        };
        let artifact = self.store.insert_artifact(&artifact).await.map_err(|err| match err {
            StoreError::Duplicate(_) => ServiceError::ArtifactExists(req.name.clone()),
            other => other.into(),
        })?;

        tracing::info!(
            bucket = %artifact.bucket_id,
            artifact = %artifact.name,
            chunked = req.chunked,
            "created artifact"
        );
        Ok(artifact)
    }

    /// Validate and persist one chunk against the append cursor.
    /// Returns the refreshed artifact row.
    pub async fn append_log_chunk(
        &self,
        artifact: &Artifact,
        req: AppendChunkReq,
    ) -> ServiceResult<Artifact> {
        let _guard = self.lock_artifact(artifact.id).await;
        let mut artifact = self.refresh(artifact).await?;

        if artifact.state != ArtifactState::Appending {
            return Err(ServiceError::IllegalState(artifact.state));
        }
        if req.size <= 0 {
            return Err(validation(format!("invalid chunk size {}", req.size)));
        }
        if req.content.is_empty() {
            return Err(validation("empty chunk content"));
        }
        if req.content.len() as i64 != req.size {
            return Err(validation("content length does not match indicated size"));
        }

        let next_byte_offset = self.store.get_last_byte_seen_for_artifact(artifact.id).await?;
        if next_byte_offset != req.byte_offset {
            return Err(validation(format!(
                "overlapping ranges detected, expected offset: {}, actual offset: {}",
                next_byte_offset, req.byte_offset
            )));
        }

        if artifact.size < req.byte_offset + req.size {
            artifact.size = req.byte_offset + req.size;
            self.store.update_artifact(&artifact).await?;
        }

        self.store
            .insert_log_chunk(&LogChunk {
                id: 0,
                artifact_id: artifact.id,
                byte_offset: req.byte_offset,
                size: req.size,
                content: req.content.into_bytes(),
            })
            .await?;

        Ok(artifact)
    }

    /// Stream a fixed-size upload to the object store.
    ///
    /// The Content-Length header must be present and equal to the size
    /// declared at creation; those checks fail before any state change.
    /// An upload failure flips the artifact to `ERROR`.
    pub async fn put_artifact(
        &self,
        artifact: &Artifact,
        content_length: Option<&str>,
        body: ObjectReader,
    ) -> ServiceResult<Artifact> {
        let _guard = self.lock_artifact(artifact.id).await;
        let mut artifact = self.refresh(artifact).await?;

        if artifact.state != ArtifactState::WaitingForUpload {
            return Err(ServiceError::IllegalState(artifact.state));
        }

        let declared = content_length
            .ok_or_else(|| validation("Content-Length not specified"))?
            .parse::<i64>()
            .map_err(|_| validation("could not parse Content-Length as an integer"))?;
        if declared != artifact.size {
            return Err(validation(format!(
                "Content-Length {} does not match expected file size {}",
                declared, artifact.size
            )));
        }

        artifact.state = ArtifactState::Uploading;
        self.store.update_artifact(&artifact).await?;

        let key = artifact.object_key();
        match self
            .objects
            .put_reader(&key, body, artifact.size, BINARY_CONTENT_TYPE, Acl::PublicRead)
            .await
        {
            Ok(()) => {
                artifact.state = ArtifactState::Uploaded;
                artifact.s3_url = key;
                self.store.update_artifact(&artifact).await?;
                Ok(artifact)
            }
            Err(err) => {
                tracing::error!(artifact = %artifact.name, error = %err, "upload failed");
                artifact.state = ArtifactState::Error;
                if let Err(update_err) = self.store.update_artifact(&artifact).await {
                    tracing::error!(error = %update_err, "error while handling upload error");
                }
                Err(err.into())
            }
        }
    }

    /// Drive the artifact to a terminal state.
    ///
    /// `UPLOADED` and `APPEND_COMPLETE` are idempotent successes. With
    /// `fail_if_already_closed` unset (the bucket cascade), artifacts
    /// already in `CLOSED_WITHOUT_DATA` or `ERROR` are skipped instead
    /// of rejected. An in-flight `UPLOADING` artifact always rejects.
    pub async fn close_artifact(
        &self,
        artifact: &Artifact,
        fail_if_already_closed: bool,
    ) -> ServiceResult<()> {
        let _guard = self.lock_artifact(artifact.id).await;
        let mut artifact = self.refresh(artifact).await?;

        match artifact.state {
            ArtifactState::Uploaded | ArtifactState::AppendComplete => Ok(()),
            ArtifactState::Appending => {
                artifact.state = ArtifactState::AppendComplete;
                self.store.update_artifact(&artifact).await?;
                self.merge_log_chunks(&mut artifact).await
            }
            ArtifactState::WaitingForUpload => {
                artifact.state = ArtifactState::ClosedWithoutData;
                self.store.update_artifact(&artifact).await?;
                Ok(())
            }
            ArtifactState::ClosedWithoutData | ArtifactState::Error if !fail_if_already_closed => {
                Ok(())
            }
            state => Err(ServiceError::IllegalState(state)),
        }
    }

    /// Merge all persisted chunks into a single object-store blob.
    ///
    /// Chunks stream through a bounded duplex pipe: the uploader runs as
    /// a spawned consumer reporting through a pair of single-shot
    /// channels, while this task writes chunk payloads in offset order
    /// and then closes the write half. On upload failure the artifact is
    /// left in `UPLOADING` and the error surfaces to the caller.
    async fn merge_log_chunks(&self, artifact: &mut Artifact) -> ServiceResult<()> {
        if artifact.state != ArtifactState::AppendComplete {
            return Err(ServiceError::IllegalState(artifact.state));
        }

        // Nothing was ever appended; don't bother creating an object.
        if artifact.size == 0 {
            artifact.state = ArtifactState::ClosedWithoutData;
            artifact.s3_url = String::new();
            self.store.update_artifact(artifact).await?;
            return Ok(());
        }

        artifact.state = ArtifactState::Uploading;
        self.store.update_artifact(artifact).await?;

        let chunks = self.store.list_log_chunks_in_artifact(artifact.id).await?;
        let key = artifact.object_key();

        let (read_half, mut write_half) = tokio::io::duplex(MERGE_PIPE_CAPACITY);
        let (done_tx, mut done_rx) = oneshot::channel::<()>();
        let (err_tx, mut err_rx) = oneshot::channel::<ObjectStoreError>();

        let objects = Arc::clone(&self.objects);
        let upload_key = key.clone();
        let total_size = artifact.size;
        tokio::spawn(async move {
            match objects
                .put_reader(
                    &upload_key,
                    Box::new(read_half),
                    total_size,
                    BINARY_CONTENT_TYPE,
                    Acl::PublicRead,
                )
                .await
            {
                Ok(()) => {
                    let _ = done_tx.send(());
                }
                Err(err) => {
                    let _ = err_tx.send(err);
                }
            }
        });

        for chunk in &chunks {
            if write_half.write_all(&chunk.content).await.is_err() {
                // Read half closed early; the uploader publishes the
                // authoritative error below.
                break;
            }
        }
        drop(write_half);

        // Exactly one channel carries the result; the other completes
        // with a recv error when its sender is dropped.
        let upload_result = tokio::select! {
            done = &mut done_rx => match done {
                Ok(()) => Ok(()),
                Err(_) => match err_rx.await {
                    Ok(err) => Err(err),
                    Err(_) => Err(ObjectStoreError::Io(io::Error::other(
                        "merge upload finished without a result",
                    ))),
                },
            },
            err = &mut err_rx => match err {
                Ok(err) => Err(err),
                Err(_) => match done_rx.await {
                    Ok(()) => Ok(()),
                    Err(_) => Err(ObjectStoreError::Io(io::Error::other(
                        "merge upload finished without a result",
                    ))),
                },
            },
        };

        match upload_result {
            Ok(()) => {
                artifact.state = ArtifactState::Uploaded;
                artifact.s3_url = key;
                self.store.update_artifact(artifact).await?;
                tracing::info!(
                    artifact = %artifact.name,
                    key = %artifact.s3_url,
                    size = artifact.size,
                    "merged chunks"
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(artifact = %artifact.name, error = %err, "merge upload failed");
                Err(err.into())
            }
        }
    }

    /// Resolve the artifact's content according to its state.
    pub async fn get_content(&self, artifact: &Artifact) -> ServiceResult<ArtifactContent> {
        match artifact.state {
            ArtifactState::Uploaded => {
                let reader = self.objects.get_reader(&artifact.s3_url).await?;
                Ok(ArtifactContent::Stored {
                    reader,
                    size: artifact.size,
                })
            }
            ArtifactState::Appending | ArtifactState::AppendComplete => {
                let chunks = self.store.list_log_chunks_in_artifact(artifact.id).await?;
                let mut buf = BytesMut::with_capacity(artifact.size.max(0) as usize);
                for chunk in &chunks {
                    buf.extend_from_slice(&chunk.content);
                }
                Ok(ArtifactContent::Chunked(buf.freeze()))
            }
            ArtifactState::Uploading => Err(ServiceError::ContentUploading),
            ArtifactState::WaitingForUpload => Err(ServiceError::ContentAwaitingUpload),
            ArtifactState::Error | ArtifactState::ClosedWithoutData => {
                Err(ServiceError::NoContent)
            }
        }
    }

    // --- internals ---

    async fn fetch_bucket(&self, id: &str) -> ServiceResult<Bucket> {
        self.store.get_bucket(id).await.map_err(|err| {
            if err.is_not_found() {
                ServiceError::BucketNotFound(id.to_string())
            } else {
                err.into()
            }
        })
    }

    async fn fetch_artifact(&self, bucket_id: &str, name: &str) -> ServiceResult<Artifact> {
        self.store
            .get_artifact_by_name(bucket_id, name)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    ServiceError::ArtifactNotFound {
                        bucket: bucket_id.to_string(),
                        name: name.to_string(),
                    }
                } else {
                    err.into()
                }
            })
    }

    /// Re-read the artifact row; callers hold the write lock, so the
    /// returned snapshot is current for the critical section.
    async fn refresh(&self, artifact: &Artifact) -> ServiceResult<Artifact> {
        self.fetch_artifact(&artifact.bucket_id, &artifact.name).await
    }

    async fn lock_artifact(&self, artifact_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.write_locks.lock().unwrap();
            locks
                .entry(artifact_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

//! Durable metadata storage for buckets, artifacts and log chunks.
//!
//! The service talks to storage only through [`MetadataStore`], so tests
//! can inject [`memory::MemoryStore`] while production runs on
//! [`sqlite::SqliteStore`]. Errors are typed: callers rely on
//! [`StoreError::is_not_found`] as positive control flow when probing
//! for existing rows.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{artifact::Artifact, bucket::Bucket, logchunk::LogChunk};

pub mod memory;
pub mod sqlite;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Duplicate(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the core requires from the persistent store.
///
/// `list_log_chunks_in_artifact` returns chunks ordered by `byte_offset`
/// ascending. `get_last_byte_seen_for_artifact` is the append cursor:
/// the exclusive end offset of the highest-offset chunk, 0 when the
/// artifact has no chunks.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_bucket(&self, id: &str) -> StoreResult<Bucket>;
    async fn insert_bucket(&self, bucket: &Bucket) -> StoreResult<()>;
    async fn update_bucket(&self, bucket: &Bucket) -> StoreResult<()>;
    async fn list_buckets(&self) -> StoreResult<Vec<Bucket>>;

    async fn get_artifact_by_name(&self, bucket_id: &str, name: &str) -> StoreResult<Artifact>;
    /// Inserts the artifact and returns the stored row with its
    /// generated id.
    async fn insert_artifact(&self, artifact: &Artifact) -> StoreResult<Artifact>;
    async fn update_artifact(&self, artifact: &Artifact) -> StoreResult<()>;
    async fn list_artifacts_in_bucket(&self, bucket_id: &str) -> StoreResult<Vec<Artifact>>;

    async fn insert_log_chunk(&self, chunk: &LogChunk) -> StoreResult<LogChunk>;
    async fn list_log_chunks_in_artifact(&self, artifact_id: i64) -> StoreResult<Vec<LogChunk>>;
    async fn get_last_byte_seen_for_artifact(&self, artifact_id: i64) -> StoreResult<i64>;
}

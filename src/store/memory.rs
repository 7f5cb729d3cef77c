//! In-memory metadata store.
//!
//! Backs the service in tests so scenarios run without a database. Same
//! typed-error behavior as the SQLite implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{artifact::Artifact, bucket::Bucket, logchunk::LogChunk};
use crate::store::{MetadataStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    buckets: HashMap<String, Bucket>,
    artifacts: Vec<Artifact>,
    chunks: Vec<LogChunk>,
    next_artifact_id: i64,
    next_chunk_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get_bucket(&self, id: &str) -> StoreResult<Bucket> {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("bucket `{}`", id)))
    }

    async fn insert_bucket(&self, bucket: &Bucket) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.buckets.contains_key(&bucket.id) {
            return Err(StoreError::Duplicate(format!("bucket `{}`", bucket.id)));
        }
        inner.buckets.insert(bucket.id.clone(), bucket.clone());
        Ok(())
    }

    async fn update_bucket(&self, bucket: &Bucket) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.buckets.get_mut(&bucket.id) {
            Some(slot) => {
                *slot = bucket.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("bucket `{}`", bucket.id))),
        }
    }

    async fn list_buckets(&self) -> StoreResult<Vec<Bucket>> {
        let inner = self.inner.lock().unwrap();
        let mut buckets: Vec<Bucket> = inner.buckets.values().cloned().collect();
        buckets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(buckets)
    }

    async fn get_artifact_by_name(&self, bucket_id: &str, name: &str) -> StoreResult<Artifact> {
        let inner = self.inner.lock().unwrap();
        inner
            .artifacts
            .iter()
            .find(|a| a.bucket_id == bucket_id && a.name == name)
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!("artifact `{}` in bucket `{}`", name, bucket_id))
            })
    }

    async fn insert_artifact(&self, artifact: &Artifact) -> StoreResult<Artifact> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .artifacts
            .iter()
            .any(|a| a.bucket_id == artifact.bucket_id && a.name == artifact.name)
        {
            return Err(StoreError::Duplicate(format!(
                "artifact `{}` in bucket `{}`",
                artifact.name, artifact.bucket_id
            )));
        }
        inner.next_artifact_id += 1;
        let mut stored = artifact.clone();
        stored.id = inner.next_artifact_id;
        inner.artifacts.push(stored.clone());
        Ok(stored)
    }

    async fn update_artifact(&self, artifact: &Artifact) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.artifacts.iter_mut().find(|a| a.id == artifact.id) {
            Some(slot) => {
                *slot = artifact.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("artifact id {}", artifact.id))),
        }
    }

    async fn list_artifacts_in_bucket(&self, bucket_id: &str) -> StoreResult<Vec<Artifact>> {
        let inner = self.inner.lock().unwrap();
        let mut artifacts: Vec<Artifact> = inner
            .artifacts
            .iter()
            .filter(|a| a.bucket_id == bucket_id)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }

    async fn insert_log_chunk(&self, chunk: &LogChunk) -> StoreResult<LogChunk> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_chunk_id += 1;
        let mut stored = chunk.clone();
        stored.id = inner.next_chunk_id;
        inner.chunks.push(stored.clone());
        Ok(stored)
    }

    async fn list_log_chunks_in_artifact(&self, artifact_id: i64) -> StoreResult<Vec<LogChunk>> {
        let inner = self.inner.lock().unwrap();
        let mut chunks: Vec<LogChunk> = inner
            .chunks
            .iter()
            .filter(|c| c.artifact_id == artifact_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.byte_offset);
        Ok(chunks)
    }

    async fn get_last_byte_seen_for_artifact(&self, artifact_id: i64) -> StoreResult<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .chunks
            .iter()
            .filter(|c| c.artifact_id == artifact_id)
            .map(|c| c.byte_offset + c.size)
            .max()
            .unwrap_or(0))
    }
}

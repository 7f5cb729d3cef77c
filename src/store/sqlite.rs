//! SQLite-backed metadata store.
//!
//! Plain runtime queries against a shared pool. `RowNotFound` maps to
//! the typed not-found variant; unique-constraint violations map to
//! `Duplicate` so callers can turn them into conflict responses.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::models::{artifact::Artifact, bucket::Bucket, logchunk::LogChunk};
use crate::store::{MetadataStore, StoreError, StoreResult};

#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<SqlitePool>,
}

impl SqliteStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

/// Apply the embedded schema, statement by statement. Idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let sql = include_str!("../../migrations/0001_init.sql");
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Return true if a SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get_bucket(&self, id: &str) -> StoreResult<Bucket> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, owner, date_created, date_closed, state FROM buckets WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(format!("bucket `{}`", id)),
            other => StoreError::Sqlx(other),
        })
    }

    async fn insert_bucket(&self, bucket: &Bucket) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO buckets (id, owner, date_created, date_closed, state)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&bucket.id)
        .bind(&bucket.owner)
        .bind(bucket.date_created)
        .bind(bucket.date_closed)
        .bind(bucket.state)
        .execute(&*self.db)
        .await
        .map(|_| ())
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Duplicate(format!("bucket `{}`", bucket.id))
            } else {
                StoreError::Sqlx(err)
            }
        })
    }

    async fn update_bucket(&self, bucket: &Bucket) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE buckets SET owner = ?, date_created = ?, date_closed = ?, state = ?
             WHERE id = ?",
        )
        .bind(&bucket.owner)
        .bind(bucket.date_created)
        .bind(bucket.date_closed)
        .bind(bucket.state)
        .bind(&bucket.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("bucket `{}`", bucket.id)));
        }
        Ok(())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<Bucket>> {
        let buckets = sqlx::query_as::<_, Bucket>(
            "SELECT id, owner, date_created, date_closed, state FROM buckets ORDER BY id ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(buckets)
    }

    async fn get_artifact_by_name(&self, bucket_id: &str, name: &str) -> StoreResult<Artifact> {
        sqlx::query_as::<_, Artifact>(
            "SELECT id, bucket_id, name, size, deadline_mins, date_created, state, s3_url
             FROM artifacts WHERE bucket_id = ? AND name = ?",
        )
        .bind(bucket_id)
        .bind(name)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => {
                StoreError::NotFound(format!("artifact `{}` in bucket `{}`", name, bucket_id))
            }
            other => StoreError::Sqlx(other),
        })
    }

    async fn insert_artifact(&self, artifact: &Artifact) -> StoreResult<Artifact> {
        sqlx::query_as::<_, Artifact>(
            "INSERT INTO artifacts (bucket_id, name, size, deadline_mins, date_created, state, s3_url)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id, bucket_id, name, size, deadline_mins, date_created, state, s3_url",
        )
        .bind(&artifact.bucket_id)
        .bind(&artifact.name)
        .bind(artifact.size)
        .bind(artifact.deadline_mins)
        .bind(artifact.date_created)
        .bind(artifact.state)
        .bind(&artifact.s3_url)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Duplicate(format!(
                    "artifact `{}` in bucket `{}`",
                    artifact.name, artifact.bucket_id
                ))
            } else {
                StoreError::Sqlx(err)
            }
        })
    }

    async fn update_artifact(&self, artifact: &Artifact) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE artifacts SET size = ?, deadline_mins = ?, state = ?, s3_url = ?
             WHERE id = ?",
        )
        .bind(artifact.size)
        .bind(artifact.deadline_mins)
        .bind(artifact.state)
        .bind(&artifact.s3_url)
        .bind(artifact.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("artifact id {}", artifact.id)));
        }
        Ok(())
    }

    async fn list_artifacts_in_bucket(&self, bucket_id: &str) -> StoreResult<Vec<Artifact>> {
        let artifacts = sqlx::query_as::<_, Artifact>(
            "SELECT id, bucket_id, name, size, deadline_mins, date_created, state, s3_url
             FROM artifacts WHERE bucket_id = ? ORDER BY name ASC",
        )
        .bind(bucket_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(artifacts)
    }

    async fn insert_log_chunk(&self, chunk: &LogChunk) -> StoreResult<LogChunk> {
        let chunk = sqlx::query_as::<_, LogChunk>(
            "INSERT INTO logchunks (artifact_id, byte_offset, size, content)
             VALUES (?, ?, ?, ?)
             RETURNING id, artifact_id, byte_offset, size, content",
        )
        .bind(chunk.artifact_id)
        .bind(chunk.byte_offset)
        .bind(chunk.size)
        .bind(&chunk.content)
        .fetch_one(&*self.db)
        .await?;
        Ok(chunk)
    }

    async fn list_log_chunks_in_artifact(&self, artifact_id: i64) -> StoreResult<Vec<LogChunk>> {
        let chunks = sqlx::query_as::<_, LogChunk>(
            "SELECT id, artifact_id, byte_offset, size, content
             FROM logchunks WHERE artifact_id = ? ORDER BY byte_offset ASC",
        )
        .bind(artifact_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(chunks)
    }

    async fn get_last_byte_seen_for_artifact(&self, artifact_id: i64) -> StoreResult<i64> {
        let last = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(byte_offset + size), 0) FROM logchunks WHERE artifact_id = ?",
        )
        .bind(artifact_id)
        .fetch_one(&*self.db)
        .await?;
        Ok(last)
    }
}

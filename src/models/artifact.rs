//! Represents an artifact — a single named blob within a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Deadline applied when the caller supplies 0.
pub const DEFAULT_DEADLINE_MINS: u32 = 30;

/// Lifecycle state of an artifact.
///
/// Fixed-size artifacts start in `WAITING_FOR_UPLOAD` and move through
/// `UPLOADING` to `UPLOADED`. Chunked artifacts start in `APPENDING`,
/// are closed into `APPEND_COMPLETE`, then merged through `UPLOADING`
/// to `UPLOADED` (or directly to `CLOSED_WITHOUT_DATA` when empty).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
pub enum ArtifactState {
    #[serde(rename = "WAITING_FOR_UPLOAD")]
    #[sqlx(rename = "WAITING_FOR_UPLOAD")]
    WaitingForUpload,
    #[serde(rename = "UPLOADING")]
    #[sqlx(rename = "UPLOADING")]
    Uploading,
    #[serde(rename = "UPLOADED")]
    #[sqlx(rename = "UPLOADED")]
    Uploaded,
    #[serde(rename = "APPENDING")]
    #[sqlx(rename = "APPENDING")]
    Appending,
    #[serde(rename = "APPEND_COMPLETE")]
    #[sqlx(rename = "APPEND_COMPLETE")]
    AppendComplete,
    #[serde(rename = "CLOSED_WITHOUT_DATA")]
    #[sqlx(rename = "CLOSED_WITHOUT_DATA")]
    ClosedWithoutData,
    #[serde(rename = "ERROR")]
    #[sqlx(rename = "ERROR")]
    Error,
}

impl std::fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactState::WaitingForUpload => "WAITING_FOR_UPLOAD",
            ArtifactState::Uploading => "UPLOADING",
            ArtifactState::Uploaded => "UPLOADED",
            ArtifactState::Appending => "APPENDING",
            ArtifactState::AppendComplete => "APPEND_COMPLETE",
            ArtifactState::ClosedWithoutData => "CLOSED_WITHOUT_DATA",
            ArtifactState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A single artifact within a bucket, either a fixed-size upload or an
/// append-only chunked stream.
///
/// `(bucket_id, name)` is unique. The row stores metadata and the append
/// cursor size; chunk payloads live in `logchunks` and the final merged
/// blob in the object store.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct Artifact {
    /// Store-generated unique id.
    pub id: i64,

    /// Parent bucket.
    pub bucket_id: String,

    /// Name, unique within the bucket.
    pub name: String,

    /// Expected size for fixed uploads; current append cursor for
    /// chunked artifacts.
    pub size: i64,

    /// Minutes before the artifact is considered stale. Stored but not
    /// enforced here.
    pub deadline_mins: u32,

    /// When this artifact was created.
    pub date_created: DateTime<Utc>,

    /// Current lifecycle state.
    pub state: ArtifactState,

    /// Object-store key of the merged blob. Empty unless `UPLOADED`.
    #[serde(rename = "S3URL")]
    pub s3_url: String,
}

impl Artifact {
    /// Object-store key for this artifact. A pure function of the row,
    /// stable for its whole life.
    pub fn object_key(&self) -> String {
        format!("{}/{}/{}", self.bucket_id, self.name, self.id)
    }
}

//! Represents a logical bucket — a top-level container for artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a bucket. Created `OPEN`, closed at most once,
/// never destroyed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
pub enum BucketState {
    #[serde(rename = "OPEN")]
    #[sqlx(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    #[sqlx(rename = "CLOSED")]
    Closed,
}

/// A bucket groups artifacts by ownership and lifecycle.
///
/// The id is supplied by the caller and must be unique across the store.
/// No artifacts may be created once the bucket is `CLOSED`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct Bucket {
    /// Externally supplied stable identifier.
    pub id: String,

    /// Account that owns this bucket.
    pub owner: String,

    /// When this bucket was created.
    pub date_created: DateTime<Utc>,

    /// When this bucket was closed. Set only when state is `CLOSED`.
    pub date_closed: Option<DateTime<Utc>>,

    /// Current lifecycle state.
    pub state: BucketState,
}

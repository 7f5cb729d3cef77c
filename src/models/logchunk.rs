//! Represents a contiguous byte-range fragment of a chunked artifact.

use sqlx::FromRow;

/// One accepted chunk of an append-only artifact.
///
/// Chunks for an artifact form a gap-free, non-overlapping cover of
/// `[0, artifact.size)`. A chunk is inserted only while the parent is
/// `APPENDING` and is never mutated afterwards.
#[derive(Clone, FromRow, Debug)]
pub struct LogChunk {
    /// Store-generated unique id.
    pub id: i64,

    /// Parent artifact.
    pub artifact_id: i64,

    /// Byte position relative to the artifact start. Must equal the
    /// append cursor at insertion time.
    pub byte_offset: i64,

    /// Payload length. Always `content.len()`.
    pub size: i64,

    /// The payload bytes.
    pub content: Vec<u8>,
}

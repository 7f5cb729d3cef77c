//! Object storage for merged artifact blobs.
//!
//! The core treats the object store as a length-bounded streaming sink:
//! `put_reader` must consume exactly `length` bytes from the reader or
//! fail without making a partial object visible. Keys are opaque and
//! derived from the artifact row.

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

pub mod disk;
pub mod memory;

/// MIME type used for every stored blob.
pub const BINARY_CONTENT_TYPE: &str = "binary/octet-stream";

/// Access policy for stored blobs. Only public-read is used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acl {
    PublicRead,
}

pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error("object stream ended after {actual} of {expected} bytes")]
    LengthMismatch { expected: i64, actual: i64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write exactly `length` bytes from `reader` under `key`.
    async fn put_reader(
        &self,
        key: &str,
        reader: ObjectReader,
        length: i64,
        content_type: &str,
        acl: Acl,
    ) -> ObjectStoreResult<()>;

    /// Open a streaming reader for the blob stored under `key`.
    async fn get_reader(&self, key: &str) -> ObjectStoreResult<ObjectReader>;
}

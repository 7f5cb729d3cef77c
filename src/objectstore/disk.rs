//! Local-disk object store.
//!
//! Blobs land under `base_path/<key>`. Writes stream into a temp file,
//! fsync, then rename into place; a failed or short write never leaves a
//! visible object.

use std::io::{self, ErrorKind};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::objectstore::{Acl, ObjectReader, ObjectStore, ObjectStoreError, ObjectStoreResult};

const MAX_KEY_LEN: usize = 1024;

#[derive(Clone)]
pub struct DiskObjectStore {
    base_path: PathBuf,
}

impl DiskObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Reject keys that could escape the base directory. Keys are built
    /// from client-supplied bucket ids and artifact names.
    fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(ObjectStoreError::InvalidKey);
        }
        if key.starts_with('/') || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(ObjectStoreError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(ObjectStoreError::InvalidKey);
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        for seg in key.split('/') {
            path.push(seg);
        }
        path
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn put_reader(
        &self,
        key: &str,
        reader: ObjectReader,
        length: i64,
        _content_type: &str,
        _acl: Acl,
    ) -> ObjectStoreResult<()> {
        Self::ensure_key_safe(key)?;
        if length < 0 {
            return Err(ObjectStoreError::LengthMismatch {
                expected: length,
                actual: 0,
            });
        }

        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(PathBuf::from)
            .ok_or(ObjectStoreError::InvalidKey)?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut limited = reader.take(length as u64);
        let copied = match tokio::io::copy(&mut limited, &mut file).await {
            Ok(n) => n as i64,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        };
        if copied != length {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::LengthMismatch {
                expected: length,
                actual: copied,
            });
        }

        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }

        Ok(())
    }

    async fn get_reader(&self, key: &str) -> ObjectStoreResult<ObjectReader> {
        Self::ensure_key_safe(key)?;
        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objectstore::BINARY_CONTENT_TYPE;

    fn store() -> (DiskObjectStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        (DiskObjectStore::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let (store, _dir) = store();
        let payload = b"hello".to_vec();
        store
            .put_reader(
                "bkt/a.bin/1",
                Box::new(std::io::Cursor::new(payload.clone())),
                5,
                BINARY_CONTENT_TYPE,
                Acl::PublicRead,
            )
            .await
            .unwrap();

        let mut reader = store.get_reader("bkt/a.bin/1").await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn short_stream_fails_and_leaves_nothing() {
        let (store, _dir) = store();
        let err = store
            .put_reader(
                "bkt/a.bin/1",
                Box::new(std::io::Cursor::new(b"abc".to_vec())),
                10,
                BINARY_CONTENT_TYPE,
                Acl::PublicRead,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ObjectStoreError::LengthMismatch {
                expected: 10,
                actual: 3
            }
        ));

        let err = match store.get_reader("bkt/a.bin/1").await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, ObjectStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (store, _dir) = store();
        for key in ["", "/abs", "a/../b", "a//b"] {
            let err = match store.get_reader(key).await {
                Err(e) => e,
                Ok(_) => panic!("expected error"),
            };
            assert!(matches!(err, ObjectStoreError::InvalidKey), "key {:?}", key);
        }
    }
}

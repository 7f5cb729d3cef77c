//! In-memory object store.
//!
//! Test backing with a switchable failure mode so upload error paths
//! can be exercised deterministically.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::objectstore::{Acl, ObjectReader, ObjectStore, ObjectStoreError, ObjectStoreResult};

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put_reader` fail before consuming the
    /// stream.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_reader(
        &self,
        key: &str,
        mut reader: ObjectReader,
        length: i64,
        _content_type: &str,
        _acl: Acl,
    ) -> ObjectStoreResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Io(io::Error::other(
                "injected object store failure",
            )));
        }

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        if buf.len() as i64 != length {
            return Err(ObjectStoreError::LengthMismatch {
                expected: length,
                actual: buf.len() as i64,
            });
        }

        self.objects.lock().unwrap().insert(key.to_string(), buf);
        Ok(())
    }

    async fn get_reader(&self, key: &str) -> ObjectStoreResult<ObjectReader> {
        let bytes = self
            .get(key)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }
}

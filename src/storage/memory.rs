//! In-process object store used by tests and `--dry-run`.

use super::{ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Keeps every object in a map keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    uploads: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of a stored object, if any.
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys currently present in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        match self.objects.lock() {
            Ok(map) => map
                .keys()
                .filter(|(b, _)| b == bucket)
                .map(|(_, k)| k.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Number of upload calls received, including overwrites.
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<()> {
        let mut map = self
            .objects
            .lock()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        map.insert((bucket.to_string(), key.to_string()), bytes);
        if let Ok(mut n) = self.uploads.lock() {
            *n += 1;
        }
        Ok(())
    }

    async fn public_url(&self, bucket: &str, key: &str) -> StorageResult<String> {
        if self.get(bucket, key).is_none() {
            return Err(StorageError::Rejected {
                status: 404,
                message: format!("object '{key}' not found"),
            });
        }
        Ok(format!("memory://{bucket}/{key}"))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

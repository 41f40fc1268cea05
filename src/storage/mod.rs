//! Object storage backends for collected PDFs.
//!
//! The pipeline only needs two operations from a backend: put an object
//! into a bucket, and turn a stored object into a public URL. Both sit behind
//! [`ObjectStore`] so the same pipeline can target Supabase in production and
//! an in-process map in tests or dry runs.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use supabase::SupabaseStorage;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend answered but refused the request.
    #[error("storage rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never got a usable answer.
    #[error("storage request failed: {0}")]
    Transport(String),

    /// The backend could not be configured (bad base URL etc.).
    #[error("storage misconfigured: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A bucket-based object store.
///
/// Uploads are upserts: writing an existing key replaces its content.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key` in `bucket`.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Public URL of an object previously uploaded.
    async fn public_url(&self, bucket: &str, key: &str) -> StorageResult<String>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

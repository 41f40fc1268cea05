//! PDF uploader: put a local PDF into a bucket and resolve its public URL.

use super::fetch::LocalPdf;
use crate::config::StorageKeyStrategy;
use crate::error::UploadError;
use crate::output::UploadedPdf;
use crate::storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Content type sent with every upload.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Hex digits of the content hash used in [`StorageKeyStrategy::ContentHash`] keys.
const HASH_PREFIX_LEN: usize = 16;

/// Exactly one of public URL or error, enforced by the type.
pub type UploadResult = Result<UploadedPdf, UploadError>;

/// Uploads local PDFs to one bucket of an [`ObjectStore`].
#[derive(Clone)]
pub struct PdfUploader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    strategy: StorageKeyStrategy,
}

impl std::fmt::Debug for PdfUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfUploader")
            .field("store", &self.store.name())
            .field("bucket", &self.bucket)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl PdfUploader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        strategy: StorageKeyStrategy,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            strategy,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// [`upload`](Self::upload), abandoned once `budget` runs out.
    pub async fn upload_within(&self, pdf: &LocalPdf, budget: Duration) -> UploadResult {
        match tokio::time::timeout(budget, self.upload(pdf)).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::Timeout {
                bucket: self.bucket.clone(),
                key: storage_key(pdf, self.strategy),
                millis: budget.as_millis() as u64,
            }),
        }
    }

    /// Read `pdf` from disk, upload it, then ask the store for its public URL.
    pub async fn upload(&self, pdf: &LocalPdf) -> UploadResult {
        let key = storage_key(pdf, self.strategy);
        let bytes = tokio::fs::read(&pdf.path)
            .await
            .map_err(|e| UploadError::ReadFailed {
                path: pdf.path.clone(),
                reason: e.to_string(),
            })?;
        let len = bytes.len() as u64;

        debug!(
            "Uploading {} ({} bytes) to {}:{}/{}",
            pdf.path.display(),
            len,
            self.store.name(),
            self.bucket,
            key
        );

        self.store
            .upload(&self.bucket, &key, bytes, PDF_CONTENT_TYPE)
            .await
            .map_err(|e| UploadError::from_storage(&self.bucket, &key, e))?;

        let public_url = self
            .store
            .public_url(&self.bucket, &key)
            .await
            .map_err(|e| UploadError::from_storage(&self.bucket, &key, e))?;

        info!("PDF uploaded: {}", public_url);

        Ok(UploadedPdf {
            bucket: self.bucket.clone(),
            key,
            public_url,
            local_path: Some(pdf.path.clone()),
            bytes: len,
        })
    }
}

/// Object key for `pdf` under `strategy`.
pub fn storage_key(pdf: &LocalPdf, strategy: StorageKeyStrategy) -> String {
    match strategy {
        StorageKeyStrategy::FileName => pdf.file_name().to_string(),
        StorageKeyStrategy::ContentHash => {
            let prefix: String = pdf.content_hash.chars().take(HASH_PREFIX_LEN).collect();
            format!("{}-{}", prefix, pdf.file_name())
        }
    }
}

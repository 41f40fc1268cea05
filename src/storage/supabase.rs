//! Supabase Storage over its REST API.
//!
//! Only two endpoints are used:
//!
//! ```text
//! POST {base}/storage/v1/object/{bucket}/{key}          upload (x-upsert: true)
//!      {base}/storage/v1/object/public/{bucket}/{key}   public URL
//! ```
//!
//! A successful upload must come back with a 2xx status *and* a body without
//! an `error` field; either signal alone is treated as a failure.

use super::{ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Error body returned by the storage API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Supabase Storage client bound to one project.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    base: Url,
    api_key: String,
    client: reqwest::Client,
}

impl SupabaseStorage {
    /// Create a client for the project at `base_url` authenticated with `api_key`.
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> StorageResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| StorageError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StorageError::Config(format!(
                "'{base_url}' cannot be used as a base URL"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;
        Ok(Self {
            base,
            api_key: api_key.to_string(),
            client,
        })
    }

    fn object_url(&self, segments: &[&str]) -> StorageResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Config("base URL has no path".into()))?
            .pop_if_empty()
            .extend(["storage", "v1", "object"])
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        let url = self.object_url(&[bucket, key])?;
        debug!("Uploading {} bytes to {}", bytes.len(), url);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if let Some(message) = error_in_body(&body) {
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message: if body.trim().is_empty() {
                    status.to_string()
                } else {
                    body
                },
            });
        }
        Ok(())
    }

    async fn public_url(&self, bucket: &str, key: &str) -> StorageResult<String> {
        Ok(self.object_url(&["public", bucket, key])?.to_string())
    }

    fn name(&self) -> &str {
        "supabase"
    }
}

/// Extract an error message if the body carries a non-null `error` field.
fn error_in_body(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.error {
        None | Some(serde_json::Value::Null) => None,
        Some(err) => Some(parsed.message.unwrap_or_else(|| match err {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })),
    }
}

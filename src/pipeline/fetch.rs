//! PDF fetcher: download a URL into the run's download directory.
//!
//! The body is streamed chunk by chunk so the byte cap is enforced before the
//! whole document sits in memory, and hashed on the way through so the
//! uploader can derive a content-addressed key without re-reading the file.
//!
//! The local file name is the URL's trailing path segment. Two URLs ending in
//! the same segment write to the same local path; the later download wins.

use crate::config::PipelineLimits;
use crate::error::{FetchError, ResearchError};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name used when the URL has no usable trailing segment.
pub const FALLBACK_FILE_NAME: &str = "downloaded.pdf";

/// A PDF written to local disk, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPdf {
    /// The URL it was fetched from.
    pub url: String,
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex BLAKE3 digest of the content.
    pub content_hash: String,
}

impl LocalPdf {
    /// Base name of the local file.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(FALLBACK_FILE_NAME)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Downloads PDFs into one directory.
#[derive(Debug, Clone)]
pub struct PdfFetcher {
    client: reqwest::Client,
    dir: PathBuf,
    max_bytes: u64,
    timeout: Duration,
}

impl PdfFetcher {
    /// Create a fetcher writing into `dir` and bounded by `limits`.
    pub fn new(dir: impl Into<PathBuf>, limits: &PipelineLimits) -> Result<Self, ResearchError> {
        let timeout = Duration::from_secs(limits.download_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResearchError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            dir: dir.into(),
            max_bytes: limits.max_pdf_bytes,
            timeout,
        })
    }

    /// Directory downloads are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download `url` using the configured per-download timeout.
    pub async fn fetch(&self, url: &str) -> Result<LocalPdf, FetchError> {
        self.fetch_within(url, self.timeout).await
    }

    /// Download `url`, giving up after `budget` (capped at the per-download timeout).
    pub async fn fetch_within(&self, url: &str, budget: Duration) -> Result<LocalPdf, FetchError> {
        let parsed = parse_pdf_url(url)?;
        let budget = budget.min(self.timeout);

        match tokio::time::timeout(budget, self.download(url, parsed, budget)).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(url, budget)),
        }
    }

    async fn download(
        &self,
        url: &str,
        parsed: Url,
        budget: Duration,
    ) -> Result<LocalPdf, FetchError> {
        info!("Downloading PDF from: {}", url);

        let file_name = file_name_from_url(&parsed);
        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| transport_error(url, e, budget))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().to_string(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
        }

        let mut body: Vec<u8> = Vec::new();
        let mut hasher = blake3::Hasher::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(url, e, budget))?
        {
            if body.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            hasher.update(&chunk);
            body.extend_from_slice(&chunk);
        }

        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| FetchError::Io {
                url: url.to_string(),
                path: path.clone(),
                reason: e.to_string(),
            })?;

        debug!("Wrote {} bytes to {}", body.len(), path.display());

        Ok(LocalPdf {
            url: url.to_string(),
            path,
            bytes: body.len() as u64,
            content_hash: hasher.finalize().to_hex().to_string(),
        })
    }

}

fn timeout_error(url: &str, budget: Duration) -> FetchError {
    FetchError::Timeout {
        url: url.to_string(),
        millis: budget.as_millis() as u64,
    }
}

/// `budget` is the effective limit for this download, which may be tighter
/// than the client's own timeout.
fn transport_error(url: &str, e: reqwest::Error, budget: Duration) -> FetchError {
    if e.is_timeout() {
        timeout_error(url, budget)
    } else {
        FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Parse and check that `url` is an absolute http(s) URL.
fn parse_pdf_url(url: &str) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    if !is_url(url.trim()) {
        return Err(invalid("only http:// and https:// URLs are fetched".into()));
    }
    let parsed = Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(parsed)
}

/// Derive a safe local file name from the URL's trailing path segment.
///
/// Segments arrive percent-encoded, so an encoded `/` stays inert. Anything
/// that could escape the download directory or is empty falls back to
/// [`FALLBACK_FILE_NAME`].
pub fn file_name_from_url(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    let unsafe_name = last.is_empty()
        || last == "."
        || last == ".."
        || last.len() > 200
        || last
            .chars()
            .any(|c| c.is_control() || matches!(c, '/' | '\\' | ':'));

    if unsafe_name {
        FALLBACK_FILE_NAME.to_string()
    } else {
        last.to_string()
    }
}

//! The PDF pipeline: fetch then upload, one URL at a time.
//!
//! Items are handled strictly in input order and never in parallel. A failed
//! item is recorded and the loop moves on; nothing here aborts the run except
//! failing to create the download directory.
//!
//! Three limits bound a run: URLs past `max_pdfs` are skipped outright, the
//! whole run has a deadline (each download and each upload gets at most the
//! time left), and each body is capped in size by the fetcher.

use super::fetch::PdfFetcher;
use super::upload::PdfUploader;
use crate::config::{PipelineLimits, ResearchConfig};
use crate::error::ResearchError;
use crate::output::{PdfOutcome, PdfStatus, PipelineReport, SkipReason};
use crate::progress::PipelineProgress;
use crate::storage::ObjectStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Where a run writes its downloads.
#[derive(Debug)]
pub enum DownloadDir {
    /// Removed with everything in it when dropped.
    Temp(TempDir),
    /// Caller-owned; files are left in place.
    Persistent(PathBuf),
}

impl DownloadDir {
    pub fn path(&self) -> &Path {
        match self {
            DownloadDir::Temp(dir) => dir.path(),
            DownloadDir::Persistent(path) => path,
        }
    }
}

/// Fetch-then-upload loop over a list of PDF URLs.
#[derive(Clone)]
pub struct PdfPipeline {
    uploader: PdfUploader,
    limits: PipelineLimits,
    download_dir: Option<PathBuf>,
    progress: Option<PipelineProgress>,
}

impl std::fmt::Debug for PdfPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfPipeline")
            .field("uploader", &self.uploader)
            .field("limits", &self.limits)
            .field("download_dir", &self.download_dir)
            .finish()
    }
}

impl PdfPipeline {
    /// Build a pipeline storing into `store` with the bucket, key strategy,
    /// limits, and progress callback from `config`.
    pub fn new(store: Arc<dyn ObjectStore>, config: &ResearchConfig) -> Self {
        Self {
            uploader: PdfUploader::new(store, config.bucket.clone(), config.key_strategy),
            limits: config.limits,
            download_dir: config.download_dir.clone(),
            progress: config.pipeline_progress.clone(),
        }
    }

    pub fn limits(&self) -> &PipelineLimits {
        &self.limits
    }

    pub fn progress(&self) -> Option<&PipelineProgress> {
        self.progress.as_ref()
    }

    /// Process every URL and return the outcomes in input order.
    ///
    /// An empty list returns an empty report without creating a download
    /// directory or touching the network.
    pub async fn run(&self, urls: &[String]) -> Result<PipelineReport, ResearchError> {
        let started = Instant::now();
        let total = urls.len();
        if let Some(ref cb) = self.progress {
            cb.on_pipeline_start(total);
        }
        if urls.is_empty() {
            if let Some(ref cb) = self.progress {
                cb.on_pipeline_complete(0, 0);
            }
            return Ok(PipelineReport::default());
        }

        info!("Processing {} PDF URLs", total);
        let dir = self.open_download_dir().await?;
        let fetcher = PdfFetcher::new(dir.path(), &self.limits)?;

        let mut outcomes = Vec::with_capacity(total);
        for (index, url) in urls.iter().enumerate() {
            outcomes.push(self.process_one(&fetcher, index, total, url, started).await);
        }

        let report = PipelineReport::from_outcomes(outcomes, started.elapsed().as_millis() as u64);
        info!(
            "PDF pipeline complete: {}/{} uploaded, {} failed, {} skipped, {}ms",
            report.stats.uploaded,
            total,
            report.stats.fetch_failed + report.stats.upload_failed,
            report.stats.skipped,
            report.stats.duration_ms
        );
        if let Some(ref cb) = self.progress {
            cb.on_pipeline_complete(total, report.stats.uploaded);
        }

        // `dir` is dropped here; a temp download directory goes with it.
        drop(dir);
        Ok(report)
    }

    /// Create (or reuse) the directory downloads are written to.
    pub(crate) async fn open_download_dir(&self) -> Result<DownloadDir, ResearchError> {
        match &self.download_dir {
            Some(path) => {
                tokio::fs::create_dir_all(path).await.map_err(|e| {
                    ResearchError::Internal(format!(
                        "Failed to create download directory {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(DownloadDir::Persistent(path.clone()))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("research-pdfs-")
                    .tempdir()
                    .map_err(|e| ResearchError::Internal(format!("tempdir: {e}")))?;
                debug!("Downloading into {}", dir.path().display());
                Ok(DownloadDir::Temp(dir))
            }
        }
    }

    /// Handle the URL at `index`: skip it, or fetch it and upload it.
    pub(crate) async fn process_one(
        &self,
        fetcher: &PdfFetcher,
        index: usize,
        total: usize,
        url: &str,
        started: Instant,
    ) -> PdfOutcome {
        let outcome = |status| PdfOutcome {
            index,
            url: url.to_string(),
            status,
        };

        if index >= self.limits.max_pdfs {
            return self.skipped(outcome, index, total, SkipReason::LimitReached);
        }
        let deadline = Duration::from_secs(self.limits.deadline_secs);
        let elapsed = started.elapsed();
        if elapsed >= deadline {
            return self.skipped(outcome, index, total, SkipReason::DeadlineExceeded);
        }

        if let Some(ref cb) = self.progress {
            cb.on_pdf_start(index, total, url);
        }

        let local = match fetcher.fetch_within(url, deadline - elapsed).await {
            Ok(local) => local,
            Err(error) => {
                warn!("Failed to download PDF: {}", error);
                if let Some(ref cb) = self.progress {
                    cb.on_pdf_error(index, total, &error.to_string());
                }
                return outcome(PdfStatus::FetchFailed { error });
            }
        };

        info!("PDF stored locally at: {}", local.path.display());
        if let Some(ref cb) = self.progress {
            cb.on_pdf_fetched(index, total, &local.path, local.bytes);
        }

        // The upload gets whatever the download left of the run's deadline.
        let remaining = deadline.saturating_sub(started.elapsed());
        match self.uploader.upload_within(&local, remaining).await {
            Ok(mut uploaded) => {
                if let Some(ref cb) = self.progress {
                    cb.on_pdf_uploaded(index, total, &uploaded.public_url);
                }
                uploaded.local_path = self.kept_path(local.path);
                outcome(PdfStatus::Uploaded(uploaded))
            }
            Err(error) => {
                warn!("Failed to upload PDF: {}", error);
                if let Some(ref cb) = self.progress {
                    cb.on_pdf_error(index, total, &error.to_string());
                }
                outcome(PdfStatus::UploadFailed {
                    local_path: self.kept_path(local.path),
                    bytes: local.bytes,
                    error,
                })
            }
        }
    }

    /// `path` if downloads outlive the run, `None` for a temporary directory.
    fn kept_path(&self, path: PathBuf) -> Option<PathBuf> {
        self.download_dir.as_ref().map(|_| path)
    }

    fn skipped(
        &self,
        outcome: impl FnOnce(PdfStatus) -> PdfOutcome,
        index: usize,
        total: usize,
        reason: SkipReason,
    ) -> PdfOutcome {
        debug!("PDF {} {}", index + 1, reason);
        if let Some(ref cb) = self.progress {
            cb.on_pdf_error(index, total, &reason.to_string());
        }
        outcome(PdfStatus::Skipped { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn empty_list_yields_empty_report() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = PdfPipeline::new(store.clone(), &ResearchConfig::default());
        let report = pipeline.run(&[]).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(report.stats.total, 0);
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn urls_past_the_cap_are_skipped_without_fetching() {
        let store = Arc::new(MemoryStore::new());
        let config = ResearchConfig::builder().max_pdfs(0).build().unwrap();
        let pipeline = PdfPipeline::new(store.clone(), &config);
        // Unroutable addresses: a network attempt would surface as a fetch failure.
        let urls = vec![
            "http://192.0.2.1/a.pdf".to_string(),
            "http://192.0.2.1/b.pdf".to_string(),
        ];
        let report = pipeline.run(&urls).await.unwrap();
        assert_eq!(report.stats.skipped, 2);
        assert!(report
            .outcomes
            .iter()
            .all(|o| matches!(o.status, PdfStatus::Skipped { reason: SkipReason::LimitReached })));
    }

    #[tokio::test]
    async fn invalid_urls_fail_and_the_loop_continues() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = PdfPipeline::new(store, &ResearchConfig::default());
        let urls = vec!["not a url".to_string(), "ftp://x/a.pdf".to_string()];
        let report = pipeline.run(&urls).await.unwrap();
        assert_eq!(report.stats.fetch_failed, 2);
        assert_eq!(report.outcomes[0].index, 0);
        assert_eq!(report.outcomes[1].index, 1);
    }

    #[tokio::test]
    async fn persistent_download_dir_is_kept() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("pdfs");
        let config = ResearchConfig::builder().download_dir(&target).build().unwrap();
        let pipeline = PdfPipeline::new(Arc::new(MemoryStore::new()), &config);
        let dir = pipeline.open_download_dir().await.unwrap();
        assert_eq!(dir.path(), target.as_path());
        drop(dir);
        assert!(target.is_dir());
    }
}

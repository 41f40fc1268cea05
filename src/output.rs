//! Result types produced by the pipeline and the orchestrator.

use crate::error::{FetchError, UploadError};
use crate::research::search::{PdfLink, SearchResults};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one URL in a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfOutcome {
    /// 0-based position in the input list.
    pub index: usize,
    pub url: String,
    pub status: PdfStatus,
}

/// What happened to a single PDF reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PdfStatus {
    /// Fetched and stored; `public_url` is reachable through the bucket.
    Uploaded(UploadedPdf),
    /// The download failed; nothing was stored.
    FetchFailed { error: FetchError },
    /// Downloaded but the upload failed.
    UploadFailed {
        /// Where the download was kept; `None` when the run used a temporary
        /// directory, which is gone by the time the report is returned.
        local_path: Option<PathBuf>,
        /// Size of the downloaded body.
        bytes: u64,
        error: UploadError,
    },
    /// Not attempted.
    Skipped { reason: SkipReason },
}

/// A PDF that made it into object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPdf {
    pub bucket: String,
    pub key: String,
    pub public_url: String,
    /// Local copy of the document; `None` when the run downloaded into a
    /// temporary directory, which is removed before the report is returned.
    pub local_path: Option<PathBuf>,
    pub bytes: u64,
}

/// Why a URL was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The run already reached `max_pdfs`.
    LimitReached,
    /// The pipeline deadline elapsed.
    DeadlineExceeded,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::LimitReached => f.write_str("skipped: PDF count limit reached"),
            SkipReason::DeadlineExceeded => f.write_str("skipped: pipeline deadline exceeded"),
        }
    }
}

impl PdfOutcome {
    /// Public URL when the item was stored.
    pub fn public_url(&self) -> Option<&str> {
        match &self.status {
            PdfStatus::Uploaded(u) => Some(&u.public_url),
            _ => None,
        }
    }

    /// Human-readable error for failed or skipped items.
    pub fn error_message(&self) -> Option<String> {
        match &self.status {
            PdfStatus::Uploaded(_) => None,
            PdfStatus::FetchFailed { error } => Some(error.to_string()),
            PdfStatus::UploadFailed { error, .. } => Some(error.to_string()),
            PdfStatus::Skipped { reason } => Some(reason.to_string()),
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self.status, PdfStatus::Uploaded(_))
    }
}

/// Aggregate counters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total: usize,
    pub uploaded: usize,
    pub fetch_failed: usize,
    pub upload_failed: usize,
    pub skipped: usize,
    /// Bytes fetched, whether or not the upload then succeeded.
    pub bytes_downloaded: u64,
    pub duration_ms: u64,
}

/// Every outcome of a pipeline run, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub outcomes: Vec<PdfOutcome>,
    pub stats: PipelineStats,
}

impl PipelineReport {
    /// Stored PDFs in input order.
    pub fn uploaded(&self) -> impl Iterator<Item = (&PdfOutcome, &UploadedPdf)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            PdfStatus::Uploaded(u) => Some((o, u)),
            _ => None,
        })
    }

    pub(crate) fn from_outcomes(outcomes: Vec<PdfOutcome>, duration_ms: u64) -> Self {
        let mut stats = PipelineStats {
            total: outcomes.len(),
            duration_ms,
            ..Default::default()
        };
        for o in &outcomes {
            match &o.status {
                PdfStatus::Uploaded(u) => {
                    stats.uploaded += 1;
                    stats.bytes_downloaded += u.bytes;
                }
                PdfStatus::FetchFailed { .. } => stats.fetch_failed += 1,
                PdfStatus::UploadFailed { bytes, .. } => {
                    stats.upload_failed += 1;
                    stats.bytes_downloaded += bytes;
                }
                PdfStatus::Skipped { .. } => stats.skipped += 1,
            }
        }
        Self { outcomes, stats }
    }
}

/// Everything a research session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    /// The plan after the (optional) refinement.
    pub plan: String,
    pub search_results: SearchResults,
    pub preliminary_report: String,
    pub pdf_queries: Vec<String>,
    /// Links found by PDF search, deduplicated, in discovery order.
    pub pdf_links: Vec<PdfLink>,
    pub pdf_report: PipelineReport,
    pub enhanced_report: String,
    /// Final cleaned Markdown.
    pub markdown: String,
}

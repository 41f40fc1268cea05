//! Error types for the policy-research library.
//!
//! Two tiers of failure exist, mirroring how a research session behaves:
//!
//! * [`ResearchError`] — **Fatal**: a generation or search stage failed, a
//!   credential is missing, or the configuration is invalid. The whole run
//!   aborts and the error is returned from the top-level entry points.
//!
//! * [`FetchError`] / [`UploadError`] — **Non-fatal**: a single PDF could not
//!   be downloaded or stored. The failure is recorded in that item's
//!   [`crate::output::PdfOutcome`] and the pipeline moves on to the next URL.

use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the policy-research library.
#[derive(Debug, Error)]
pub enum ResearchError {
    // ── Setup errors ──────────────────────────────────────────────────────
    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A credential needed by one of the external services is absent.
    #[error("Missing credential '{name}'.\nSet it in the secrets file or export {env_var}.")]
    MissingCredential { name: String, env_var: String },

    /// Could not read or parse a secrets / context file.
    #[error("Failed to load '{path}': {detail}")]
    LoadFailed { path: PathBuf, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Stage errors ──────────────────────────────────────────────────────
    /// An orchestrator stage failed; the run is aborted.
    #[error("Research stage '{stage}' failed: {message}")]
    Stage { stage: Stage, message: String },

    /// The LLM answered, but not with the JSON shape the stage expects.
    #[error("Stage '{stage}' returned malformed JSON: {detail}")]
    MalformedJson { stage: Stage, detail: String },

    /// LLM call timed out.
    #[error("LLM call timed out after {secs}s during '{stage}'")]
    LlmTimeout { stage: Stage, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the Markdown report.
    #[error("Failed to write report '{path}': {source}")]
    ReportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResearchError {
    /// Wrap any displayable failure as a stage error.
    pub fn stage(stage: Stage, err: impl std::fmt::Display) -> Self {
        ResearchError::Stage {
            stage,
            message: err.to_string(),
        }
    }
}

/// The orchestrator stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResearchPlan,
    RefinePlan,
    SearchQueries,
    WebSearch,
    PreliminaryReport,
    PdfSearchQueries,
    PdfSearch,
    PdfPipeline,
    EnhancedReport,
    FinalMarkdown,
}

impl Stage {
    /// Every stage in the order the orchestrator runs them.
    pub const ALL: [Stage; 10] = [
        Stage::ResearchPlan,
        Stage::RefinePlan,
        Stage::SearchQueries,
        Stage::WebSearch,
        Stage::PreliminaryReport,
        Stage::PdfSearchQueries,
        Stage::PdfSearch,
        Stage::PdfPipeline,
        Stage::EnhancedReport,
        Stage::FinalMarkdown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::ResearchPlan => "research plan",
            Stage::RefinePlan => "plan refinement",
            Stage::SearchQueries => "search queries",
            Stage::WebSearch => "web search",
            Stage::PreliminaryReport => "preliminary report",
            Stage::PdfSearchQueries => "pdf search queries",
            Stage::PdfSearch => "pdf search",
            Stage::PdfPipeline => "pdf pipeline",
            Stage::EnhancedReport => "enhanced report",
            Stage::FinalMarkdown => "final markdown",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A non-fatal failure to download one PDF.
///
/// `Display` is never empty: every variant names the URL and the reason.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum FetchError {
    /// The reference is not an absolute http/https URL.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The server answered with a non-2xx status.
    #[error("failed to download '{url}': HTTP {status}")]
    Status { url: String, status: String },

    /// DNS, connect, TLS, or body-read failure.
    #[error("failed to download '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The download did not finish within its time budget.
    #[error("download of '{url}' timed out after {millis}ms")]
    Timeout { url: String, millis: u64 },

    /// The body exceeded the configured byte cap.
    #[error("'{url}' exceeds the {limit}-byte download limit")]
    TooLarge { url: String, limit: u64 },

    /// The body was received but could not be written locally.
    #[error("failed to store '{url}' at '{path}': {reason}")]
    Io {
        url: String,
        path: PathBuf,
        reason: String,
    },
}

/// A non-fatal failure to put one local PDF into object storage.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum UploadError {
    /// The local file could not be read.
    #[error("failed to read '{path}': {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    /// The storage backend refused or failed the upload.
    #[error("failed to upload '{key}' to bucket '{bucket}': {reason}")]
    Rejected {
        bucket: String,
        key: String,
        reason: String,
    },

    /// The pipeline deadline expired while the upload was in flight.
    #[error("upload of '{key}' to bucket '{bucket}' timed out after {millis}ms")]
    Timeout {
        bucket: String,
        key: String,
        millis: u64,
    },
}

impl UploadError {
    pub(crate) fn from_storage(bucket: &str, key: &str, err: StorageError) -> Self {
        UploadError::Rejected {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_names_the_stage() {
        let e = ResearchError::stage(Stage::WebSearch, "HTTP 401");
        let msg = e.to_string();
        assert!(msg.contains("web search"), "got: {msg}");
        assert!(msg.contains("HTTP 401"));
    }

    #[test]
    fn fetch_status_display() {
        let e = FetchError::Status {
            url: "https://x/bad".into(),
            status: "404 Not Found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("https://x/bad"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn upload_rejected_display() {
        let e = UploadError::Rejected {
            bucket: "docs".into(),
            key: "a.pdf".into(),
            reason: "Bucket not found".into(),
        };
        assert!(e.to_string().contains("docs"));
        assert!(e.to_string().contains("Bucket not found"));
    }

    #[test]
    fn stages_are_ordered() {
        assert_eq!(Stage::ALL.first(), Some(&Stage::ResearchPlan));
        assert_eq!(Stage::ALL.last(), Some(&Stage::FinalMarkdown));
    }

    #[test]
    fn missing_credential_mentions_env_var() {
        let e = ResearchError::MissingCredential {
            name: "SERPER_APIKey".into(),
            env_var: "SERPER_API_KEY".into(),
        };
        assert!(e.to_string().contains("SERPER_API_KEY"));
    }
}

//! # policy-research
//!
//! An LLM-driven research assistant for policy work: it drafts a research
//! plan from a short user profile, answers the plan's questions with web
//! search, collects relevant PDF publications into object storage, and
//! writes a cited Markdown report.
//!
//! ## Session Overview
//!
//! ```text
//! UserContext
//!  │
//!  ├─ 1. Plan      LLM drafts a plan; one optional human revision
//!  ├─ 2. Search    per-section queries answered by Perplexity
//!  ├─ 3. Draft     preliminary report grounded in the answers
//!  ├─ 4. Collect   Serper finds PDFs; fetch + upload to Supabase Storage
//!  ├─ 5. Enhance   report revised with the stored documents as sources
//!  └─ 6. Polish    final Markdown, deterministically cleaned
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use policy_research::{
//!     write_report, Credentials, ResearchConfig, ResearchOrchestrator, UserContext,
//!     REPORT_FILE_NAME,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // LLM provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ResearchConfig::default();
//!     let credentials = Credentials::from_env();
//!     let store = credentials.object_store(config.api_timeout_secs)?;
//!     let orchestrator = ResearchOrchestrator::from_credentials(&config, &credentials, store)?;
//!
//!     let report = orchestrator.run(&UserContext::default()).await?;
//!     write_report(REPORT_FILE_NAME, &report.markdown).await?;
//!     eprintln!("{} PDFs stored", report.pdf_report.stats.uploaded);
//!     Ok(())
//! }
//! ```
//!
//! The PDF pipeline can also be used on its own through [`PdfPipeline`] or
//! the streaming [`process_pdfs_stream`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `research` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! policy-research = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod prompts;
pub mod research;
pub mod storage;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineLimits, ResearchConfig, ResearchConfigBuilder, StorageKeyStrategy};
pub use context::{OutputType, Sector, UserContext};
pub use credentials::Credentials;
pub use error::{FetchError, ResearchError, Stage, UploadError};
pub use output::{
    PdfOutcome, PdfStatus, PipelineReport, PipelineStats, ResearchReport, SkipReason, UploadedPdf,
};
pub use pipeline::{PdfFetcher, PdfPipeline, PdfUploader};
pub use progress::{
    NoopProgress, PipelineProgress, PipelineProgressCallback, ResearchProgress,
    ResearchProgressCallback,
};
pub use research::{
    write_report, AcceptPlan, FixedFeedback, LlmGenerator, PdfSearch, PlanReviewer,
    ResearchOrchestrator, TextGenerator, WebSearch, REPORT_FILE_NAME, REPORT_MIME,
};
pub use storage::{MemoryStore, ObjectStore, StorageError, SupabaseStorage};
pub use stream::{process_pdfs_stream, PdfStream};

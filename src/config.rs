//! Configuration types for a research session.
//!
//! Every knob lives in [`ResearchConfig`], built via its
//! [`ResearchConfigBuilder`]. The config is constructed once at session start
//! and passed by reference into each component; nothing reads settings from
//! global state.

use crate::error::ResearchError;
use crate::progress::{PipelineProgress, ResearchProgress};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Bucket used when none is configured.
pub const DEFAULT_BUCKET: &str = "supabasetestllm1";

/// Default LLM model when a provider is named but no model is given.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for a research session.
///
/// # Example
/// ```rust
/// use policy_research::ResearchConfig;
///
/// let config = ResearchConfig::builder()
///     .model("gpt-4.1")
///     .bucket("policy-pdfs")
///     .max_pdfs(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.limits.max_pdfs, 10);
/// ```
#[derive(Clone)]
pub struct ResearchConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for generation stages. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per stage. Default: 4096.
    ///
    /// Final reports for a "Research Paper" output type can run long;
    /// raise this if the Markdown ends mid-section.
    pub max_tokens: usize,

    /// Retry attempts for a failed LLM call. Default: 0 (a failure aborts the run).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-LLM-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Model used by the answer-engine web search. Default: "sonar".
    pub web_search_model: String,

    /// Links requested per PDF search query. Default: 5.
    pub pdf_results_per_query: usize,

    /// Storage bucket receiving the PDFs. Default: [`DEFAULT_BUCKET`].
    pub bucket: String,

    /// How object keys are derived for uploaded PDFs. Default: content hash.
    pub key_strategy: StorageKeyStrategy,

    /// Resource caps for the PDF pipeline.
    pub limits: PipelineLimits,

    /// Keep downloaded PDFs in this directory instead of a temp dir that is
    /// removed when the pipeline finishes.
    pub download_dir: Option<PathBuf>,

    /// Receives per-PDF pipeline events.
    pub pipeline_progress: Option<PipelineProgress>,

    /// Receives per-stage orchestrator events.
    pub research_progress: Option<ResearchProgress>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            web_search_model: "sonar".to_string(),
            pdf_results_per_query: 5,
            bucket: DEFAULT_BUCKET.to_string(),
            key_strategy: StorageKeyStrategy::default(),
            limits: PipelineLimits::default(),
            download_dir: None,
            pipeline_progress: None,
            research_progress: None,
        }
    }
}

impl fmt::Debug for ResearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResearchConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("web_search_model", &self.web_search_model)
            .field("pdf_results_per_query", &self.pdf_results_per_query)
            .field("bucket", &self.bucket)
            .field("key_strategy", &self.key_strategy)
            .field("limits", &self.limits)
            .field("download_dir", &self.download_dir)
            .finish()
    }
}

impl ResearchConfig {
    /// Create a new builder for `ResearchConfig`.
    pub fn builder() -> ResearchConfigBuilder {
        ResearchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ResearchConfig`].
#[derive(Debug)]
pub struct ResearchConfigBuilder {
    config: ResearchConfig,
}

impl ResearchConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn web_search_model(mut self, model: impl Into<String>) -> Self {
        self.config.web_search_model = model.into();
        self
    }

    pub fn pdf_results_per_query(mut self, n: usize) -> Self {
        self.config.pdf_results_per_query = n;
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    pub fn key_strategy(mut self, strategy: StorageKeyStrategy) -> Self {
        self.config.key_strategy = strategy;
        self
    }

    pub fn max_pdfs(mut self, n: usize) -> Self {
        self.config.limits.max_pdfs = n;
        self
    }

    pub fn max_pdf_bytes(mut self, bytes: u64) -> Self {
        self.config.limits.max_pdf_bytes = bytes;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.limits.download_timeout_secs = secs;
        self
    }

    pub fn pipeline_deadline_secs(mut self, secs: u64) -> Self {
        self.config.limits.deadline_secs = secs;
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = Some(dir.into());
        self
    }

    pub fn pipeline_progress(mut self, cb: PipelineProgress) -> Self {
        self.config.pipeline_progress = Some(cb);
        self
    }

    pub fn research_progress(mut self, cb: ResearchProgress) -> Self {
        self.config.research_progress = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ResearchConfig, ResearchError> {
        let c = &self.config;
        if c.bucket.trim().is_empty() {
            return Err(ResearchError::InvalidConfig(
                "Bucket name must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ResearchError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ResearchError::InvalidConfig(
                "API timeout must be ≥ 1s".into(),
            ));
        }
        if c.pdf_results_per_query == 0 {
            return Err(ResearchError::InvalidConfig(
                "pdf_results_per_query must be ≥ 1".into(),
            ));
        }
        c.limits.validate()?;
        Ok(self.config)
    }
}

/// Explicit caps on what one pipeline run may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineLimits {
    /// URLs past this count are skipped without any network call. Default: 20.
    pub max_pdfs: usize,

    /// Largest body accepted for a single PDF. Default: 50 MiB.
    pub max_pdf_bytes: u64,

    /// Time budget for one download in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Time budget for the whole pipeline in seconds. Default: 600.
    pub deadline_secs: u64,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_pdfs: 20,
            max_pdf_bytes: 50 * 1024 * 1024,
            download_timeout_secs: 120,
            deadline_secs: 600,
        }
    }
}

impl PipelineLimits {
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.max_pdf_bytes == 0 {
            return Err(ResearchError::InvalidConfig(
                "max_pdf_bytes must be ≥ 1".into(),
            ));
        }
        if self.download_timeout_secs == 0 || self.deadline_secs == 0 {
            return Err(ResearchError::InvalidConfig(
                "Download timeout and pipeline deadline must be ≥ 1s".into(),
            ));
        }
        Ok(())
    }
}

/// How the object key of an uploaded PDF is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKeyStrategy {
    /// `<hash prefix>-<file name>`: distinct contents never share a key. (default)
    #[default]
    ContentHash,
    /// The bare file name taken from the URL. Two sources with the same
    /// trailing segment overwrite each other.
    FileName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ResearchConfig::default();
        assert_eq!(c.bucket, DEFAULT_BUCKET);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.key_strategy, StorageKeyStrategy::ContentHash);
        assert_eq!(c.limits.max_pdfs, 20);
        assert_eq!(c.limits.max_pdf_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = ResearchConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_empty_bucket() {
        let err = ResearchConfig::builder().bucket("  ").build().unwrap_err();
        assert!(matches!(err, ResearchError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_deadline() {
        let err = ResearchConfig::builder()
            .pipeline_deadline_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("deadline"));
    }

    #[test]
    fn max_pdfs_zero_is_allowed() {
        // Zero disables the PDF stage; every URL is reported as skipped.
        let c = ResearchConfig::builder().max_pdfs(0).build().unwrap();
        assert_eq!(c.limits.max_pdfs, 0);
    }

    #[test]
    fn debug_hides_provider() {
        let c = ResearchConfig::default();
        let s = format!("{c:?}");
        assert!(s.contains("ResearchConfig"));
        assert!(s.contains("supabasetestllm1"));
    }
}

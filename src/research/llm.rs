//! LLM interaction: build chat messages and call the provider.
//!
//! Every generation stage is one system + user exchange. The orchestrator
//! talks to a [`TextGenerator`] rather than to `edgequake-llm` directly, so
//! a session can be replayed against canned replies in tests.
//!
//! ## Retry Strategy
//!
//! A failed or timed-out call is retried `max_retries` times with
//! exponential backoff (`retry_backoff_ms * 2^(attempt-1)`). The default is
//! zero retries: a stage failure aborts the run.

use crate::config::{ResearchConfig, DEFAULT_MODEL};
use crate::error::{ResearchError, Stage};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Produces text for one stage from a system prompt and a user message.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, stage: Stage, system: &str, user: &str) -> Result<String, ResearchError>;
}

/// [`TextGenerator`] backed by an `edgequake-llm` provider.
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ResearchConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ResearchConfig) -> Result<Self, ResearchError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

/// Build `CompletionOptions` from the session config.
fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Longest pause between two attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(&self, stage: Stage, system: &str, user: &str) -> Result<String, ResearchError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let options = build_options(self.temperature, self.max_tokens);
        let limit = Duration::from_secs(self.api_timeout_secs);

        let mut last_err = ResearchError::stage(stage, "no attempt was made");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    stage, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(limit, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        stage,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    if response.content.trim().is_empty() {
                        last_err = ResearchError::stage(stage, "the model returned an empty reply");
                        warn!("{}: attempt {} returned nothing", stage, attempt + 1);
                        continue;
                    }
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed: {}", stage, attempt + 1, e);
                    last_err = ResearchError::stage(stage, e);
                }
                Err(_) => {
                    warn!("{}: attempt {} timed out", stage, attempt + 1);
                    last_err = ResearchError::LlmTimeout {
                        stage,
                        secs: self.api_timeout_secs,
                    };
                }
            }
        }

        Err(last_err)
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ResearchError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        ResearchError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), created through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, then full auto-detection via
///    [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &ResearchConfig) -> Result<Arc<dyn LLMProvider>, ResearchError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ResearchError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

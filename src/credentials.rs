//! Credentials for the external services.
//!
//! Values come from a JSON secrets file, from the environment, or both (the
//! file wins). They are held in a plain struct created once per session and
//! handed to the clients that need them; nothing is written back into the
//! process environment.
//!
//! The LLM key is not carried here: LLM providers are resolved by
//! `edgequake-llm`, which reads `OPENAI_API_KEY` and friends itself.

use crate::error::ResearchError;
use crate::storage::{ObjectStore, SupabaseStorage};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Secrets-file key → environment variable for each credential.
const PERPLEXITY: (&str, &str) = ("PERPLEXITY_APIKey", "PERPLEXITY_API_KEY");
const SERPER: (&str, &str) = ("SERPER_APIKey", "SERPER_API_KEY");
const SUPABASE_URL: (&str, &str) = ("SUPABASE_URL", "SUPABASE_URL");
const SUPABASE_KEY: (&str, &str) = ("SUPABASE_KEY", "SUPABASE_KEY");

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(rename = "PERPLEXITY_APIKey")]
    perplexity_api_key: Option<String>,
    #[serde(rename = "SERPER_APIKey")]
    serper_api_key: Option<String>,
    #[serde(rename = "SUPABASE_URL")]
    supabase_url: Option<String>,
    #[serde(rename = "SUPABASE_KEY")]
    supabase_key: Option<String>,
}

/// API keys and endpoints for search and storage.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub perplexity_api_key: Option<String>,
    pub serper_api_key: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "<set>");
        f.debug_struct("Credentials")
            .field("perplexity_api_key", &mask(&self.perplexity_api_key))
            .field("serper_api_key", &mask(&self.serper_api_key))
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &mask(&self.supabase_key))
            .finish()
    }
}

impl Credentials {
    /// Read every credential from its environment variable.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            perplexity_api_key: var(PERPLEXITY.1),
            serper_api_key: var(SERPER.1),
            supabase_url: var(SUPABASE_URL.1),
            supabase_key: var(SUPABASE_KEY.1),
        }
    }

    /// Read a JSON secrets file, filling gaps from the environment.
    pub fn from_secrets_file(path: impl AsRef<Path>) -> Result<Self, ResearchError> {
        let path = path.as_ref();
        let load_err = |detail: String| ResearchError::LoadFailed {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let file: SecretsFile = serde_json::from_str(&text).map_err(|e| load_err(e.to_string()))?;
        let nonempty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Ok(Self {
            perplexity_api_key: nonempty(file.perplexity_api_key),
            serper_api_key: nonempty(file.serper_api_key),
            supabase_url: nonempty(file.supabase_url),
            supabase_key: nonempty(file.supabase_key),
        }
        .or(Self::from_env()))
    }

    /// Fill every unset field from `other`.
    pub fn or(self, other: Self) -> Self {
        Self {
            perplexity_api_key: self.perplexity_api_key.or(other.perplexity_api_key),
            serper_api_key: self.serper_api_key.or(other.serper_api_key),
            supabase_url: self.supabase_url.or(other.supabase_url),
            supabase_key: self.supabase_key.or(other.supabase_key),
        }
    }

    pub fn perplexity(&self) -> Result<&str, ResearchError> {
        require(&self.perplexity_api_key, PERPLEXITY)
    }

    pub fn serper(&self) -> Result<&str, ResearchError> {
        require(&self.serper_api_key, SERPER)
    }

    /// Build the Supabase storage client from the URL and key.
    pub fn object_store(&self, timeout_secs: u64) -> Result<Arc<dyn ObjectStore>, ResearchError> {
        let url = require(&self.supabase_url, SUPABASE_URL)?;
        let key = require(&self.supabase_key, SUPABASE_KEY)?;
        let store = SupabaseStorage::new(url, key, timeout_secs)
            .map_err(|e| ResearchError::InvalidConfig(e.to_string()))?;
        Ok(Arc::new(store))
    }
}

fn require<'a>(value: &'a Option<String>, names: (&str, &str)) -> Result<&'a str, ResearchError> {
    value
        .as_deref()
        .ok_or_else(|| ResearchError::MissingCredential {
            name: names.0.to_string(),
            env_var: names.1.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_both_sources() {
        let c = Credentials::default();
        let err = c.serper().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("SERPER_APIKey"));
        assert!(msg.contains("SERPER_API_KEY"));
    }

    #[test]
    fn secrets_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(
            &path,
            r#"{"SERPER_APIKey": "serp", "PERPLEXITY_APIKey": "pplx",
                "SUPABASE_URL": "https://p.supabase.co", "SUPABASE_KEY": "sk",
                "OPENAI_APIKey": "ignored here"}"#,
        )
        .unwrap();
        let c = Credentials::from_secrets_file(&path).unwrap();
        assert_eq!(c.serper().unwrap(), "serp");
        assert_eq!(c.perplexity().unwrap(), "pplx");
        assert!(c.object_store(30).is_ok());
    }

    #[test]
    fn file_values_win_over_fallback() {
        let file = Credentials {
            serper_api_key: Some("file".into()),
            ..Default::default()
        };
        let env = Credentials {
            serper_api_key: Some("env".into()),
            perplexity_api_key: Some("env-pplx".into()),
            ..Default::default()
        };
        let merged = file.or(env);
        assert_eq!(merged.serper_api_key.as_deref(), Some("file"));
        assert_eq!(merged.perplexity_api_key.as_deref(), Some("env-pplx"));
    }

    #[test]
    fn debug_masks_keys() {
        let c = Credentials {
            supabase_key: Some("super-secret".into()),
            ..Default::default()
        };
        let s = format!("{c:?}");
        assert!(!s.contains("super-secret"));
        assert!(s.contains("<set>"));
    }

    #[test]
    fn object_store_requires_url_and_key() {
        let c = Credentials {
            supabase_url: Some("https://p.supabase.co".into()),
            ..Default::default()
        };
        assert!(matches!(
            c.object_store(30),
            Err(ResearchError::MissingCredential { .. })
        ));
    }
}

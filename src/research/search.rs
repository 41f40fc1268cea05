//! Web and PDF search clients.
//!
//! Two kinds of search feed the orchestrator:
//!
//! - [`WebSearch`] answers a natural-language query with prose plus
//!   citations (Perplexity's OpenAI-compatible chat endpoint).
//! - [`PdfSearch`] returns links to PDF documents for a query (Serper's
//!   Google search API with `filetype:pdf`).
//!
//! Both are traits so sessions can be driven by fakes in tests.

use crate::error::ResearchError;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const PERPLEXITY_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
pub const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// One answered web query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// The answers gathered for one plan section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionResults {
    pub section: String,
    pub results: Vec<SearchHit>,
}

/// All web search answers, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub sections: Vec<SectionResults>,
}

impl SearchResults {
    pub fn query_count(&self) -> usize {
        self.sections.iter().map(|s| s.results.len()).sum()
    }
}

/// A PDF link returned by document search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfLink {
    pub title: String,
    pub url: String,
}

/// Answers natural-language queries.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchHit, ResearchError>;
}

/// Finds PDF documents.
#[async_trait]
pub trait PdfSearch: Send + Sync {
    /// Up to `limit` PDF links for `query`, best first.
    async fn search_pdfs(&self, query: &str, limit: usize) -> Result<Vec<PdfLink>, ResearchError>;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ResearchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ResearchError::Internal(format!("HTTP client: {e}")))
}

/// Send a JSON POST and decode the JSON answer; failures come back as a message.
async fn post_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    body: serde_json::Value,
    service: &str,
) -> Result<T, String> {
    let response = request
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("{service} request failed: {e}"))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(format!("{service} returned HTTP {status}: {}", text.trim()));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| format!("{service} returned an unexpected body: {e}"))
}

// ── Perplexity ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Perplexity answer engine.
#[derive(Debug, Clone)]
pub struct PerplexitySearch {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl PerplexitySearch {
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, ResearchError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: PERPLEXITY_ENDPOINT.to_string(),
        })
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearch for PerplexitySearch {
    async fn search(&self, query: &str) -> Result<SearchHit, ResearchError> {
        debug!("Web search: {}", query);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "Be precise and concise. Cite your sources."},
                {"role": "user", "content": query},
            ],
        });
        let request = self.client.post(&self.endpoint).bearer_auth(&self.api_key);
        let completion: ChatCompletion = post_json(request, body, "Perplexity")
            .await
            .map_err(|e| ResearchError::stage(crate::error::Stage::WebSearch, e))?;

        let answer = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                ResearchError::stage(crate::error::Stage::WebSearch, "Perplexity returned no choices")
            })?;

        Ok(SearchHit {
            query: query.to_string(),
            answer,
            citations: completion.citations,
        })
    }
}

// ── Serper ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    link: String,
}

/// Google search through Serper, restricted to PDFs.
#[derive(Debug, Clone)]
pub struct SerperPdfSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SerperPdfSearch {
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self, ResearchError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key: api_key.to_string(),
            endpoint: SERPER_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl PdfSearch for SerperPdfSearch {
    async fn search_pdfs(&self, query: &str, limit: usize) -> Result<Vec<PdfLink>, ResearchError> {
        let q = pdf_query(query);
        debug!("PDF search: {}", q);
        let request = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key);
        let response: SerperResponse = post_json(request, json!({ "q": q, "num": limit }), "Serper")
            .await
            .map_err(|e| ResearchError::stage(crate::error::Stage::PdfSearch, e))?;

        Ok(response
            .organic
            .into_iter()
            .filter(|r| looks_like_pdf(&r.link))
            .take(limit)
            .map(|r| PdfLink {
                title: r.title,
                url: r.link,
            })
            .collect())
    }
}

/// Append `filetype:pdf` unless the query already restricts the file type.
pub fn pdf_query(query: &str) -> String {
    let q = query.trim();
    if q.to_lowercase().contains("filetype:pdf") {
        q.to_string()
    } else {
        format!("{q} filetype:pdf")
    }
}

/// Whether a search result link plausibly serves a PDF.
pub fn looks_like_pdf(link: &str) -> bool {
    match Url::parse(link) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let path = url.path().to_lowercase();
            path.ends_with(".pdf") || path.contains("/pdf/")
        }
        _ => false,
    }
}

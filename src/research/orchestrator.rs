//! The research session: plan, search, collect PDFs, write the report.
//!
//! ## Stages
//!
//! ```text
//!  UserContext
//!      │
//!      ▼
//!  system prompt ─► research plan ─► refine plan (≤ 1 pass)
//!                                        │
//!                                        ▼
//!  search queries (JSON object) ─► web search ─► preliminary report
//!                                                       │
//!                                                       ▼
//!  pdf search queries (JSON array) ─► pdf search ─► pdf pipeline
//!                                                       │
//!                                                       ▼
//!                          enhanced report ─► final markdown (cleaned)
//! ```
//!
//! Every stage awaits the previous one. A failing generation or search
//! stage aborts the run with a [`ResearchError`] naming it; per-PDF
//! failures inside the pipeline stage are recorded in the report instead.

use super::llm::{LlmGenerator, TextGenerator};
use super::search::{PdfLink, PdfSearch, PerplexitySearch, SearchResults, SectionResults, SerperPdfSearch, WebSearch};
use crate::config::ResearchConfig;
use crate::context::UserContext;
use crate::credentials::Credentials;
use crate::error::{ResearchError, Stage};
use crate::output::{PipelineReport, ResearchReport};
use crate::pipeline::PdfPipeline;
use crate::postprocess::{clean_markdown, extract_json};
use crate::progress::ResearchProgress;
use crate::prompts::{self, SourceDocument};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// File name used when the report is exported.
pub const REPORT_FILE_NAME: &str = "markdown_report.md";

/// MIME type of the exported report.
pub const REPORT_MIME: &str = "text/markdown";

// ── Plan review ──────────────────────────────────────────────────────────

/// Shown the generated plan once; may return feedback for a single revision.
#[async_trait]
pub trait PlanReviewer: Send + Sync {
    /// `None` (or blank feedback) keeps the plan as is.
    async fn review(&self, plan: &str) -> Option<String>;
}

/// Accepts every plan unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptPlan;

#[async_trait]
impl PlanReviewer for AcceptPlan {
    async fn review(&self, _plan: &str) -> Option<String> {
        None
    }
}

/// Returns the same feedback for any plan.
#[derive(Debug, Clone)]
pub struct FixedFeedback(pub String);

#[async_trait]
impl PlanReviewer for FixedFeedback {
    async fn review(&self, _plan: &str) -> Option<String> {
        Some(self.0.clone())
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Runs a full research session against injected services.
pub struct ResearchOrchestrator {
    generator: Arc<dyn TextGenerator>,
    web: Arc<dyn WebSearch>,
    pdf_search: Arc<dyn PdfSearch>,
    pipeline: PdfPipeline,
    reviewer: Arc<dyn PlanReviewer>,
    pdf_results_per_query: usize,
    progress: Option<ResearchProgress>,
}

impl ResearchOrchestrator {
    /// Assemble an orchestrator from its parts. Plans are accepted unchanged
    /// until [`with_reviewer`](Self::with_reviewer) is called.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        web: Arc<dyn WebSearch>,
        pdf_search: Arc<dyn PdfSearch>,
        store: Arc<dyn ObjectStore>,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            generator,
            web,
            pdf_search,
            pipeline: PdfPipeline::new(store, config),
            reviewer: Arc::new(AcceptPlan),
            pdf_results_per_query: config.pdf_results_per_query,
            progress: config.research_progress.clone(),
        }
    }

    /// Build the production services: the configured LLM, Perplexity, and
    /// Serper, storing PDFs into `store`.
    pub fn from_credentials(
        config: &ResearchConfig,
        credentials: &Credentials,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, ResearchError> {
        let generator = LlmGenerator::from_config(config)?;
        let web = PerplexitySearch::new(
            credentials.perplexity()?,
            &config.web_search_model,
            config.api_timeout_secs,
        )?;
        let pdf_search = SerperPdfSearch::new(credentials.serper()?, config.api_timeout_secs)?;
        Ok(Self::new(
            Arc::new(generator),
            Arc::new(web),
            Arc::new(pdf_search),
            store,
            config,
        ))
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn PlanReviewer>) -> Self {
        self.reviewer = reviewer;
        self
    }

    /// Run every stage for `ctx` and return everything produced.
    pub async fn run(&self, ctx: &UserContext) -> Result<ResearchReport, ResearchError> {
        info!(
            "Starting research: {} on '{}'",
            ctx.desired_output_type, ctx.topic_of_interest
        );
        let system = prompts::system_prompt(ctx);

        // ── Plan ─────────────────────────────────────────────────────────
        let plan = self
            .tracked(
                Stage::ResearchPlan,
                self.generator
                    .generate(Stage::ResearchPlan, &system, &prompts::research_plan(ctx)),
                |p: &String| format!("{} characters", p.len()),
            )
            .await?;

        let plan = self
            .tracked(
                Stage::RefinePlan,
                self.refine(&system, plan),
                |(_, revised): &(String, bool)| {
                    let summary = if *revised { "revised once" } else { "accepted as is" };
                    summary.to_string()
                },
            )
            .await?
            .0;

        // ── Web research ─────────────────────────────────────────────────
        let sections = self
            .tracked(
                Stage::SearchQueries,
                async {
                    let reply = self
                        .generator
                        .generate(Stage::SearchQueries, &system, &prompts::search_queries(&plan))
                        .await?;
                    parse_section_queries(&reply)
                },
                |s: &Vec<(String, Vec<String>)>| {
                    let queries: usize = s.iter().map(|(_, q)| q.len()).sum();
                    format!("{queries} queries across {} sections", s.len())
                },
            )
            .await?;

        let search_results = self
            .tracked(Stage::WebSearch, self.web_search(&sections), |r: &SearchResults| {
                format!("{} answers", r.query_count())
            })
            .await?;

        let preliminary_report = self
            .tracked(
                Stage::PreliminaryReport,
                self.generator.generate(
                    Stage::PreliminaryReport,
                    &system,
                    &prompts::preliminary_report(&plan, &search_results),
                ),
                |r: &String| format!("{} characters", r.len()),
            )
            .await?;

        // ── Documents ────────────────────────────────────────────────────
        let pdf_queries = self
            .tracked(
                Stage::PdfSearchQueries,
                async {
                    let reply = self
                        .generator
                        .generate(
                            Stage::PdfSearchQueries,
                            &system,
                            &prompts::pdf_search_queries(&preliminary_report, ctx),
                        )
                        .await?;
                    parse_query_list(&reply)
                },
                |q: &Vec<String>| format!("{} queries", q.len()),
            )
            .await?;

        let pdf_links = self
            .tracked(Stage::PdfSearch, self.find_pdfs(&pdf_queries), |l: &Vec<PdfLink>| {
                format!("{} PDF links", l.len())
            })
            .await?;

        let urls: Vec<String> = pdf_links.iter().map(|l| l.url.clone()).collect();
        let pdf_report = self
            .tracked(Stage::PdfPipeline, self.pipeline.run(&urls), |r: &PipelineReport| {
                format!("{}/{} stored", r.stats.uploaded, r.stats.total)
            })
            .await?;

        // ── Writing ──────────────────────────────────────────────────────
        let documents: Vec<SourceDocument<'_>> = pdf_report
            .uploaded()
            .map(|(outcome, stored)| SourceDocument {
                title: pdf_links
                    .iter()
                    .find(|l| l.url == outcome.url)
                    .map_or("", |l| l.title.as_str()),
                source_url: &outcome.url,
                stored,
            })
            .collect();

        let enhanced_report = self
            .tracked(
                Stage::EnhancedReport,
                self.generator.generate(
                    Stage::EnhancedReport,
                    &system,
                    &prompts::enhanced_report(&preliminary_report, &documents),
                ),
                |r: &String| format!("{} characters, {} documents", r.len(), documents.len()),
            )
            .await?;

        let markdown = self
            .tracked(
                Stage::FinalMarkdown,
                async {
                    let raw = self
                        .generator
                        .generate(
                            Stage::FinalMarkdown,
                            &system,
                            &prompts::final_markdown(&enhanced_report, &plan, ctx),
                        )
                        .await?;
                    Ok(clean_markdown(&raw))
                },
                |m: &String| format!("{} lines", m.lines().count()),
            )
            .await?;

        info!("Research complete");
        Ok(ResearchReport {
            plan,
            search_results,
            preliminary_report,
            pdf_queries,
            pdf_links,
            pdf_report,
            enhanced_report,
            markdown,
        })
    }

    /// Run `fut` as `stage`, reporting start, completion, and failure.
    async fn tracked<T, F>(
        &self,
        stage: Stage,
        fut: F,
        summary: impl FnOnce(&T) -> String,
    ) -> Result<T, ResearchError>
    where
        F: Future<Output = Result<T, ResearchError>>,
    {
        info!("Stage: {}", stage);
        if let Some(ref cb) = self.progress {
            cb.on_stage_start(stage);
        }
        match fut.await {
            Ok(value) => {
                let summary = summary(&value);
                debug!("{} done: {}", stage, summary);
                if let Some(ref cb) = self.progress {
                    cb.on_stage_complete(stage, &summary);
                }
                Ok(value)
            }
            Err(err) => {
                if let Some(ref cb) = self.progress {
                    cb.on_stage_error(stage, &err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Ask the reviewer once; revise the plan if they gave feedback.
    async fn refine(&self, system: &str, plan: String) -> Result<(String, bool), ResearchError> {
        match self.reviewer.review(&plan).await {
            Some(feedback) if !feedback.trim().is_empty() => {
                debug!("Refining plan with feedback: {}", feedback.trim());
                let revised = self
                    .generator
                    .generate(
                        Stage::RefinePlan,
                        system,
                        &prompts::refine_plan(&plan, feedback.trim()),
                    )
                    .await?;
                Ok((revised, true))
            }
            _ => Ok((plan, false)),
        }
    }

    async fn web_search(
        &self,
        sections: &[(String, Vec<String>)],
    ) -> Result<SearchResults, ResearchError> {
        let mut results = SearchResults::default();
        for (section, queries) in sections {
            let mut hits = Vec::with_capacity(queries.len());
            for query in queries {
                hits.push(
                    self.web
                        .search(query)
                        .await
                        .map_err(|e| in_stage(Stage::WebSearch, e))?,
                );
            }
            results.sections.push(SectionResults {
                section: section.clone(),
                results: hits,
            });
        }
        Ok(results)
    }

    /// Run every PDF query, keeping the first occurrence of each link.
    async fn find_pdfs(&self, queries: &[String]) -> Result<Vec<PdfLink>, ResearchError> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for query in queries {
            let found = self
                .pdf_search
                .search_pdfs(query, self.pdf_results_per_query)
                .await
                .map_err(|e| in_stage(Stage::PdfSearch, e))?;
            debug!("'{}': {} PDF links", query, found.len());
            links.extend(found.into_iter().filter(|l| seen.insert(l.url.clone())));
        }
        Ok(links)
    }
}

/// Attribute an error from a service call to `stage` unless it already names one.
fn in_stage(stage: Stage, err: ResearchError) -> ResearchError {
    match err {
        ResearchError::Stage { .. }
        | ResearchError::MalformedJson { .. }
        | ResearchError::LlmTimeout { .. } => err,
        other => ResearchError::stage(stage, other),
    }
}

// ── Reply parsing ────────────────────────────────────────────────────────

fn malformed(stage: Stage, detail: impl Into<String>) -> ResearchError {
    ResearchError::MalformedJson {
        stage,
        detail: detail.into(),
    }
}

fn parse_json(stage: Stage, reply: &str) -> Result<Value, ResearchError> {
    let payload = extract_json(reply).ok_or_else(|| malformed(stage, "no JSON found in reply"))?;
    serde_json::from_str(payload).map_err(|e| malformed(stage, e.to_string()))
}

/// Strings from a JSON value that is a string or an array of strings.
fn strings(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

fn non_blank(queries: Vec<String>) -> Vec<String> {
    queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

/// Parse `{"Section": ["query", ...], ...}`, keeping section order.
pub fn parse_section_queries(reply: &str) -> Result<Vec<(String, Vec<String>)>, ResearchError> {
    let stage = Stage::SearchQueries;
    let Value::Object(map) = parse_json(stage, reply)? else {
        return Err(malformed(stage, "expected an object of section → queries"));
    };

    let mut sections = Vec::with_capacity(map.len());
    for (section, value) in map {
        let queries = strings(&value).ok_or_else(|| {
            malformed(stage, format!("queries for '{section}' are not strings"))
        })?;
        let queries = non_blank(queries);
        if !queries.is_empty() {
            sections.push((section, queries));
        }
    }
    if sections.is_empty() {
        return Err(malformed(stage, "no search queries in reply"));
    }
    Ok(sections)
}

/// Parse `["query", ...]`. An empty list is valid.
pub fn parse_query_list(reply: &str) -> Result<Vec<String>, ResearchError> {
    let stage = Stage::PdfSearchQueries;
    match parse_json(stage, reply)? {
        value @ Value::Array(_) => strings(&value)
            .map(non_blank)
            .ok_or_else(|| malformed(stage, "array items must be strings")),
        _ => Err(malformed(stage, "expected an array of queries")),
    }
}

// ── Export ───────────────────────────────────────────────────────────────

/// Write `markdown` to `path` atomically (temp file, then rename).
pub async fn write_report(path: impl AsRef<Path>, markdown: &str) -> Result<(), ResearchError> {
    let path = path.as_ref();
    let write_err = |source| ResearchError::ReportWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    info!("Report written to {}", path.display());
    Ok(())
}

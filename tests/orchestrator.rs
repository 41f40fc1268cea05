//! Integration tests for the research orchestrator.
//!
//! The LLM and both search services are replaced by scripted fakes; PDFs are
//! served by an in-process axum server and stored in a `MemoryStore`.

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use policy_research::research::{PdfLink, SearchHit};
use policy_research::{
    FixedFeedback, MemoryStore, PdfSearch, PlanReviewer, ResearchConfig, ResearchError,
    ResearchOrchestrator, ResearchProgressCallback, Stage, TextGenerator, UserContext, WebSearch,
};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

const PDF: &[u8] = b"%PDF-1.7\n% IMF climate finance\n%%EOF\n";

#[derive(Default)]
struct ScriptedLlm {
    calls: Mutex<Vec<(Stage, String)>>,
    search_queries_reply: Option<String>,
}

impl ScriptedLlm {
    fn stages(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    fn prompt_for(&self, stage: Stage) -> String {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, p)| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedLlm {
    async fn generate(&self, stage: Stage, system: &str, user: &str) -> Result<String, ResearchError> {
        assert!(system.contains("research assistant"));
        self.calls.lock().unwrap().push((stage, user.to_string()));
        let reply = match stage {
            Stage::ResearchPlan => "## Background\n## Policy options".to_string(),
            Stage::RefinePlan => "## Background\n## Policy options\n## Costs".to_string(),
            Stage::SearchQueries => self.search_queries_reply.clone().unwrap_or_else(|| {
                "```json\n{\"Background\": [\"q1\", \"q2\"], \"Policy options\": [\"q3\"]}\n```"
                    .to_string()
            }),
            Stage::PreliminaryReport => "Preliminary findings.".to_string(),
            Stage::PdfSearchQueries => "[\"pdf one\", \"pdf two\"]".to_string(),
            Stage::EnhancedReport => "Enhanced findings.".to_string(),
            Stage::FinalMarkdown => {
                "```markdown\nHere is the report:\n# Final report\nBody\n```".to_string()
            }
            other => return Err(ResearchError::stage(other, "unexpected stage")),
        };
        Ok(reply)
    }
}

#[derive(Default)]
struct FakeWeb {
    queries: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl WebSearch for FakeWeb {
    async fn search(&self, query: &str) -> Result<SearchHit, ResearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(ResearchError::stage(Stage::WebSearch, "Perplexity returned HTTP 401"));
        }
        Ok(SearchHit {
            query: query.to_string(),
            answer: format!("answer to {query}"),
            citations: vec![format!("https://source.org/{query}")],
        })
    }
}

struct FakePdfSearch {
    base: String,
}

#[async_trait]
impl PdfSearch for FakePdfSearch {
    async fn search_pdfs(&self, query: &str, limit: usize) -> Result<Vec<PdfLink>, ResearchError> {
        assert_eq!(limit, 5);
        let link = |path: &str, title: &str| PdfLink {
            title: title.to_string(),
            url: format!("{}/{path}", self.base),
        };
        Ok(match query {
            "pdf one" => vec![link("imf.pdf", "IMF Climate Finance 2023"), link("gone.pdf", "Gone")],
            _ => vec![link("imf.pdf", "IMF Climate Finance 2023")],
        })
    }
}

#[derive(Default)]
struct StageLog(Mutex<Vec<String>>);

impl ResearchProgressCallback for StageLog {
    fn on_stage_start(&self, stage: Stage) {
        self.0.lock().unwrap().push(format!("start {stage}"));
    }

    fn on_stage_error(&self, stage: Stage, _error: &str) {
        self.0.lock().unwrap().push(format!("error {stage}"));
    }
}

async fn spawn_pdf_host() -> String {
    let app = Router::new()
        .route(
            "/imf.pdf",
            get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], PDF) }),
        )
        .route("/gone.pdf", get(|| async { StatusCode::NOT_FOUND }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct Harness {
    llm: Arc<ScriptedLlm>,
    web: Arc<FakeWeb>,
    store: Arc<MemoryStore>,
    log: Arc<StageLog>,
    orchestrator: ResearchOrchestrator,
}

async fn harness(llm: ScriptedLlm, web: FakeWeb, reviewer: Option<Arc<dyn PlanReviewer>>) -> Harness {
    let base = spawn_pdf_host().await;
    let llm = Arc::new(llm);
    let web = Arc::new(web);
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(StageLog::default());
    let config = ResearchConfig::builder()
        .bucket("reports")
        .research_progress(log.clone())
        .build()
        .unwrap();
    let mut orchestrator = ResearchOrchestrator::new(
        llm.clone(),
        web.clone(),
        Arc::new(FakePdfSearch { base }),
        store.clone(),
        &config,
    );
    if let Some(reviewer) = reviewer {
        orchestrator = orchestrator.with_reviewer(reviewer);
    }
    Harness {
        llm,
        web,
        store,
        log,
        orchestrator,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_executes_stages_in_order() {
    let h = harness(ScriptedLlm::default(), FakeWeb::default(), None).await;

    let report = h.orchestrator.run(&UserContext::default()).await.unwrap();

    assert_eq!(
        h.llm.stages(),
        vec![
            Stage::ResearchPlan,
            Stage::SearchQueries,
            Stage::PreliminaryReport,
            Stage::PdfSearchQueries,
            Stage::EnhancedReport,
            Stage::FinalMarkdown,
        ]
    );
    let started: Vec<String> = Stage::ALL.iter().map(|s| format!("start {s}")).collect();
    assert_eq!(*h.log.0.lock().unwrap(), started);

    assert_eq!(*h.web.queries.lock().unwrap(), vec!["q1", "q2", "q3"]);
    let sections: Vec<&str> = report
        .search_results
        .sections
        .iter()
        .map(|s| s.section.as_str())
        .collect();
    assert_eq!(sections, vec!["Background", "Policy options"]);

    assert_eq!(report.pdf_queries, vec!["pdf one", "pdf two"]);
    assert_eq!(report.pdf_links.len(), 2, "duplicate links are collected once");
    assert_eq!(report.pdf_report.stats.uploaded, 1);
    assert_eq!(report.pdf_report.stats.fetch_failed, 1);
    assert_eq!(h.store.keys("reports").len(), 1);

    let enhanced_prompt = h.llm.prompt_for(Stage::EnhancedReport);
    assert!(enhanced_prompt.contains("IMF Climate Finance 2023"));
    assert!(enhanced_prompt.contains("memory://reports/"));
    assert!(h.llm.prompt_for(Stage::PreliminaryReport).contains("answer to q3"));

    assert_eq!(report.plan, "## Background\n## Policy options");
    assert_eq!(report.markdown, "# Final report\nBody\n");
}

#[tokio::test]
async fn feedback_triggers_exactly_one_refinement() {
    let reviewer: Arc<dyn PlanReviewer> = Arc::new(FixedFeedback("Add a section on costs".into()));
    let h = harness(ScriptedLlm::default(), FakeWeb::default(), Some(reviewer)).await;

    let report = h.orchestrator.run(&UserContext::default()).await.unwrap();

    let refinements = h
        .llm
        .stages()
        .into_iter()
        .filter(|s| *s == Stage::RefinePlan)
        .count();
    assert_eq!(refinements, 1);
    assert!(h.llm.prompt_for(Stage::RefinePlan).contains("Add a section on costs"));
    assert!(report.plan.contains("## Costs"));
    assert!(h.llm.prompt_for(Stage::SearchQueries).contains("## Costs"));
}

#[tokio::test]
async fn blank_feedback_keeps_the_plan() {
    let reviewer: Arc<dyn PlanReviewer> = Arc::new(FixedFeedback("   ".into()));
    let h = harness(ScriptedLlm::default(), FakeWeb::default(), Some(reviewer)).await;

    let report = h.orchestrator.run(&UserContext::default()).await.unwrap();

    assert!(!h.llm.stages().contains(&Stage::RefinePlan));
    assert_eq!(report.plan, "## Background\n## Policy options");
}

#[tokio::test]
async fn web_search_failure_aborts_the_run() {
    let web = FakeWeb {
        fail: true,
        ..Default::default()
    };
    let h = harness(ScriptedLlm::default(), web, None).await;

    let err = h.orchestrator.run(&UserContext::default()).await.unwrap_err();

    assert!(matches!(err, ResearchError::Stage { stage: Stage::WebSearch, .. }));
    assert!(err.to_string().contains("web search"));
    assert_eq!(h.web.queries.lock().unwrap().len(), 1);
    assert!(!h.llm.stages().contains(&Stage::PreliminaryReport));
    assert_eq!(h.store.upload_count(), 0);
    assert_eq!(
        h.log.0.lock().unwrap().last().map(String::as_str),
        Some("error web search")
    );
}

#[tokio::test]
async fn malformed_query_json_aborts_the_run() {
    let llm = ScriptedLlm {
        search_queries_reply: Some("Sorry, I cannot produce queries for this plan.".into()),
        ..Default::default()
    };
    let h = harness(llm, FakeWeb::default(), None).await;

    let err = h.orchestrator.run(&UserContext::default()).await.unwrap_err();

    assert!(matches!(
        err,
        ResearchError::MalformedJson { stage: Stage::SearchQueries, .. }
    ));
    assert!(h.web.queries.lock().unwrap().is_empty());
}

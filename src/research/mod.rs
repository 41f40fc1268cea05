//! The research session and the services it drives.
//!
//! - [`llm`]: text generation through `edgequake-llm`, with retry and timeout
//! - [`search`]: web answers (Perplexity) and PDF discovery (Serper)
//! - [`orchestrator`]: the ordered stages that turn a user context into a report

pub mod llm;
pub mod orchestrator;
pub mod search;

pub use llm::{resolve_provider, LlmGenerator, TextGenerator};
pub use orchestrator::{
    parse_query_list, parse_section_queries, write_report, AcceptPlan, FixedFeedback,
    PlanReviewer, ResearchOrchestrator, REPORT_FILE_NAME, REPORT_MIME,
};
pub use search::{
    PdfLink, PdfSearch, PerplexitySearch, SearchHit, SearchResults, SectionResults,
    SerperPdfSearch, WebSearch,
};

//! Prompts for every generation stage of a research session.
//!
//! All prompt text lives here so wording can change without touching the
//! orchestration or retry code, and so tests can inspect what the model is
//! asked without calling it. Each builder returns the user message for one
//! stage; the session-wide system prompt comes from [`system_prompt`].

use crate::context::UserContext;
use crate::output::UploadedPdf;
use crate::research::search::SearchResults;

/// Build the persona/system prompt from the user context.
pub fn system_prompt(ctx: &UserContext) -> String {
    format!(
        "You are a meticulous research assistant supporting a {job} who works at {workplace}.\n\
         They are preparing a {output} on \"{topic}\" in the {sector} sector for {audience}.\n\
         Their work is inspired by {inspiration}.\n\
         Prefer these sources: {sources}. Focus on material published in {dates}.\n\
         What they already know: {known}\n\
         What they want to learn: {gaps}\n\n\
         Write with the rigour of a policy professional: cite sources, separate evidence \
         from interpretation, and flag uncertainty explicitly.",
        job = ctx.user_job,
        workplace = ctx.user_workplace,
        output = ctx.desired_output_type.label().to_lowercase(),
        topic = ctx.topic_of_interest,
        sector = ctx.sector_of_interest,
        audience = ctx.report_audience,
        inspiration = ctx.report_inspiration,
        sources = ctx.sources_focus_search,
        dates = ctx.sources_date_focus_search,
        known = ctx.existing_knowledge,
        gaps = ctx.knowledge_gaps,
    )
}

/// Ask for a section-by-section research plan.
pub fn research_plan(ctx: &UserContext) -> String {
    format!(
        "Draft a research plan for a {output} whose structure and tone follow {inspiration}.\n\
         List the sections in order. For each section give a one-line purpose and the key \
         questions it must answer. Use Markdown headings (##) for sections.",
        output = ctx.desired_output_type.label(),
        inspiration = ctx.report_inspiration,
    )
}

/// Ask for one revision of `plan` that applies the user's `feedback`.
pub fn refine_plan(plan: &str, feedback: &str) -> String {
    format!(
        "Here is the current research plan:\n\n{plan}\n\n\
         The user reviewed it and asked for these changes:\n\n{feedback}\n\n\
         Return the full revised plan in the same format. Change only what the feedback requires."
    )
}

/// Ask for a JSON object mapping each plan section to web search queries.
pub fn search_queries(plan: &str) -> String {
    format!(
        "For the research plan below, write web search queries that would gather the evidence \
         each section needs.\n\n{plan}\n\n\
         Answer with JSON only: an object whose keys are the section titles and whose values \
         are arrays of 1 to 3 query strings. Example: {{\"Background\": [\"query one\", \"query two\"]}}"
    )
}

/// Ask for a preliminary report grounded in the search answers.
pub fn preliminary_report(plan: &str, results: &SearchResults) -> String {
    let mut evidence = String::new();
    for section in &results.sections {
        evidence.push_str(&format!("### {}\n", section.section));
        for hit in &section.results {
            evidence.push_str(&format!("Query: {}\n{}\n", hit.query, hit.answer.trim()));
            for citation in &hit.citations {
                evidence.push_str(&format!("- source: {citation}\n"));
            }
            evidence.push('\n');
        }
    }
    format!(
        "Write a preliminary report that follows this plan:\n\n{plan}\n\n\
         Ground every claim in the search evidence below and cite the sources inline as \
         Markdown links. Where the evidence is thin, say so.\n\n## Evidence\n\n{evidence}"
    )
}

/// Ask for Google-style queries that would surface relevant PDF reports.
pub fn pdf_search_queries(report: &str, ctx: &UserContext) -> String {
    format!(
        "Based on the preliminary report below, propose up to 5 search queries that would find \
         authoritative PDF publications ({sources}, {dates}) to deepen it.\n\n{report}\n\n\
         Answer with JSON only: an array of query strings. Do not add \"filetype:pdf\"; it is \
         appended automatically.",
        sources = ctx.sources_focus_search,
        dates = ctx.sources_date_focus_search,
    )
}

/// A stored PDF offered to the model as a citable source.
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument<'a> {
    /// Title from the search result; may be empty.
    pub title: &'a str,
    pub source_url: &'a str,
    pub stored: &'a UploadedPdf,
}

/// Ask for the preliminary report to be strengthened with the collected documents.
pub fn enhanced_report(report: &str, documents: &[SourceDocument<'_>]) -> String {
    let list = if documents.is_empty() {
        "(no documents could be collected; keep the report as is, tightening the prose)".to_string()
    } else {
        documents
            .iter()
            .map(|d| {
                let title = if d.title.trim().is_empty() { d.stored.key.as_str() } else { d.title.trim() };
                format!("- {} (original: {}, archived: {})", title, d.source_url, d.stored.public_url)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Improve the preliminary report below using the collected PDF documents as additional \
         sources. Where a document is relevant, add the evidence it likely contains and cite it \
         with its archived link.\n\n## Preliminary report\n\n{report}\n\n## Collected documents\n\n{list}"
    )
}

/// Ask for the final, publication-ready Markdown.
pub fn final_markdown(enhanced: &str, plan: &str, ctx: &UserContext) -> String {
    format!(
        "Produce the final {output} in Markdown for {audience}.\n\
         Follow the section order of the plan, start with a single # title, include an executive \
         summary, and end with a ## References section listing every cited link.\n\
         Output only the Markdown document.\n\n## Plan\n\n{plan}\n\n## Draft\n\n{enhanced}",
        output = ctx.desired_output_type.label().to_lowercase(),
        audience = ctx.report_audience,
    )
}

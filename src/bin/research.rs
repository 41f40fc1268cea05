//! CLI binary for policy-research.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ResearchConfig` / `UserContext` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use policy_research::config::DEFAULT_BUCKET;
use policy_research::{
    write_report, Credentials, FixedFeedback, MemoryStore, ObjectStore, OutputType, PdfPipeline,
    PdfStatus, PipelineProgressCallback, PlanReviewer, ResearchConfig, ResearchOrchestrator,
    ResearchProgressCallback, Sector, Stage, StorageKeyStrategy, UserContext, REPORT_FILE_NAME,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let cut: String = msg.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        msg.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner naming the running stage, switched to a
/// counted bar while PDFs are collected, with one log line per event.
struct CliProgress {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let progress = Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        });
        progress.spinner("Preparing", "…");
        progress.bar.enable_steady_tick(Duration::from_millis(80));
        progress
    }

    fn spinner(&self, prefix: &str, msg: &str) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix.to_string());
        self.bar.set_message(msg.to_string());
    }

    fn counter(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} PDFs  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Collecting");
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ResearchProgressCallback for CliProgress {
    fn on_stage_start(&self, stage: Stage) {
        self.spinner("Research", &format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, summary: &str) {
        self.bar.println(format!(
            "{} {:<20} {}",
            green("✓"),
            stage.name(),
            dim(summary)
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        self.bar.println(format!(
            "{} {:<20} {}",
            red("✗"),
            stage.name(),
            red(&truncate(error, 100))
        ));
    }
}

impl PipelineProgressCallback for CliProgress {
    fn on_pipeline_start(&self, total: usize) {
        if total > 0 {
            self.counter(total);
        }
    }

    fn on_pdf_start(&self, _index: usize, _total: usize, url: &str) {
        self.bar.set_message(truncate(url, 60));
    }

    fn on_pdf_uploaded(&self, index: usize, total: usize, public_url: &str) {
        self.bar.println(format!(
            "  {} PDF {:>2}/{:<2}  {}",
            green("✓"),
            index + 1,
            total,
            dim(public_url)
        ));
        self.bar.inc(1);
    }

    fn on_pdf_error(&self, index: usize, total: usize, error: &str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} PDF {:>2}/{:<2}  {}",
            red("✗"),
            index + 1,
            total,
            red(&truncate(error, 90))
        ));
        self.bar.inc(1);
    }

    fn on_pipeline_complete(&self, total: usize, uploaded: usize) {
        let failed = self.failures.load(Ordering::SeqCst);
        self.bar.println(format!(
            "{} {}/{} PDFs stored{}",
            if uploaded == total { green("✔") } else { cyan("⚠") },
            bold(&uploaded.to_string()),
            total,
            if failed > 0 { format!("  ({} failed or skipped)", red(&failed.to_string())) } else { String::new() }
        ));
        self.spinner("Research", "…");
    }
}

// ── Plan review from the terminal ────────────────────────────────────────────

/// Prints the plan and reads feedback from stdin until an empty line.
struct StdinReviewer {
    bar: Option<ProgressBar>,
}

impl StdinReviewer {
    fn prompt(plan: &str) -> Option<String> {
        eprintln!("\n{}\n\n{}\n", bold("Proposed research plan:"), plan.trim());
        eprintln!(
            "{}",
            cyan("Suggest changes (finish with an empty line; empty input keeps the plan):")
        );
        let stdin = io::stdin();
        let mut feedback = Vec::new();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                break;
            }
            feedback.push(line);
        }
        let feedback = feedback.join("\n");
        (!feedback.trim().is_empty()).then_some(feedback)
    }
}

#[async_trait::async_trait]
impl PlanReviewer for StdinReviewer {
    async fn review(&self, plan: &str) -> Option<String> {
        tokio::task::block_in_place(|| match &self.bar {
            Some(bar) => bar.suspend(|| Self::prompt(plan)),
            None => Self::prompt(plan),
        })
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full research run with the default profile, report in markdown_report.md
  research run

  # Policy brief on climate finance, plan feedback typed interactively
  research run --output-type "policy brief" --sector "climate finance" --interactive

  # Profile from a JSON file, report to stdout, PDFs kept in memory only
  research run --context profile.json -o - --dry-run

  # Write a profile template to edit
  research context > profile.json

  # Collect PDFs into a bucket without running the research stages
  research pdfs https://www.imf.org/a.pdf https://www.adb.org/b.pdf --bucket policy-pdfs

SECRETS FILE (--secrets):
  {
    "PERPLEXITY_APIKey": "...",
    "SERPER_APIKey": "...",
    "SUPABASE_URL": "https://<project>.supabase.co",
    "SUPABASE_KEY": "..."
  }

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (or ANTHROPIC_API_KEY, GEMINI_API_KEY, …)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PERPLEXITY_API_KEY      Web search
  SERPER_API_KEY          PDF search
  SUPABASE_URL            Object storage project URL
  SUPABASE_KEY            Object storage key
"#;

/// Plan, search, collect PDFs, and write a cited Markdown report.
#[derive(Parser, Debug)]
#[command(
    name = "research",
    version,
    about = "LLM-driven policy research: plan, search, collect PDFs, write a report",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full research session.
    Run(RunArgs),
    /// Fetch PDFs and upload them to storage, without the research stages.
    Pdfs(PdfsArgs),
    /// Print the effective user context as JSON.
    Context(ContextArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON secrets file with search and storage credentials.
    #[arg(long, global = true, env = "RESEARCH_SECRETS")]
    secrets: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "RESEARCH_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max LLM output tokens per stage.
    #[arg(long, global = true, env = "RESEARCH_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Retries per LLM call.
    #[arg(long, global = true, env = "RESEARCH_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-call timeout for LLM, search, and storage requests, in seconds.
    #[arg(long, global = true, env = "RESEARCH_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Storage bucket receiving the PDFs.
    #[arg(long, global = true, env = "RESEARCH_BUCKET", default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// How object keys are chosen: hash (content hash + name) or name.
    #[arg(long, global = true, env = "RESEARCH_KEY_STRATEGY", value_enum, default_value = "hash")]
    key_strategy: KeyStrategyArg,

    /// Maximum number of PDFs collected per run.
    #[arg(long, global = true, env = "RESEARCH_MAX_PDFS", default_value_t = 20)]
    max_pdfs: usize,

    /// Largest accepted PDF, in megabytes.
    #[arg(long, global = true, env = "RESEARCH_MAX_PDF_MB", default_value_t = 50)]
    max_pdf_mb: u64,

    /// Per-PDF download timeout in seconds.
    #[arg(long, global = true, env = "RESEARCH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Time budget for the whole PDF collection, in seconds.
    #[arg(long, global = true, env = "RESEARCH_PIPELINE_DEADLINE", default_value_t = 600)]
    deadline: u64,

    /// Keep downloaded PDFs in this directory (default: a temp dir removed afterwards).
    #[arg(long, global = true, env = "RESEARCH_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, global = true, env = "RESEARCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RESEARCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RESEARCH_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KeyStrategyArg {
    Hash,
    Name,
}

impl From<KeyStrategyArg> for StorageKeyStrategy {
    fn from(v: KeyStrategyArg) -> Self {
        match v {
            KeyStrategyArg::Hash => StorageKeyStrategy::ContentHash,
            KeyStrategyArg::Name => StorageKeyStrategy::FileName,
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    context: ContextArgs,

    /// Write the report here; `-` prints it to stdout.
    #[arg(short, long, env = "RESEARCH_OUTPUT", default_value = REPORT_FILE_NAME)]
    output: PathBuf,

    /// Feedback applied to the generated plan (one revision).
    #[arg(long, conflicts_with = "interactive")]
    feedback: Option<String>,

    /// Show the plan and read feedback from stdin.
    #[arg(long)]
    interactive: bool,

    /// Keep PDFs in memory instead of uploading them to Supabase.
    #[arg(long)]
    dry_run: bool,

    /// Print the whole session (plan, search results, PDFs, report) as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PdfsArgs {
    /// PDF URLs, processed in order.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Print the pipeline report as JSON.
    #[arg(long)]
    json: bool,

    /// Keep PDFs in memory instead of uploading them to Supabase.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct ContextArgs {
    /// JSON file with the user context; flags below override its fields.
    #[arg(long, env = "RESEARCH_CONTEXT")]
    context: Option<PathBuf>,

    /// Your role, e.g. "Policy Analyst".
    #[arg(long)]
    user_job: Option<String>,

    /// What your organisation does (not its name).
    #[arg(long)]
    user_workplace: Option<String>,

    /// Who will read the report.
    #[arg(long)]
    audience: Option<String>,

    /// Reports whose structure and tone to follow.
    #[arg(long)]
    inspiration: Option<String>,

    /// Preferred sources.
    #[arg(long)]
    sources: Option<String>,

    /// Publication period to focus on, e.g. 2020-2024.
    #[arg(long)]
    dates: Option<String>,

    /// Memo, Report, Policy Brief, Landscape Analysis, Research Paper, Other.
    #[arg(long, value_parser = parse_output_type)]
    output_type: Option<OutputType>,

    /// Carbon Markets, Renewable Energy, Sustainable Agriculture, Climate Finance, Biodiversity, Other.
    #[arg(long, value_parser = parse_sector)]
    sector: Option<Sector>,

    /// Topic of interest (default derived from the sector).
    #[arg(long)]
    topic: Option<String>,

    /// What you already know.
    #[arg(long)]
    known: Option<String>,

    /// What you want to learn.
    #[arg(long)]
    gaps: Option<String>,
}

fn parse_output_type(s: &str) -> std::result::Result<OutputType, String> {
    s.parse().map_err(|e: policy_research::ResearchError| e.to_string())
}

fn parse_sector(s: &str) -> std::result::Result<Sector, String> {
    s.parse().map_err(|e: policy_research::ResearchError| e.to_string())
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let common = &cli.common;

    let json = match &cli.command {
        Command::Run(args) => args.json,
        Command::Pdfs(args) => args.json,
        Command::Context(_) => true,
    };

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active;
    // the bar already reports every stage.
    let show_progress = !common.quiet && !common.no_progress && !json;
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Context(args) => {
            let ctx = build_context(args)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&ctx).context("Failed to serialise context")?
            );
            Ok(())
        }
        Command::Pdfs(args) => run_pdfs(common, args, show_progress).await,
        Command::Run(args) => run_research(common, args, show_progress).await,
    }
}

async fn run_research(common: &CommonArgs, args: &RunArgs, show_progress: bool) -> Result<()> {
    let ctx = build_context(&args.context)?;
    let progress = show_progress.then(CliProgress::new);
    let config = build_config(common, progress.clone())?;
    let credentials = load_credentials(common)?;
    let store = open_store(&credentials, &config, args.dry_run)?;

    let reviewer: Option<Arc<dyn PlanReviewer>> = if args.interactive {
        Some(Arc::new(StdinReviewer {
            bar: progress.as_ref().map(|p| p.bar.clone()),
        }))
    } else {
        args.feedback
            .clone()
            .map(|f| Arc::new(FixedFeedback(f)) as Arc<dyn PlanReviewer>)
    };

    let mut orchestrator = ResearchOrchestrator::from_credentials(&config, &credentials, store)
        .context("Failed to set up the research services")?;
    if let Some(reviewer) = reviewer {
        orchestrator = orchestrator.with_reviewer(reviewer);
    }

    let result = orchestrator.run(&ctx).await;
    if let Some(ref p) = progress {
        p.finish();
    }
    let report = result.context("Research failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if args.output == Path::new("-") {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(report.markdown.as_bytes())
            .context("Failed to write to stdout")?;
    } else {
        write_report(&args.output, &report.markdown)
            .await
            .context("Failed to write report")?;
        if !common.quiet {
            eprintln!(
                "{}  {} sections researched  {}/{} PDFs stored  →  {}",
                green("✔"),
                report.search_results.sections.len(),
                report.pdf_report.stats.uploaded,
                report.pdf_report.stats.total,
                bold(&args.output.display().to_string()),
            );
        }
    }
    Ok(())
}

async fn run_pdfs(common: &CommonArgs, args: &PdfsArgs, show_progress: bool) -> Result<()> {
    let progress = show_progress.then(CliProgress::new);
    let config = build_config(common, progress.clone())?;
    let credentials = load_credentials(common)?;
    let store = open_store(&credentials, &config, args.dry_run)?;

    let pipeline = PdfPipeline::new(store, &config);
    let result = pipeline.run(&args.urls).await;
    if let Some(ref p) = progress {
        p.finish();
    }
    let report = result.context("PDF pipeline failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    for outcome in &report.outcomes {
        match &outcome.status {
            PdfStatus::Uploaded(u) => println!("{}\t{}\t{}", green("ok"), outcome.url, u.public_url),
            PdfStatus::Skipped { reason } => println!("{}\t{}\t{}", dim("skipped"), outcome.url, reason),
            _ => println!(
                "{}\t{}\t{}",
                red("failed"),
                outcome.url,
                outcome.error_message().unwrap_or_default()
            ),
        }
    }
    if !common.quiet {
        eprintln!(
            "{}/{} uploaded in {}ms",
            report.stats.uploaded, report.stats.total, report.stats.duration_ms
        );
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Map CLI args to `ResearchConfig`.
fn build_config(common: &CommonArgs, progress: Option<Arc<CliProgress>>) -> Result<ResearchConfig> {
    let mut builder = ResearchConfig::builder()
        .temperature(common.temperature)
        .max_tokens(common.max_tokens)
        .max_retries(common.max_retries)
        .api_timeout_secs(common.api_timeout)
        .bucket(common.bucket.clone())
        .key_strategy(common.key_strategy.into())
        .max_pdfs(common.max_pdfs)
        .max_pdf_bytes(common.max_pdf_mb.saturating_mul(1024 * 1024))
        .download_timeout_secs(common.download_timeout)
        .pipeline_deadline_secs(common.deadline);

    if let Some(ref model) = common.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = common.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref dir) = common.download_dir {
        builder = builder.download_dir(dir.clone());
    }
    if let Some(p) = progress {
        builder = builder
            .pipeline_progress(p.clone())
            .research_progress(p);
    }

    builder.build().context("Invalid configuration")
}

/// Context file (or defaults for the chosen sector) with flag overrides applied.
fn build_context(args: &ContextArgs) -> Result<UserContext> {
    let mut ctx = match &args.context {
        Some(path) => UserContext::load(path)?,
        None => UserContext::for_sector(args.sector.unwrap_or_default()),
    };

    let set = |field: &mut String, value: &Option<String>| {
        if let Some(v) = value {
            *field = v.clone();
        }
    };
    set(&mut ctx.user_job, &args.user_job);
    set(&mut ctx.user_workplace, &args.user_workplace);
    set(&mut ctx.report_audience, &args.audience);
    set(&mut ctx.report_inspiration, &args.inspiration);
    set(&mut ctx.sources_focus_search, &args.sources);
    set(&mut ctx.sources_date_focus_search, &args.dates);
    set(&mut ctx.existing_knowledge, &args.known);
    set(&mut ctx.knowledge_gaps, &args.gaps);
    if let Some(t) = args.output_type {
        ctx.desired_output_type = t;
    }
    // Sector before topic: a default topic follows the sector, an explicit one wins.
    if let Some(s) = args.sector {
        ctx.set_sector(s);
    }
    set(&mut ctx.topic_of_interest, &args.topic);
    Ok(ctx)
}

fn load_credentials(common: &CommonArgs) -> Result<Credentials> {
    match &common.secrets {
        Some(path) => Credentials::from_secrets_file(path).context("Failed to read secrets"),
        None => Ok(Credentials::from_env()),
    }
}

fn open_store(
    credentials: &Credentials,
    config: &ResearchConfig,
    dry_run: bool,
) -> Result<Arc<dyn ObjectStore>> {
    if dry_run {
        return Ok(Arc::new(MemoryStore::new()));
    }
    credentials
        .object_store(config.api_timeout_secs)
        .context("Object storage is not configured (use --dry-run to keep PDFs in memory)")
}

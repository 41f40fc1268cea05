//! Streaming pipeline API: emit each PDF outcome as soon as it is known.
//!
//! [`PdfPipeline::run`] returns only after every URL is handled.
//! [`process_pdfs_stream`] yields the same [`PdfOutcome`]s one by one, in
//! input order, so a caller can show results while later downloads are
//! still running. Items are still processed one at a time, and the next
//! download only starts when the stream is polled again.
//!
//! The download directory lives as long as the stream. Dropping the stream
//! cancels the remaining items and removes a temporary directory.

use crate::error::ResearchError;
use crate::output::PdfOutcome;
use crate::pipeline::{PdfFetcher, PdfPipeline};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-URL outcomes.
pub type PdfStream = Pin<Box<dyn Stream<Item = PdfOutcome> + Send>>;

/// Run the pipeline over `urls`, streaming outcomes in input order.
///
/// `on_pipeline_start` fires before this returns. `on_pipeline_complete`
/// is not emitted; the stream ending is the completion signal.
///
/// # Example
/// ```rust,no_run
/// use policy_research::{process_pdfs_stream, MemoryStore, PdfPipeline, ResearchConfig};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = PdfPipeline::new(Arc::new(MemoryStore::new()), &ResearchConfig::default());
/// let urls = vec!["https://www.imf.org/report.pdf".to_string()];
/// let mut outcomes = process_pdfs_stream(&pipeline, urls).await?;
/// while let Some(outcome) = outcomes.next().await {
///     match outcome.public_url() {
///         Some(url) => println!("{} -> {}", outcome.url, url),
///         None => eprintln!("{}: {:?}", outcome.url, outcome.error_message()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process_pdfs_stream(
    pipeline: &PdfPipeline,
    urls: Vec<String>,
) -> Result<PdfStream, ResearchError> {
    let total = urls.len();
    if let Some(cb) = pipeline.progress() {
        cb.on_pipeline_start(total);
    }
    if urls.is_empty() {
        return Ok(Box::pin(stream::empty()));
    }

    info!("Streaming {} PDF URLs", total);
    let dir = Arc::new(pipeline.open_download_dir().await?);
    let fetcher = PdfFetcher::new(dir.path(), pipeline.limits())?;
    let pipeline = pipeline.clone();
    let started = Instant::now();

    let s = stream::iter(urls.into_iter().enumerate()).then(move |(index, url)| {
        let pipeline = pipeline.clone();
        let fetcher = fetcher.clone();
        let dir = Arc::clone(&dir);
        async move {
            let outcome = pipeline
                .process_one(&fetcher, index, total, &url, started)
                .await;
            drop(dir);
            outcome
        }
    });

    Ok(Box::pin(s))
}

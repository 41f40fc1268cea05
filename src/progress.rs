//! Progress-callback traits for pipeline and orchestrator events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::ResearchConfigBuilder::pipeline_progress`] to hear about
//! each PDF as it is fetched and uploaded, and an
//! [`Arc<dyn ResearchProgressCallback>`] via
//! [`crate::config::ResearchConfigBuilder::research_progress`] to follow the
//! orchestrator stage by stage. The CLI drives its progress bar from these;
//! a web front end could forward them to a socket instead.
//!
//! # Example
//!
//! ```rust
//! use policy_research::{PipelineProgressCallback, ResearchConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Uploaded(AtomicUsize);
//!
//! impl PipelineProgressCallback for Uploaded {
//!     fn on_pdf_uploaded(&self, _index: usize, _total: usize, public_url: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("stored at {public_url}");
//!     }
//! }
//!
//! let config = ResearchConfig::builder()
//!     .pipeline_progress(Arc::new(Uploaded(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the PDF pipeline as it processes each URL.
///
/// Items are processed one at a time, so calls never overlap, but the trait
/// is `Send + Sync` so implementations can live inside an `Arc` shared with
/// the host application. All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first URL is touched.
    ///
    /// # Arguments
    /// * `total` — number of URLs in the input list (including ones that will be skipped)
    fn on_pipeline_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before the download of an item starts.
    ///
    /// `index` is 0-based in input order.
    fn on_pdf_start(&self, index: usize, total: usize, url: &str) {
        let _ = (index, total, url);
    }

    /// Called when the PDF has been written locally.
    fn on_pdf_fetched(&self, index: usize, total: usize, path: &Path, bytes: u64) {
        let _ = (index, total, path, bytes);
    }

    /// Called when the PDF is in the bucket and has a public URL.
    fn on_pdf_uploaded(&self, index: usize, total: usize, public_url: &str) {
        let _ = (index, total, public_url);
    }

    /// Called when the item failed (download or upload) or was skipped.
    fn on_pdf_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every URL has an outcome.
    fn on_pipeline_complete(&self, total: usize, uploaded: usize) {
        let _ = (total, uploaded);
    }
}

/// Called by the orchestrator around each stage.
pub trait ResearchProgressCallback: Send + Sync {
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// `summary` is a short human-readable note, e.g. "7 queries".
    fn on_stage_complete(&self, stage: Stage, summary: &str) {
        let _ = (stage, summary);
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl PipelineProgressCallback for NoopProgress {}
impl ResearchProgressCallback for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::ResearchConfig`].
pub type PipelineProgress = Arc<dyn PipelineProgressCallback>;

/// Convenience alias matching the type stored in [`crate::config::ResearchConfig`].
pub type ResearchProgress = Arc<dyn ResearchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tracking {
        starts: AtomicUsize,
        uploads: AtomicUsize,
        errors: AtomicUsize,
        stages: Mutex<Vec<Stage>>,
    }

    impl PipelineProgressCallback for Tracking {
        fn on_pdf_start(&self, _index: usize, _total: usize, _url: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_pdf_uploaded(&self, _index: usize, _total: usize, _public_url: &str) {
            self.uploads.fetch_add(1, Ordering::SeqCst);
        }

        fn on_pdf_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ResearchProgressCallback for Tracking {
        fn on_stage_complete(&self, stage: Stage, _summary: &str) {
            self.stages.lock().unwrap().push(stage);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgress;
        PipelineProgressCallback::on_pipeline_start(&cb, 2);
        cb.on_pdf_start(0, 2, "https://x/a.pdf");
        cb.on_pdf_fetched(0, 2, Path::new("/tmp/a.pdf"), 10);
        cb.on_pdf_uploaded(0, 2, "https://store/a.pdf");
        cb.on_pdf_error(1, 2, "HTTP 404");
        cb.on_pipeline_complete(2, 1);
        cb.on_stage_start(Stage::WebSearch);
        cb.on_stage_error(Stage::WebSearch, "boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = Tracking::default();
        t.on_pdf_start(0, 2, "a");
        t.on_pdf_uploaded(0, 2, "u");
        t.on_pdf_start(1, 2, "b");
        t.on_pdf_error(1, 2, "e");
        t.on_stage_complete(Stage::ResearchPlan, "ok");

        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*t.stages.lock().unwrap(), vec![Stage::ResearchPlan]);
    }

    #[test]
    fn arc_dyn_callbacks_work() {
        let p: PipelineProgress = Arc::new(NoopProgress);
        p.on_pipeline_start(3);
        let r: ResearchProgress = Arc::new(NoopProgress);
        r.on_stage_start(Stage::PdfPipeline);
    }
}

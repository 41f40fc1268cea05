//! The PDF pipeline: collect discovered documents into object storage.
//!
//! Each submodule implements one step, so each can be tested on its own and
//! the storage backend can be swapped without touching the download logic.
//!
//! ## Data Flow
//!
//! ```text
//! URL ──▶ fetch ──▶ upload ──▶ PdfOutcome
//!        (reqwest)  (ObjectStore)
//! ```
//!
//! 1. [`fetch`]  — download into the run's directory, enforcing size and time caps
//! 2. [`upload`] — store under a derived key and resolve the public URL
//! 3. [`run`]    — the sequential loop over a URL list, with count and deadline limits

pub mod fetch;
pub mod run;
pub mod upload;

pub use fetch::{LocalPdf, PdfFetcher};
pub use run::{DownloadDir, PdfPipeline};
pub use upload::{storage_key, PdfUploader, UploadResult};

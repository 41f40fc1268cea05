//! Integration tests for the PDF pipeline.
//!
//! An in-process axum server stands in for the PDF hosts and for the
//! Supabase Storage REST API, so these tests need no network access and no
//! credentials.

use async_trait::async_trait;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use policy_research::storage::StorageResult;
use policy_research::{
    process_pdfs_stream, FetchError, MemoryStore, ObjectStore, PdfFetcher, PdfPipeline, PdfStatus,
    PipelineLimits, ResearchConfig, SkipReason, StorageKeyStrategy, SupabaseStorage, UploadError,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ── Test server ──────────────────────────────────────────────────────────────

const PDF_A: &[u8] = b"%PDF-1.7\n% report A\n%%EOF\n";
const PDF_ONE: &[u8] = b"%PDF-1.4\n% first source\n%%EOF\n";
const PDF_TWO: &[u8] = b"%PDF-1.4\n% second source, different bytes\n%%EOF\n";

/// Objects received by the fake storage API, keyed by `bucket/key`.
type Received = Arc<Mutex<BTreeMap<String, (Vec<u8>, String)>>>;

fn pdf(bytes: &'static [u8]) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], bytes)
}

async fn storage_upload(
    State(received): State<Received>,
    UrlPath((bucket, key)): UrlPath<(String, String)>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if bucket == "missing" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"statusCode": "404", "error": "Bucket not found", "message": "Bucket not found"})),
        );
    }
    let authorised = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer service-key");
    if !authorised || headers.get("apikey").is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized", "message": "Invalid key"})),
        );
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    received
        .lock()
        .unwrap()
        .insert(format!("{bucket}/{key}"), (body.to_vec(), content_type));
    (StatusCode::OK, Json(json!({"Key": format!("{bucket}/{key}")})))
}

async fn spawn_server() -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route("/a.pdf", get(|| async { pdf(PDF_A) }))
        .route("/bad", get(|| async { StatusCode::NOT_FOUND }))
        .route("/one/report.pdf", get(|| async { pdf(PDF_ONE) }))
        .route("/two/report.pdf", get(|| async { pdf(PDF_TWO) }))
        .route("/big.pdf", get(|| async { vec![b'x'; 64 * 1024] }))
        .route(
            "/slow.pdf",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                pdf(PDF_A)
            }),
        )
        .route("/storage/v1/object/:bucket/*key", post(storage_upload))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), received)
}

fn memory_pipeline(config: &ResearchConfig) -> (PdfPipeline, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (PdfPipeline::new(store.clone(), config), store)
}

// ── Fetch ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_writes_exactly_the_served_bytes() {
    let (base, _) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = PdfFetcher::new(dir.path(), &PipelineLimits::default()).unwrap();

    let local = fetcher.fetch(&format!("{base}/a.pdf")).await.unwrap();

    assert!(local.path.starts_with(dir.path()));
    assert_eq!(local.file_name(), "a.pdf");
    assert_eq!(std::fs::read(&local.path).unwrap(), PDF_A);
    assert_eq!(local.bytes, PDF_A.len() as u64);
}

#[tokio::test]
async fn fetch_failures_carry_a_message_and_no_file() {
    let (base, _) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = PdfFetcher::new(dir.path(), &PipelineLimits::default()).unwrap();

    let err = fetcher.fetch(&format!("{base}/bad")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { .. }), "got {err:?}");
    assert!(err.to_string().contains("404"));

    let err = fetcher
        .fetch("http://no-such-host.invalid/a.pdf")
        .await
        .unwrap_err();
    assert!(!err.to_string().is_empty());

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn success_and_failure_are_reported_in_input_order() {
    let (base, _) = spawn_server().await;
    let (pipeline, store) = memory_pipeline(&ResearchConfig::default());
    let urls = vec![format!("{base}/a.pdf"), format!("{base}/bad")];

    let report = pipeline.run(&urls).await.unwrap();

    assert_eq!(report.outcomes.len(), 2);
    let first = &report.outcomes[0];
    assert_eq!(first.url, urls[0]);
    let uploaded = match &first.status {
        PdfStatus::Uploaded(u) => u,
        other => panic!("expected upload, got {other:?}"),
    };
    assert!(first.public_url().unwrap().starts_with("memory://"));
    assert!(first.error_message().is_none());
    assert_eq!(store.get(&uploaded.bucket, &uploaded.key).unwrap(), PDF_A);

    let second = &report.outcomes[1];
    assert_eq!(second.url, urls[1]);
    assert!(matches!(second.status, PdfStatus::FetchFailed { .. }));
    assert!(second.public_url().is_none());
    assert!(!second.error_message().unwrap().is_empty());

    assert_eq!(report.stats.uploaded, 1);
    assert_eq!(report.stats.fetch_failed, 1);
    assert_eq!(store.upload_count(), 1);
}

#[tokio::test]
async fn local_paths_are_reported_only_for_kept_downloads() {
    let (base, _) = spawn_server().await;
    let url = format!("{base}/a.pdf");

    let (temp_run, _) = memory_pipeline(&ResearchConfig::default());
    let report = temp_run.run(&[url.clone()]).await.unwrap();
    let (_, uploaded) = report.uploaded().next().unwrap();
    assert_eq!(uploaded.local_path, None);

    let root = tempfile::tempdir().unwrap();
    let config = ResearchConfig::builder()
        .download_dir(root.path().join("pdfs"))
        .build()
        .unwrap();
    let (kept_run, _) = memory_pipeline(&config);
    let report = kept_run.run(&[url]).await.unwrap();
    let (_, uploaded) = report.uploaded().next().unwrap();
    let path = uploaded.local_path.as_ref().unwrap();
    assert_eq!(std::fs::read(path).unwrap(), PDF_A);
}

#[tokio::test]
async fn file_name_keys_overwrite_same_named_sources() {
    let (base, _) = spawn_server().await;
    let config = ResearchConfig::builder()
        .bucket("docs")
        .key_strategy(StorageKeyStrategy::FileName)
        .build()
        .unwrap();
    let (pipeline, store) = memory_pipeline(&config);
    let urls = vec![format!("{base}/one/report.pdf"), format!("{base}/two/report.pdf")];

    let report = pipeline.run(&urls).await.unwrap();

    assert_eq!(report.stats.uploaded, 2);
    assert_eq!(store.keys("docs"), vec!["report.pdf".to_string()]);
    assert_eq!(store.get("docs", "report.pdf").unwrap(), PDF_TWO);
    assert_eq!(
        report.outcomes[0].public_url(),
        report.outcomes[1].public_url()
    );
}

#[tokio::test]
async fn content_hash_keys_keep_distinct_sources_apart() {
    let (base, _) = spawn_server().await;
    let config = ResearchConfig::builder().bucket("docs").build().unwrap();
    let (pipeline, store) = memory_pipeline(&config);
    let urls = vec![format!("{base}/one/report.pdf"), format!("{base}/two/report.pdf")];

    pipeline.run(&urls).await.unwrap();

    let keys = store.keys("docs");
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.ends_with("-report.pdf")));
}

#[tokio::test]
async fn empty_list_touches_nothing() {
    let (pipeline, store) = memory_pipeline(&ResearchConfig::default());
    let report = pipeline.run(&[]).await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(store.upload_count(), 0);
}

#[tokio::test]
async fn oversize_bodies_fail() {
    let (base, _) = spawn_server().await;
    let config = ResearchConfig::builder().max_pdf_bytes(1024).build().unwrap();
    let (pipeline, store) = memory_pipeline(&config);

    let report = pipeline.run(&[format!("{base}/big.pdf")]).await.unwrap();

    match &report.outcomes[0].status {
        PdfStatus::FetchFailed { error } => {
            assert!(matches!(error, FetchError::TooLarge { limit: 1024, .. }))
        }
        other => panic!("expected fetch failure, got {other:?}"),
    }
    assert_eq!(store.upload_count(), 0);
}

#[tokio::test]
async fn count_limit_skips_the_tail() {
    let (base, _) = spawn_server().await;
    let config = ResearchConfig::builder().max_pdfs(1).build().unwrap();
    let (pipeline, _) = memory_pipeline(&config);
    let urls = vec![format!("{base}/a.pdf"), format!("{base}/one/report.pdf")];

    let report = pipeline.run(&urls).await.unwrap();

    assert!(report.outcomes[0].is_uploaded());
    assert!(matches!(
        report.outcomes[1].status,
        PdfStatus::Skipped { reason: SkipReason::LimitReached }
    ));
}

#[tokio::test]
async fn exhausted_deadline_skips_the_remainder() {
    let (base, _) = spawn_server().await;
    let config = ResearchConfig::builder()
        .pipeline_deadline_secs(1)
        .build()
        .unwrap();
    let (pipeline, _) = memory_pipeline(&config);
    let urls = vec![format!("{base}/slow.pdf"), format!("{base}/a.pdf")];

    let report = pipeline.run(&urls).await.unwrap();

    match &report.outcomes[0].status {
        PdfStatus::FetchFailed { error } => {
            assert!(matches!(error, FetchError::Timeout { .. }), "got {error:?}")
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(matches!(
        report.outcomes[1].status,
        PdfStatus::Skipped { reason: SkipReason::DeadlineExceeded }
    ));
}

/// Accepts uploads, but only after a long pause.
struct SlowStore;

#[async_trait]
impl ObjectStore for SlowStore {
    async fn upload(
        &self,
        _bucket: &str,
        _key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<()> {
        tokio::time::sleep(Duration::from_secs(4)).await;
        Ok(())
    }

    async fn public_url(&self, bucket: &str, key: &str) -> StorageResult<String> {
        Ok(format!("slow://{bucket}/{key}"))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn deadline_bounds_the_upload_too() {
    let (base, _) = spawn_server().await;
    let config = ResearchConfig::builder()
        .pipeline_deadline_secs(1)
        .build()
        .unwrap();
    let pipeline = PdfPipeline::new(Arc::new(SlowStore), &config);

    let started = Instant::now();
    let report = pipeline.run(&[format!("{base}/a.pdf")]).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(1500), "run took {elapsed:?}");
    match &report.outcomes[0].status {
        PdfStatus::UploadFailed { error, .. } => {
            assert!(matches!(error, UploadError::Timeout { .. }), "got {error:?}")
        }
        other => panic!("expected upload timeout, got {other:?}"),
    }
    assert_eq!(report.stats.uploaded, 0);
    assert_eq!(report.stats.upload_failed, 1);
}

#[tokio::test]
async fn stream_yields_outcomes_in_order() {
    let (base, _) = spawn_server().await;
    let (pipeline, _) = memory_pipeline(&ResearchConfig::default());
    let urls = vec![format!("{base}/bad"), format!("{base}/a.pdf")];

    let outcomes: Vec<_> = process_pdfs_stream(&pipeline, urls)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].index, 0);
    assert!(matches!(outcomes[0].status, PdfStatus::FetchFailed { .. }));
    assert!(outcomes[1].is_uploaded());
}

// ── Supabase ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn supabase_upload_sends_bytes_and_returns_public_url() {
    let (base, received) = spawn_server().await;
    let store = Arc::new(SupabaseStorage::new(&base, "service-key", 10).unwrap());
    let config = ResearchConfig::builder()
        .bucket("policy-pdfs")
        .key_strategy(StorageKeyStrategy::FileName)
        .build()
        .unwrap();
    let pipeline = PdfPipeline::new(store, &config);

    let report = pipeline.run(&[format!("{base}/a.pdf")]).await.unwrap();

    assert_eq!(
        report.outcomes[0].public_url(),
        Some(format!("{base}/storage/v1/object/public/policy-pdfs/a.pdf").as_str())
    );
    let received = received.lock().unwrap();
    let (bytes, content_type) = received.get("policy-pdfs/a.pdf").unwrap();
    assert_eq!(bytes, PDF_A);
    assert_eq!(content_type, "application/pdf");
}

#[tokio::test]
async fn supabase_rejection_is_an_upload_failure() {
    let (base, _) = spawn_server().await;
    let store = Arc::new(SupabaseStorage::new(&base, "service-key", 10).unwrap());
    let config = ResearchConfig::builder().bucket("missing").build().unwrap();
    let pipeline = PdfPipeline::new(store, &config);

    let report = pipeline
        .run(&[format!("{base}/a.pdf"), format!("{base}/one/report.pdf")])
        .await
        .unwrap();

    assert_eq!(report.stats.upload_failed, 2);
    assert_eq!(
        report.stats.bytes_downloaded,
        (PDF_A.len() + PDF_ONE.len()) as u64
    );
    for outcome in &report.outcomes {
        assert!(outcome.public_url().is_none());
        assert!(outcome.error_message().unwrap().contains("Bucket not found"));
    }
}

#[tokio::test]
async fn supabase_bad_key_is_rejected() {
    let (base, received) = spawn_server().await;
    let store = Arc::new(SupabaseStorage::new(&base, "wrong", 10).unwrap());
    let pipeline = PdfPipeline::new(store, &ResearchConfig::default());

    let report = pipeline.run(&[format!("{base}/a.pdf")]).await.unwrap();

    assert!(matches!(
        report.outcomes[0].status,
        PdfStatus::UploadFailed { .. }
    ));
    assert!(received.lock().unwrap().is_empty());
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use podsight::application::ports::{
    SourceError, SourceFetcher, SpeechToText, SttError, Summarizer, SummarizerError,
};
use podsight::application::services::{
    AdmissionController, AnalysisPipeline, PipelineGate, Segmenter, TranscriptionPool,
};
use podsight::domain::SpeechSegment;
use podsight::presentation::{AppState, Settings, create_router};

struct MockFetcher {
    resolved: Option<String>,
}

#[async_trait::async_trait]
impl SourceFetcher for MockFetcher {
    async fn resolve(&self, url: &str) -> Result<String, SourceError> {
        match &self.resolved {
            Some(resolved) => Ok(resolved.clone()),
            None => Err(SourceError::Unresolvable(url.to_string())),
        }
    }

    async fn download(
        &self,
        _url: &str,
        _dest: &Path,
        _cancel: &CancellationToken,
    ) -> Result<u64, SourceError> {
        Err(SourceError::DownloadFailed("not wired in this test".to_string()))
    }
}

struct MockStt;

#[async_trait::async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _language: &str,
    ) -> Result<Vec<SpeechSegment>, SttError> {
        Ok(vec![SpeechSegment::new(0.0, 1.0, "ok.")])
    }
}

struct MockSummarizer;

#[async_trait::async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, _transcript: &str) -> Result<Value, SummarizerError> {
        Ok(json!({"title": "T"}))
    }
}

fn build_state(resolved: Option<String>) -> AppState {
    let work = tempdir().unwrap();
    let work_dir = work.keep();

    let mut settings = Settings::default();
    settings.pipeline.work_dir = work_dir.clone();

    let admission = Arc::new(AdmissionController::new(work_dir.clone()));
    let gate = Arc::new(PipelineGate::new(2));
    let fetcher = Arc::new(MockFetcher { resolved });
    let pool = TranscriptionPool::new(Arc::new(MockStt), 2, 1, Duration::from_millis(10));
    let segmenter = Segmenter::new(
        work_dir.clone(),
        "/nonexistent/segmenter".to_string(),
        600,
        45,
        Duration::from_secs(1),
    );

    let pipeline = Arc::new(AnalysisPipeline::new(
        Arc::clone(&admission),
        Arc::clone(&gate),
        fetcher.clone(),
        Arc::new(MockSummarizer),
        pool,
        segmenter,
        work_dir,
    ));

    AppState {
        pipeline,
        admission,
        fetcher,
        settings,
    }
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn given_running_server_when_health_check_then_returns_ok() {
    let app = create_router(build_state(None));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn given_empty_url_when_analyze_url_then_returns_bad_request() {
    let app = create_router(build_state(None));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/analyze/url")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"url": "  "}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"], "No url provided");
}

#[tokio::test]
async fn given_missing_body_when_analyze_url_then_returns_client_error() {
    let app = create_router(build_state(None));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/analyze/url")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test(flavor = "multi_thread")]
async fn given_unresolvable_url_when_analyze_url_then_sse_stream_ends_in_error() {
    let app = create_router(build_state(None));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/analyze/url")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"url": "https://podcasts.example.com/ep1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    // The stream closes after the terminal event, so the body is finite.
    let body = body_string(response).await;
    assert!(body.contains(r#""stage":"received""#));
    assert!(body.contains(r#""stage":"error""#));
    assert!(!body.contains(r#""stage":"completed""#));
}

#[tokio::test]
async fn given_upload_without_file_when_analyze_upload_then_returns_bad_request() {
    let app = create_router(build_state(None));

    let boundary = "xyz";
    let empty_multipart = format!("--{boundary}--\r\n");
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/analyze/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(empty_multipart))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test(flavor = "multi_thread")]
async fn given_multi_megabyte_upload_when_analyze_upload_then_accepted() {
    let app = create_router(build_state(None));

    let boundary = "podsight-upload";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"episode.mp3\"\r\nContent-Type: audio/mpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&vec![0u8; 3 * 1024 * 1024]);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/analyze/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    // A long-form audio file must clear the body limit and start a job,
    // not bounce off multipart parsing.
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let stream = body_string(response).await;
    assert!(stream.contains(r#""stage":"received""#));
}

#[tokio::test]
async fn given_resolvable_url_when_resolve_then_returns_direct_url() {
    let app = create_router(build_state(Some(
        "https://cdn.example.com/episode.m4a".to_string(),
    )));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/resolve?url=https://podcasts.example.com/ep1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["resolved_url"], "https://cdn.example.com/episode.m4a");
}

#[tokio::test]
async fn given_unresolvable_url_when_resolve_then_returns_bad_request() {
    let app = create_router(build_state(None));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/resolve?url=https://podcasts.example.com/ep1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn given_request_without_id_when_any_endpoint_then_response_carries_request_id() {
    let app = create_router(build_state(None));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn given_request_with_id_when_any_endpoint_then_response_echoes_it() {
    let app = create_router(build_state(None));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-42"
    );
}

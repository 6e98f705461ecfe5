use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::{AudioSource, ClientKey, Job, JobId, ProgressEvent};
use crate::presentation::state::AppState;

const CLIENT_KEY_HEADER: &str = "x-client-key";
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

#[derive(Deserialize)]
pub struct AnalyzeUrlRequest {
    pub url: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[tracing::instrument(skip(state, headers, request))]
pub async fn analyze_url_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeUrlRequest>,
) -> Response {
    if request.url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "No url provided".to_string(),
            }),
        )
            .into_response();
    }

    let job_id = JobId::new();
    let client_key = client_key_from_headers(&headers, &job_id);
    let language = request
        .language
        .unwrap_or_else(|| state.settings.stt.language.clone());

    let job = Job {
        id: job_id,
        client_key: client_key.clone(),
        source: AudioSource::RemoteUrl(request.url),
        language,
        created_at: Utc::now(),
    };

    tracing::info!(
        job_id = %job_id.as_uuid(),
        client_key = %client_key.as_str(),
        "Url analysis job admitted"
    );

    spawn_pipeline(&state, job, &client_key).into_response()
}

#[tracing::instrument(skip(state, headers, multipart))]
pub async fn analyze_upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => {
            tracing::warn!("Upload request with no file");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "No file uploaded".to_string(),
                }),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to read multipart");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Failed to read multipart: {}", e),
                }),
            )
                .into_response();
        }
    };

    let extension = field
        .file_name()
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_string()))
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(char::is_alphanumeric))
        .unwrap_or_else(|| "mp3".to_string());

    let data = match field.bytes().await {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read upload bytes");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Failed to read file: {}", e),
                }),
            )
                .into_response();
        }
    };

    let job_id = JobId::new();
    let client_key = client_key_from_headers(&headers, &job_id);

    let dest = state
        .settings
        .pipeline
        .work_dir
        .join(format!("{}_source.{}", job_id.as_prefix(), extension));
    if let Err(e) = tokio::fs::write(&dest, &data).await {
        tracing::error!(error = %e, "Failed to stage uploaded file");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to stage upload: {}", e),
            }),
        )
            .into_response();
    }

    let job = Job {
        id: job_id,
        client_key: client_key.clone(),
        source: AudioSource::LocalFile(dest),
        language: state.settings.stt.language.clone(),
        created_at: Utc::now(),
    };

    tracing::info!(
        job_id = %job_id.as_uuid(),
        client_key = %client_key.as_str(),
        bytes = data.len(),
        "Upload analysis job admitted"
    );

    spawn_pipeline(&state, job, &client_key).into_response()
}

/// Admits the job (superseding any active job for the same client),
/// starts the pipeline task, and returns its progress stream.
fn spawn_pipeline(
    state: &AppState,
    job: Job,
    client_key: &ClientKey,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let cancel = state.admission.admit(client_key, job.id);
    let (tx, rx) = mpsc::channel::<ProgressEvent>(PROGRESS_CHANNEL_CAPACITY);

    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        pipeline.run(job, cancel, tx).await;
    });

    sse_response(rx)
}

/// One SSE frame per progress event; the stream ends after the
/// terminal event.
fn sse_response(
    mut rx: mpsc::Receiver<ProgressEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.stage.is_terminal();
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok::<_, Infallible>(Event::default().data(json));
            if terminal {
                break;
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Authenticated callers carry their user id in `x-client-key`;
/// anyone else gets a key derived from the session token.
fn client_key_from_headers(headers: &HeaderMap, job_id: &JobId) -> ClientKey {
    headers
        .get(CLIENT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(ClientKey::authenticated)
        .unwrap_or_else(|| ClientKey::anonymous(job_id))
}

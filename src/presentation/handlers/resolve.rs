use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::presentation::state::AppState;

use super::analyze::ErrorResponse;

#[derive(Deserialize)]
pub struct ResolveParams {
    pub url: String,
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub resolved_url: String,
}

/// Resolves a share-page URL to a direct audio URL without starting a
/// job, so clients can validate input up front.
#[tracing::instrument(skip(state, params), fields(url = %params.url))]
pub async fn resolve_handler(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> impl IntoResponse {
    match state.fetcher.resolve(&params.url).await {
        Ok(resolved_url) => (StatusCode::OK, Json(ResolveResponse { resolved_url })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Audio url resolution failed");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

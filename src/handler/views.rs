use crate::app::AppState;
use crate::domain::{ViewStatus, ViewerId};
use crate::error::TrendingError;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const VIEWER_HEADER: &str = "x-viewer-id";

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ViewStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ViewResponse {
    fn accepted(status: ViewStatus) -> Self {
        Self {
            success: true,
            status: Some(status),
            error: None,
        }
    }

    fn failed(err: &TrendingError) -> Self {
        Self {
            success: false,
            status: None,
            error: Some(err.to_string()),
        }
    }
}

fn failure(err: &TrendingError) -> (StatusCode, Json<ViewResponse>) {
    let status = match err {
        TrendingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        TrendingError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ViewResponse::failed(err)))
}

fn viewer_from_headers(headers: &HeaderMap) -> Result<ViewerId, TrendingError> {
    headers
        .get(VIEWER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| TrendingError::InvalidArgument(format!("missing {VIEWER_HEADER} header")))?
        .parse()
}

/// Handler for POST /v1/articles/{id}/views
///
/// Returns as soon as the view is accepted; the increment itself lands after
/// the settle delay and its failures are only logged.
pub async fn record_view_handler(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(e) => return failure(&e),
    };

    match state.record_view(&viewer, &raw_id).await {
        Ok(status) => (StatusCode::OK, Json(ViewResponse::accepted(status))),
        Err(e) => {
            warn!(article = %raw_id, error = %e, "Rejected article view");
            failure(&e)
        }
    }
}

/// Handler for DELETE /v1/viewers/{viewer}/views
///
/// Tears down the viewer's context, dropping views still inside their settle delay.
pub async fn close_viewer_handler(
    State(state): State<Arc<AppState>>,
    Path(raw_viewer): Path<String>,
) -> Result<StatusCode, TrendingError> {
    let viewer: ViewerId = raw_viewer.parse()?;
    if state.viewers.close(&viewer) {
        debug!(%viewer, "viewer context closed");
    }
    Ok(StatusCode::NO_CONTENT)
}

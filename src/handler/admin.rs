use crate::app::AppState;
use crate::scheduler::{RunReport, SchedulerState};
use axum::Json;
use axum::extract::State;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Handler for POST /v1/admin/rotate
///
/// Runs the archival job immediately, independent of the daily schedule.
/// Still refused while another run holds the lease.
pub async fn rotate_handler(State(state): State<Arc<AppState>>) -> Json<RunReport> {
    info!("Manual archival run requested");
    let (report, _) = state
        .archival
        .run_once(Utc::now(), SchedulerState::default())
        .await;
    Json(report)
}

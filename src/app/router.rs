use crate::app::AppState;
use crate::handler::admin::rotate_handler;
use crate::handler::health::health_handler;
use crate::handler::trending::trending_handler;
use crate::handler::views::{close_viewer_handler, record_view_handler};
use axum::Router;
use axum::routing::{delete, get, post};
use std::sync::Arc;

/// Build the HTTP router (health, trending reads, view signals, admin).
pub fn main_router(state: Arc<AppState>) -> Router {
    let v1_health_router = Router::new().route("/v1/health", get(health_handler));

    let v1_ranking_router = Router::new()
        .route("/v1/trending", get(trending_handler))
        .route("/v1/articles/{id}/views", post(record_view_handler))
        .route("/v1/viewers/{viewer}/views", delete(close_viewer_handler))
        .route("/v1/admin/rotate", post(rotate_handler))
        .with_state(state);

    Router::new()
        .merge(v1_health_router)
        .merge(v1_ranking_router)
}

use crate::app::AppState;
use crate::domain::{ArticleSummary, RankingWindow};
use crate::error::TrendingError;
use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    pub period: Option<String>,
    pub limit: Option<usize>,
}

/// Handler for GET /v1/trending?period=daily&limit=10
///
/// A store outage degrades to an empty list; only a malformed period is an error.
pub async fn trending_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<Vec<ArticleSummary>>, TrendingError> {
    let period = match query.period.as_deref() {
        Some(raw) => raw.parse::<RankingWindow>()?,
        None => RankingWindow::Daily,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    match state.trending.trending_articles(period, limit).await {
        Ok(list) => Ok(Json(list)),
        Err(e) => {
            error!(%period, error = %e, "Failed to load trending articles");
            Ok(Json(Vec::new()))
        }
    }
}

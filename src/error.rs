use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrendingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Ranking store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Rotation of window {window} failed: {reason}")]
    PartialRotationFailure { window: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    Config(String),

    #[error("Failed to bind to address {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

impl TrendingError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for TrendingError {
    fn into_response(self) -> Response {
        let status = match self {
            TrendingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            TrendingError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

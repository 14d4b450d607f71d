use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::config;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum HealthcheckError {
    #[error("Healthcheck configuration invalid: {0}")]
    Config(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Health endpoint {url} unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Health endpoint {url} returned status {status}")]
    Unhealthy { url: String, status: StatusCode },
}

/// Probe the local server on the port it was configured with (`HTTP_PORT`).
pub async fn healthcheck() -> Result<(), HealthcheckError> {
    let port = config::http_port().map_err(|e| HealthcheckError::Config(e.to_string()))?;
    healthcheck_with_port(port).await
}

pub async fn healthcheck_with_port(port: u16) -> Result<(), HealthcheckError> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(HealthcheckError::Client)?;

    let url = health_url(port);
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|source| HealthcheckError::Unreachable {
            url: url.clone(),
            source,
        })?;

    match resp.status() {
        status if status.is_success() => Ok(()),
        status => Err(HealthcheckError::Unhealthy { url, status }),
    }
}

fn health_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/v1/health")
}

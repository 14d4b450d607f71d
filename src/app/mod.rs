mod router;
pub mod server;
mod state;
pub mod tracing;

pub use router::main_router;
pub use state::{AppState, ServiceOptions};

use crate::config;
use crate::error::TrendingError;
use crate::scheduler::{ArchivalDaemon, DailyCadence};
use chrono::FixedOffset;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application entry point. Initializes tracing, configuration, the archival
/// daemon and the HTTP server.
pub async fn run() -> Result<(), TrendingError> {
    // Handle healthcheck subcommand (for Docker healthcheck in distroless image)
    if std::env::args().nth(1).as_deref() == Some("healthcheck") {
        match crate::healthcheck().await {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("Healthcheck failed: {e}");
                std::process::exit(1)
            }
        }
    }

    tracing::init_tracing();

    let settings =
        config::get_configuration().map_err(|e| TrendingError::Config(e.to_string()))?;
    ::tracing::info!(backend = ?settings.store_backend, "Loaded settings");

    let app_state = Arc::new(AppState::from_settings(&settings).await?);

    // Shared shutdown token: used by the archival daemon and the server
    let shutdown_token = CancellationToken::new();

    let tz = FixedOffset::east_opt(settings.archive_utc_offset_hours * 3600).ok_or_else(|| {
        TrendingError::Config(format!(
            "invalid UTC offset: {}",
            settings.archive_utc_offset_hours
        ))
    })?;
    let cadence = DailyCadence::new(tz, settings.archive_hour, settings.archive_minute)?;
    let daemon = ArchivalDaemon::new(app_state.archival.clone(), cadence)
        .spawn(shutdown_token.child_token());

    let app = main_router(app_state);
    let served = server::serve(app, settings.http_port, shutdown_token.clone()).await;

    shutdown_token.cancel();
    if let Err(e) = daemon.await {
        ::tracing::error!("Archival daemon task failed: {}", e);
    }

    served
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::scheduler::{ArchivalJob, SchedulerState, cadence::DailyCadence};

/// Drives [`ArchivalJob`] on a [`DailyCadence`] until cancelled.
///
/// Owns the job's [`SchedulerState`] between runs.
pub struct ArchivalDaemon {
    job: Arc<ArchivalJob>,
    cadence: DailyCadence,
    state: SchedulerState,
}

impl ArchivalDaemon {
    #[must_use]
    pub fn new(job: Arc<ArchivalJob>, cadence: DailyCadence) -> Self {
        Self {
            job,
            cadence,
            state: SchedulerState::default(),
        }
    }

    /// Spawn the daemon loop. The returned handle resolves once `cancel_token`
    /// is cancelled; a run already past its first window finishes first.
    #[must_use]
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<SchedulerState> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    async fn run(mut self, cancel_token: CancellationToken) -> SchedulerState {
        loop {
            let now = Utc::now();
            let next = self.cadence.next_run_from(now);
            let wait = duration_until(next, now);
            info!(
                next_run_utc = %next.to_rfc3339(),
                next_run_local = %next.with_timezone(&self.cadence.timezone()).to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "scheduled trending archival"
            );

            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Archival daemon received shutdown signal, stopping");
                    break;
                }
                () = sleep(wait) => {
                    let (report, state) = self.job.run_once(Utc::now(), self.state).await;
                    self.state = state;
                    if let Some(reason) = report.skipped {
                        info!(%reason, "archival run skipped");
                    }
                    // Leave the trigger minute so the cadence moves to tomorrow.
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Archival daemon shutdown complete");
        self.state
    }
}

fn duration_until(next: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::from_secs(0))
}

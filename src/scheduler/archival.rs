//! The archival job: rotate each window into a timestamped archive and cap
//! how many archives are kept.
//!
//! A run never fails as a whole. Each window is its own unit; a store error
//! while rotating or pruning one window is recorded in the report and the
//! next window is processed as usual.

use crate::domain::RankingWindow;
use crate::error::TrendingError;
use crate::service::{RankingService, TrendingService};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct ArchivalPolicy {
    /// Archives retained per window.
    pub retention: usize,
    /// Lifetime of the cross-process run lease.
    pub lease_ttl: Duration,
    /// Runs closer than this to the previous one are skipped.
    pub min_interval: Duration,
}

impl Default for ArchivalPolicy {
    fn default() -> Self {
        Self {
            retention: 7,
            lease_ttl: Duration::from_secs(10 * 60),
            min_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// State carried from one run to the next by whoever drives the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerState {
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowReport {
    pub window: RankingWindow,
    /// Storage name of the archive created, if the window had entries.
    pub archived: Option<String>,
    pub pruned: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    /// Why the run did nothing, when it was skipped.
    pub skipped: Option<String>,
    pub windows: Vec<WindowReport>,
}

impl RunReport {
    fn skipped(started_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            started_at,
            skipped: Some(reason.into()),
            windows: Vec::new(),
        }
    }

    #[must_use]
    pub fn archived_count(&self) -> usize {
        self.windows.iter().filter(|w| w.archived.is_some()).count()
    }

    #[must_use]
    pub fn failed_windows(&self) -> Vec<RankingWindow> {
        self.windows
            .iter()
            .filter(|w| w.error.is_some())
            .map(|w| w.window)
            .collect()
    }
}

/// Clears the in-process run flag when the run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ArchivalJob {
    ranking: Arc<RankingService>,
    trending: Option<Arc<TrendingService>>,
    policy: ArchivalPolicy,
    windows: Vec<RankingWindow>,
    running: AtomicBool,
}

impl ArchivalJob {
    pub fn new(ranking: Arc<RankingService>, policy: ArchivalPolicy) -> Self {
        Self {
            ranking,
            trending: None,
            policy,
            windows: RankingWindow::ROTATED.to_vec(),
            running: AtomicBool::new(false),
        }
    }

    /// Invalidate `trending`'s cached lists whenever a run archives a window.
    #[must_use]
    pub fn with_trending(mut self, trending: Arc<TrendingService>) -> Self {
        self.trending = Some(trending);
        self
    }

    /// Run the job once at `now`, given the state left by the previous run.
    ///
    /// Returns the report and the state for the next run. Overlapping runs,
    /// in this process or any other sharing the store, are skipped.
    pub async fn run_once(
        &self,
        now: DateTime<Utc>,
        state: SchedulerState,
    ) -> (RunReport, SchedulerState) {
        if let Some(last) = state.last_run_at {
            let since = now.signed_duration_since(last).to_std().unwrap_or_default();
            if since < self.policy.min_interval {
                info!(last_run = %last, "archival ran recently, skipping");
                return (RunReport::skipped(now, "ran recently"), state);
            }
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("archival run already in progress in this process, skipping");
            return (RunReport::skipped(now, "run in progress"), state);
        }
        let _guard = RunGuard(&self.running);

        let store = self.ranking.store();
        let lease = self.ranking.keys().archival_lease();
        let owner = Uuid::new_v4().to_string();
        match store
            .try_acquire_lease(&lease, &owner, self.policy.lease_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!("archival lease held by another instance, skipping");
                return (RunReport::skipped(now, "lease held elsewhere"), state);
            }
            Err(e) => {
                error!(error = %e, "could not take archival lease, skipping run");
                return (RunReport::skipped(now, e.to_string()), state);
            }
        }

        let mut windows = Vec::with_capacity(self.windows.len());
        for &window in &self.windows {
            windows.push(self.process_window(window, now).await);
        }

        if windows.iter().any(|w| w.archived.is_some()) {
            if let Some(trending) = &self.trending {
                trending.invalidate();
            }
        }

        if let Err(e) = store.release_lease(&lease, &owner).await {
            warn!(error = %e, "failed to release archival lease, it will expire on its own");
        }

        let report = RunReport {
            started_at: now,
            skipped: None,
            windows,
        };
        info!(
            archived = report.archived_count(),
            failed = report.failed_windows().len(),
            "archival run finished"
        );
        (
            report,
            SchedulerState {
                last_run_at: Some(now),
            },
        )
    }

    async fn process_window(&self, window: RankingWindow, now: DateTime<Utc>) -> WindowReport {
        let mut report = WindowReport {
            window,
            archived: None,
            pruned: 0,
            error: None,
        };

        let archive = match self.ranking.rotate(window, now).await {
            Ok(archive) => archive,
            Err(e) => {
                let failure = rotation_failure(window, e);
                error!(%window, error = %failure, "window rotation failed");
                report.error = Some(failure.to_string());
                return report;
            }
        };
        report.archived = archive.map(|key| self.ranking.keys().archive(&key));

        match self.ranking.prune_archives(window, self.policy.retention).await {
            Ok(pruned) => report.pruned = pruned,
            Err(e) => {
                let failure = rotation_failure(window, e);
                error!(%window, error = %failure, "archive pruning failed");
                report.error = Some(failure.to_string());
            }
        }

        info!(
            %window,
            archived = usize::from(report.archived.is_some()),
            pruned = report.pruned,
            "window archival finished"
        );
        report
    }
}

fn rotation_failure(window: RankingWindow, cause: TrendingError) -> TrendingError {
    match cause {
        failure @ TrendingError::PartialRotationFailure { .. } => failure,
        other => TrendingError::PartialRotationFailure {
            window: window.to_string(),
            reason: other.to_string(),
        },
    }
}

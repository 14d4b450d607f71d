//! View recording: validation, per-viewer debounce and the deferred,
//! cancellable commit of one score increment per view.

use crate::domain::{ArticleId, RankingWindow, ViewStatus, ViewerId};
use crate::error::TrendingError;
use crate::port::{Clock, DebounceStore};
use crate::service::ranking::RankingService;
use crate::service::trending::TrendingService;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Score added per committed view.
const VIEW_DELTA: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct ViewPolicy {
    /// Minimum spacing between two counted views of the same viewer/article.
    pub cooldown: Duration,
    /// Delay between the view signal and the increment.
    pub settle_delay: Duration,
}

impl Default for ViewPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60 * 60),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// A viewer's live browsing context. Closing it cancels every commit still
/// waiting out its settle delay.
#[derive(Debug, Clone)]
pub struct ViewerContext {
    viewer: ViewerId,
    token: CancellationToken,
    generation: u64,
}

impl ViewerContext {
    #[must_use]
    pub fn new(viewer: ViewerId) -> Self {
        Self::with_generation(viewer, 0)
    }

    fn with_generation(viewer: ViewerId, generation: u64) -> Self {
        Self {
            viewer,
            token: CancellationToken::new(),
            generation,
        }
    }

    #[must_use]
    pub fn viewer(&self) -> &ViewerId {
        &self.viewer
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// How a deferred commit ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(Vec<(RankingWindow, f64)>),
    Cancelled,
}

/// Result of a view signal. `Scheduled` carries the handle of the armed commit.
#[derive(Debug)]
pub enum ViewTicket {
    Scheduled(JoinHandle<Result<CommitOutcome, TrendingError>>),
    Debounced,
    AlreadyPending,
}

impl ViewTicket {
    #[must_use]
    pub fn status(&self) -> ViewStatus {
        match self {
            ViewTicket::Scheduled(_) => ViewStatus::Scheduled,
            ViewTicket::Debounced => ViewStatus::Debounced,
            ViewTicket::AlreadyPending => ViewStatus::AlreadyPending,
        }
    }
}

#[derive(Clone)]
pub struct ViewRecorder {
    ranking: Arc<RankingService>,
    debounce: Arc<dyn DebounceStore>,
    trending: Arc<TrendingService>,
    clock: Arc<dyn Clock>,
    policy: ViewPolicy,
    pending: Arc<Mutex<HashSet<(ViewerId, ArticleId)>>>,
}

impl ViewRecorder {
    pub fn new(
        ranking: Arc<RankingService>,
        debounce: Arc<dyn DebounceStore>,
        trending: Arc<TrendingService>,
        clock: Arc<dyn Clock>,
        policy: ViewPolicy,
    ) -> Self {
        Self {
            ranking,
            debounce,
            trending,
            clock,
            policy,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Handle a raw view signal for `raw_article_id` from `context`.
    ///
    /// Rejects malformed ids before touching the store. Views inside the
    /// cooldown, or with a commit already armed, are accepted without effect.
    pub async fn record_view(
        &self,
        raw_article_id: &str,
        context: &ViewerContext,
    ) -> Result<ViewTicket, TrendingError> {
        let article: ArticleId = raw_article_id.parse()?;
        self.record(article, context).await
    }

    pub async fn record(
        &self,
        article: ArticleId,
        context: &ViewerContext,
    ) -> Result<ViewTicket, TrendingError> {
        let viewer = context.viewer().clone();
        let slot = (viewer.clone(), article);

        // The slot is held from here until the commit ends, and a marker is
        // always written before it is freed, so a signal that wins the slot
        // sees the marker of any earlier commit.
        if !self.pending.lock().insert(slot.clone()) {
            return Ok(ViewTicket::AlreadyPending);
        }

        match self.is_recent(&viewer, article).await {
            Ok(false) => {}
            Ok(true) => {
                self.pending.lock().remove(&slot);
                debug!(%viewer, %article, "view inside cooldown, not counted");
                return Ok(ViewTicket::Debounced);
            }
            Err(e) => {
                self.pending.lock().remove(&slot);
                return Err(e);
            }
        }

        let recorder = self.clone();
        let token = context.token.child_token();
        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(%viewer, %article, "viewer left before settle delay, view dropped");
                    Ok(CommitOutcome::Cancelled)
                }
                () = sleep(recorder.policy.settle_delay) => {
                    recorder.commit_view(article, &viewer).await.map(CommitOutcome::Committed)
                }
            };
            recorder.pending.lock().remove(&slot);
            outcome
        });

        Ok(ViewTicket::Scheduled(handle))
    }

    async fn is_recent(&self, viewer: &ViewerId, article: ArticleId) -> Result<bool, TrendingError> {
        let Some(last) = self.debounce.last_view(viewer, article).await? else {
            return Ok(false);
        };
        // A marker stamped in the future (clock skew) also counts as recent.
        Ok(match self.clock.now().signed_duration_since(last).to_std() {
            Ok(elapsed) => elapsed < self.policy.cooldown,
            Err(_) => true,
        })
    }

    /// Increment `article` in every window, then refresh the viewer's debounce
    /// marker. A failed increment leaves the marker untouched.
    pub async fn commit_view(
        &self,
        article: ArticleId,
        viewer: &ViewerId,
    ) -> Result<Vec<(RankingWindow, f64)>, TrendingError> {
        let scores = match self.ranking.increment_all(article, VIEW_DELTA).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(%viewer, %article, error = %e, "failed to record article view");
                return Err(e);
            }
        };

        if let Err(e) = self
            .debounce
            .mark_viewed(viewer, article, self.clock.now(), self.policy.cooldown)
            .await
        {
            warn!(%viewer, %article, error = %e, "view counted but debounce marker not written");
        }

        self.trending.invalidate();
        info!(%viewer, %article, "article view recorded");
        Ok(scores)
    }
}

#[derive(Debug)]
struct RegistryEntry {
    context: ViewerContext,
    /// Requests in flight plus commits armed under this context.
    holds: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<ViewerId, RegistryEntry>,
    next_generation: u64,
}

/// Open viewer contexts, keyed by viewer id.
///
/// Every [`open`](Self::open) takes a hold on the viewer's context and must be
/// paired with a [`release`](Self::release). A context is dropped from the
/// registry once nothing holds it, so idle viewers cost nothing.
#[derive(Debug, Default)]
pub struct ViewerRegistry {
    inner: Mutex<RegistryInner>,
}

impl ViewerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The viewer's open context, opening a fresh one if none is live.
    pub fn open(&self, viewer: &ViewerId) -> ViewerContext {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner
            .entries
            .get_mut(viewer)
            .filter(|e| !e.context.is_closed())
        {
            entry.holds += 1;
            return entry.context.clone();
        }

        inner.next_generation += 1;
        let context = ViewerContext::with_generation(viewer.clone(), inner.next_generation);
        inner.entries.insert(
            viewer.clone(),
            RegistryEntry {
                context: context.clone(),
                holds: 1,
            },
        );
        context
    }

    /// Give back a hold taken by [`open`](Self::open). Releasing a context that
    /// was closed or replaced in the meantime is a no-op.
    pub fn release(&self, context: &ViewerContext) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(context.viewer()) else {
            return;
        };
        if entry.context.generation != context.generation {
            return;
        }
        entry.holds = entry.holds.saturating_sub(1);
        if entry.holds == 0 {
            inner.entries.remove(context.viewer());
        }
    }

    /// Tear down the viewer's context. Returns whether one was open.
    pub fn close(&self, viewer: &ViewerId) -> bool {
        match self.inner.lock().entries.remove(viewer) {
            Some(entry) => {
                entry.context.close();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

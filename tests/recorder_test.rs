use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use trending_ranker::adapter::catalog::MemoryCatalog;
use trending_ranker::adapter::memory::MemoryStore;
use trending_ranker::app::ServiceOptions;
use trending_ranker::domain::{ArticleId, KeySpace, RankingWindow, ViewStatus, ViewerId};
use trending_ranker::error::TrendingError;
use trending_ranker::port::{DebounceStore, StoreFuture};
use trending_ranker::service::{
    CommitOutcome, RankingService, TrendingService, ViewPolicy, ViewRecorder, ViewTicket,
    ViewerContext,
};
use trending_ranker::test_support::{ManualClock, TestHarness, memory_app_state};

fn harness() -> TestHarness {
    memory_app_state(ServiceOptions::default())
}

fn context(viewer: &str) -> ViewerContext {
    ViewerContext::new(viewer.parse::<ViewerId>().unwrap())
}

fn id(n: i64) -> ArticleId {
    ArticleId::try_from(n).unwrap()
}

async fn settle(ticket: ViewTicket) -> Result<CommitOutcome, TrendingError> {
    match ticket {
        ViewTicket::Scheduled(handle) => handle.await.unwrap(),
        other => panic!("expected a scheduled commit, got {other:?}"),
    }
}

async fn daily_top(harness: &TestHarness) -> Vec<(i64, f64)> {
    harness
        .state
        .ranking
        .top_n(RankingWindow::Daily, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.article_id.get() as i64, e.score))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn committed_view_increments_every_window_once() {
    let harness = harness();
    let ctx = context("reader-a");

    let ticket = harness.state.recorder.record_view("42", &ctx).await.unwrap();
    let outcome = settle(ticket).await.unwrap();

    let CommitOutcome::Committed(scores) = outcome else {
        panic!("view was not committed");
    };
    let windows: Vec<RankingWindow> = scores.iter().map(|(w, _)| *w).collect();
    assert_eq!(windows, RankingWindow::ALL.to_vec());
    assert!(scores.iter().all(|(_, score)| *score == 1.0));
}

#[tokio::test(start_paused = true)]
async fn second_view_inside_cooldown_is_not_counted() {
    let harness = harness();
    let recorder = &harness.state.recorder;
    let ctx = context("reader-a");

    settle(recorder.record_view("42", &ctx).await.unwrap())
        .await
        .unwrap();

    harness.clock.advance(ChronoDuration::minutes(59));
    let again = recorder.record_view("42", &ctx).await.unwrap();
    assert!(matches!(again, ViewTicket::Debounced));
    assert_eq!(daily_top(&harness).await, vec![(42, 1.0)]);
}

#[tokio::test(start_paused = true)]
async fn view_after_cooldown_counts_again() {
    let harness = harness();
    let recorder = &harness.state.recorder;
    let ctx = context("reader-a");

    settle(recorder.record_view("42", &ctx).await.unwrap())
        .await
        .unwrap();

    harness.clock.advance(ChronoDuration::minutes(61));
    tokio::time::advance(Duration::from_secs(61 * 60)).await;

    settle(recorder.record_view("42", &ctx).await.unwrap())
        .await
        .unwrap();
    assert_eq!(daily_top(&harness).await, vec![(42, 2.0)]);
}

#[tokio::test(start_paused = true)]
async fn repeated_signal_while_pending_arms_a_single_commit() {
    let harness = harness();
    let recorder = &harness.state.recorder;
    let ctx = context("reader-a");

    let first = recorder.record_view("42", &ctx).await.unwrap();
    let second = recorder.record_view("42", &ctx).await.unwrap();
    assert!(matches!(second, ViewTicket::AlreadyPending));

    settle(first).await.unwrap();
    assert_eq!(daily_top(&harness).await, vec![(42, 1.0)]);
}

#[tokio::test(start_paused = true)]
async fn closing_context_before_settle_delay_drops_the_view() {
    let harness = harness();
    let recorder = &harness.state.recorder;
    let ctx = context("reader-a");

    let ticket = recorder.record_view("42", &ctx).await.unwrap();
    tokio::time::advance(Duration::from_millis(1500)).await;
    ctx.close();

    assert_eq!(settle(ticket).await.unwrap(), CommitOutcome::Cancelled);
    assert!(daily_top(&harness).await.is_empty());

    // No debounce marker was written, so a fresh context counts immediately.
    let viewer: ViewerId = "reader-a".parse().unwrap();
    assert!(harness.store.last_view(&viewer, id(42)).await.unwrap().is_none());
    let fresh = context("reader-a");
    settle(recorder.record_view("42", &fresh).await.unwrap())
        .await
        .unwrap();
    assert_eq!(daily_top(&harness).await, vec![(42, 1.0)]);
}

#[tokio::test(start_paused = true)]
async fn registry_close_cancels_pending_views() {
    let harness = harness();
    let viewer: ViewerId = "reader-b".parse().unwrap();
    let ctx = harness.state.viewers.open(&viewer);

    let ticket = harness.state.recorder.record_view("7", &ctx).await.unwrap();
    assert!(harness.state.viewers.close(&viewer));

    assert_eq!(settle(ticket).await.unwrap(), CommitOutcome::Cancelled);
    assert!(daily_top(&harness).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn three_viewers_then_repeat_viewer_scores_three() {
    let harness = harness();
    let recorder = &harness.state.recorder;

    let a = context("viewer-a");
    for ctx in [&a, &context("viewer-b"), &context("viewer-c")] {
        settle(recorder.record_view("42", ctx).await.unwrap())
            .await
            .unwrap();
    }
    let top = harness
        .state
        .ranking
        .top_n(RankingWindow::Daily, 1)
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].article_id, id(42));
    assert_eq!(top[0].score, 3.0);

    harness.clock.advance(ChronoDuration::minutes(10));
    let repeat = recorder.record_view("42", &a).await.unwrap();
    assert!(matches!(repeat, ViewTicket::Debounced));

    let top = harness
        .state
        .ranking
        .top_n(RankingWindow::Daily, 1)
        .await
        .unwrap();
    assert_eq!(top[0].score, 3.0);
}

#[tokio::test(start_paused = true)]
async fn malformed_ids_are_rejected_without_side_effects() {
    let harness = harness();
    let ctx = context("reader-a");

    for raw in ["", "abc", "0", "-1", "4.2", " 42", "99999999999999999999999"] {
        let err = harness
            .state
            .recorder
            .record_view(raw, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, TrendingError::InvalidArgument(_)), "{raw:?}");
    }
    for window in RankingWindow::ALL {
        assert!(
            harness
                .state
                .ranking
                .snapshot(window)
                .await
                .unwrap()
                .is_empty()
        );
    }
}

#[tokio::test(start_paused = true)]
async fn failed_increment_leaves_no_debounce_marker() {
    let harness = harness();
    let recorder = &harness.state.recorder;
    let ctx = context("reader-a");

    harness.store.fail_keys_containing(Some("daily"));
    let err = settle(recorder.record_view("42", &ctx).await.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, TrendingError::StoreUnavailable(_)));

    harness.store.fail_keys_containing(None);
    let viewer: ViewerId = "reader-a".parse().unwrap();
    assert!(harness.store.last_view(&viewer, id(42)).await.unwrap().is_none());

    // The retry is the next view, which is not debounced.
    settle(recorder.record_view("42", &ctx).await.unwrap())
        .await
        .unwrap();
    assert_eq!(daily_top(&harness).await, vec![(42, 1.0)]);
}

#[tokio::test(start_paused = true)]
async fn failed_commit_leaves_every_window_untouched() {
    let harness = harness();
    let ctx = context("reader-a");

    harness.store.fail_keys_containing(Some("weekly"));
    settle(harness.state.recorder.record_view("42", &ctx).await.unwrap())
        .await
        .unwrap_err();
    harness.store.fail_keys_containing(None);

    for window in RankingWindow::ALL {
        assert!(
            harness
                .state
                .ranking
                .snapshot(window)
                .await
                .unwrap()
                .is_empty(),
            "{window} was partially incremented"
        );
    }

    // The retry counts exactly once everywhere.
    settle(harness.state.recorder.record_view("42", &ctx).await.unwrap())
        .await
        .unwrap();
    for window in RankingWindow::ALL {
        let top = harness.state.ranking.top_n(window, 1).await.unwrap();
        assert_eq!(top[0].score, 1.0);
    }
}

#[tokio::test(start_paused = true)]
async fn debounce_store_outage_surfaces_to_caller() {
    let harness = harness();
    harness.store.set_fail_all(true);

    let err = harness
        .state
        .recorder
        .record_view("42", &context("reader-a"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrendingError::StoreUnavailable(_)));
}

/// Debounce store whose reads take `lag` to come back, reporting what the
/// marker looked like when the read started.
struct LaggingReads {
    inner: Arc<MemoryStore>,
    lag: Duration,
}

impl DebounceStore for LaggingReads {
    fn last_view<'a>(
        &'a self,
        viewer: &'a ViewerId,
        article: ArticleId,
    ) -> StoreFuture<'a, Option<DateTime<Utc>>> {
        Box::pin(async move {
            let seen = self.inner.last_view(viewer, article).await?;
            tokio::time::sleep(self.lag).await;
            Ok(seen)
        })
    }

    fn mark_viewed<'a>(
        &'a self,
        viewer: &'a ViewerId,
        article: ArticleId,
        at: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreFuture<'a, ()> {
        self.inner.mark_viewed(viewer, article, at, ttl)
    }
}

#[tokio::test(start_paused = true)]
async fn slow_debounce_read_cannot_arm_a_second_commit() {
    let store = Arc::new(MemoryStore::default());
    let ranking = Arc::new(RankingService::new(store.clone(), KeySpace::default()));
    let trending = Arc::new(TrendingService::new(
        ranking.clone(),
        Arc::new(MemoryCatalog::new()),
        Duration::from_secs(60),
    ));
    let recorder = ViewRecorder::new(
        ranking.clone(),
        Arc::new(LaggingReads {
            inner: store,
            lag: Duration::from_millis(2500),
        }),
        trending,
        Arc::new(ManualClock::at_epoch()),
        ViewPolicy::default(),
    );
    let ctx = context("reader-a");

    let first = {
        let recorder = recorder.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { recorder.record_view("42", &ctx).await })
    };
    tokio::time::sleep(Duration::from_secs(3)).await;
    let second = recorder.record_view("42", &ctx).await.unwrap();

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, ViewTicket::Scheduled(_)));
    assert!(matches!(second, ViewTicket::AlreadyPending));
    settle(first).await.unwrap();

    let top = ranking.top_n(RankingWindow::Daily, 1).await.unwrap();
    assert_eq!(top[0].score, 1.0);
}

#[tokio::test(start_paused = true)]
async fn debounced_signal_frees_its_slot() {
    let harness = harness();
    let recorder = &harness.state.recorder;
    let ctx = context("reader-a");

    settle(recorder.record_view("42", &ctx).await.unwrap())
        .await
        .unwrap();
    assert!(matches!(
        recorder.record_view("42", &ctx).await.unwrap(),
        ViewTicket::Debounced
    ));

    // Once the cooldown passes the pair is schedulable again, not stuck pending.
    harness.clock.advance(ChronoDuration::hours(2));
    assert!(matches!(
        recorder.record_view("42", &ctx).await.unwrap(),
        ViewTicket::Scheduled(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn viewer_registry_empties_once_commits_settle() {
    let harness = harness();
    let state = &harness.state;

    for n in 0..100 {
        let viewer: ViewerId = format!("one-shot-{n}").parse().unwrap();
        let status = state.record_view(&viewer, "42").await.unwrap();
        assert_eq!(status, ViewStatus::Scheduled);
    }
    assert_eq!(state.viewers.len(), 100);

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(state.viewers.is_empty());
    assert_eq!(daily_top(&harness).await, vec![(42, 100.0)]);
}

#[tokio::test(start_paused = true)]
async fn rejected_and_debounced_signals_leave_no_context_behind() {
    let harness = harness();
    let state = &harness.state;
    let viewer: ViewerId = "reader-a".parse().unwrap();

    assert!(state.record_view(&viewer, "abc").await.is_err());
    assert!(state.viewers.is_empty());

    state.record_view(&viewer, "42").await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let status = state.record_view(&viewer, "42").await.unwrap();
    assert_eq!(status, ViewStatus::Debounced);
    assert!(state.viewers.is_empty());
}

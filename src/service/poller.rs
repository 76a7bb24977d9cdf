//! Per-connection dashboard polling
//!
//! A poll task owns its cursor and a cancellation token. Every period it
//! fetches posts newer than the cursor, forwards any new ones as a single
//! batch, and moves the cursor to the newest delivered id. Tick, fetch and
//! cursor update run as one unit inside a single loop, so there is never
//! more than one fetch in flight per task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::dashboard::{DashboardApi, DashboardPage, DashboardQuery, PostId};
use crate::auth::AccessToken;
use crate::metrics::{POLL_FETCHES_TOTAL, POSTS_DELIVERED_TOTAL};

/// Apply one fetch result to the cursor
///
/// Posts not newer than `cursor` are dropped. Returns the next cursor and
/// the batch to emit, if anything new arrived. The cursor comes from the
/// first (newest) remaining post, so it only ever moves forward.
pub fn advance(cursor: PostId, mut page: DashboardPage) -> (PostId, Option<DashboardPage>) {
    page.posts.retain(|post| post.id > cursor);

    match page.newest_id() {
        Some(newest) => (newest, Some(page)),
        None => (cursor, None),
    }
}

/// Handle to a running poll task
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Spawn a poll loop
    ///
    /// # Arguments
    /// * `cursor` - newest post already seen; `None` means nothing is
    ///   fetched until a later task is started with a cursor
    /// * `events` - receives each batch of new posts
    /// * `cancel` - stops the loop; an in-flight fetch is abandoned and its
    ///   result discarded
    pub fn spawn(
        api: Arc<dyn DashboardApi>,
        token: AccessToken,
        cursor: Option<PostId>,
        period: Duration,
        events: mpsc::Sender<DashboardPage>,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(run(api, token, cursor, period, events, cancel.clone()));
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    api: Arc<dyn DashboardApi>,
    token: AccessToken,
    mut cursor: Option<PostId>,
    period: Duration,
    events: mpsc::Sender<DashboardPage>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(cursor = ?cursor, "Poll task started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        // Without a cursor there is nothing to ask for yet.
        let Some(since) = cursor else {
            continue;
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                POLL_FETCHES_TOTAL.with_label_values(&["discarded"]).inc();
                break;
            }
            result = api.fetch(&token, DashboardQuery::Since(since)) => result,
        };

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                POLL_FETCHES_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!(%error, cursor = %since, "Dashboard poll failed");
                continue;
            }
        };

        let (next, batch) = advance(since, page);
        let Some(batch) = batch else {
            POLL_FETCHES_TOTAL.with_label_values(&["empty"]).inc();
            continue;
        };

        let delivered = batch.posts.len();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                POLL_FETCHES_TOTAL.with_label_values(&["discarded"]).inc();
                break;
            }
            sent = events.send(batch) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        POLL_FETCHES_TOTAL.with_label_values(&["ok"]).inc();
        POSTS_DELIVERED_TOTAL.inc_by(delivered as u64);
        tracing::debug!(from = %since, to = %next, delivered, "Cursor advanced");
        cursor = Some(next);
    }

    tracing::debug!(cursor = ?cursor, "Poll task stopped");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::service::dashboard::Post;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn page(ids: &[u64]) -> DashboardPage {
        DashboardPage {
            posts: ids
                .iter()
                .map(|id| Post {
                    id: PostId(*id),
                    fields: serde_json::Map::new(),
                })
                .collect(),
            extra: serde_json::Map::new(),
        }
    }

    fn ids(page: &DashboardPage) -> Vec<u64> {
        page.posts.iter().map(|post| post.id.0).collect()
    }

    /// Scripted dashboard that records every query
    #[derive(Default)]
    pub(crate) struct FakeDashboard {
        pub queries: Mutex<Vec<DashboardQuery>>,
        pub responses: Mutex<VecDeque<Result<DashboardPage, AppError>>>,
        pub delay: Duration,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl FakeDashboard {
        pub(crate) fn scripted(
            responses: Vec<Result<DashboardPage, AppError>>,
            delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                delay,
                ..Default::default()
            })
        }

        pub(crate) fn queries(&self) -> Vec<DashboardQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DashboardApi for FakeDashboard {
        async fn fetch(
            &self,
            _token: &AccessToken,
            query: DashboardQuery,
        ) -> Result<DashboardPage, AppError> {
            self.queries.lock().unwrap().push(query);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(DashboardPage::default()))
        }
    }

    fn token() -> AccessToken {
        AccessToken {
            token: "acc".to_string(),
            secret: "acc-secret".to_string(),
        }
    }

    const PERIOD: Duration = Duration::from_secs(5);

    fn spawn(
        api: Arc<FakeDashboard>,
        cursor: Option<u64>,
    ) -> (PollTask, mpsc::Receiver<DashboardPage>) {
        let (tx, rx) = mpsc::channel(8);
        let task = PollTask::spawn(
            api,
            token(),
            cursor.map(PostId),
            PERIOD,
            tx,
            CancellationToken::new(),
        );
        (task, rx)
    }

    #[test]
    fn test_advance_moves_cursor_to_first_post() {
        let (next, batch) = advance(PostId(100), page(&[105, 104]));
        assert_eq!(next, PostId(105));
        assert_eq!(ids(&batch.unwrap()), vec![105, 104]);
    }

    #[test]
    fn test_advance_keeps_cursor_on_empty_page() {
        let (next, batch) = advance(PostId(100), page(&[]));
        assert_eq!(next, PostId(100));
        assert!(batch.is_none());
    }

    #[test]
    fn test_advance_drops_already_delivered_posts() {
        let (next, batch) = advance(PostId(100), page(&[101, 100, 99]));
        assert_eq!(next, PostId(101));
        assert_eq!(ids(&batch.unwrap()), vec![101]);

        let (next, batch) = advance(PostId(100), page(&[100, 98]));
        assert_eq!(next, PostId(100));
        assert!(batch.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fetch_without_cursor() {
        let api = FakeDashboard::scripted(vec![], Duration::ZERO);
        let (_task, _rx) = spawn(api.clone(), None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(api.queries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_posts_are_delivered_and_cursor_advances() {
        let api = FakeDashboard::scripted(vec![Ok(page(&[105, 104]))], Duration::ZERO);
        let (_task, mut rx) = spawn(api.clone(), Some(100));

        let batch = rx.recv().await.expect("batch delivered");
        assert_eq!(ids(&batch), vec![105, 104]);

        tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;
        assert_eq!(
            api.queries(),
            vec![
                DashboardQuery::Since(PostId(100)),
                DashboardQuery::Since(PostId(105)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_waits_one_period() {
        let api = FakeDashboard::scripted(vec![], Duration::ZERO);
        let (_task, _rx) = spawn(api.clone(), Some(100));

        tokio::time::sleep(PERIOD - Duration::from_millis(1)).await;
        assert!(api.queries().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(api.queries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_leaves_cursor_unchanged() {
        let api = FakeDashboard::scripted(
            vec![
                Err(AppError::ExternalApi("503".to_string())),
                Ok(page(&[])),
                Ok(page(&[101])),
            ],
            Duration::ZERO,
        );
        let (_task, mut rx) = spawn(api.clone(), Some(100));

        let batch = rx.recv().await.expect("batch delivered");
        assert_eq!(ids(&batch), vec![101]);
        assert_eq!(api.queries(), vec![DashboardQuery::Since(PostId(100)); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetches_never_overlap() {
        let api = FakeDashboard::scripted(vec![], Duration::from_secs(12));
        let (_task, _rx) = spawn(api.clone(), Some(100));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(api.queries().len() >= 2);
        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_fetch_discards_result() {
        let api = FakeDashboard::scripted(vec![Ok(page(&[105]))], Duration::from_secs(10));
        let (task, mut rx) = spawn(api.clone(), Some(100));

        // First fetch starts at 5s and would resolve at 15s.
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(api.queries().len(), 1);
        task.cancel();

        assert!(rx.recv().await.is_none(), "no batch after cancellation");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.queries().len(), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_on_separate_connections_are_independent() {
        let api_a = FakeDashboard::scripted(vec![], Duration::ZERO);
        let api_b = FakeDashboard::scripted(vec![], Duration::ZERO);
        let (task_a, _rx_a) = spawn(api_a.clone(), Some(100));
        let (_task_b, _rx_b) = spawn(api_b.clone(), Some(200));

        tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;
        drop(task_a);

        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(api_a.queries().len(), 1);
        assert_eq!(api_b.queries().len(), 4);
        assert!(
            api_b
                .queries()
                .iter()
                .all(|query| *query == DashboardQuery::Since(PostId(200)))
        );
    }
}

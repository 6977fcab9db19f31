//! Bounded-concurrency executor for work items.
//!
//! A [`WorkerPool`] admits items in dispatch order. [`WorkerPool::dispatch`]
//! waits for one of `concurrency` permits before spawning the remote call,
//! so at most that many calls are in flight; pacing is left to the rate
//! limited client underneath. A failed item is reported and never retried,
//! and never stops its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;

use super::eta::ProgressTracker;
use super::progress::{BatchProgress, ProgressCallback, emit};
use super::types::{BatchAction, BatchOptions, BatchReport, ItemFailure, WorkItem};
use crate::remote::{FollowEnvelope, RemoteClient, RemoteError, short_error_message};

/// Delays follows after the service reports a brand-new repository.
///
/// With a zero wait the gate is a pass-through. Otherwise follows are
/// issued one at a time, and a follow that returned `known == false` makes
/// the next follow wait until `wait` has elapsed. Follows of known
/// repositories don't arm the gate.
#[derive(Debug)]
pub struct FollowCooldown {
    wait: Duration,
    not_before: Mutex<Option<Instant>>,
}

impl FollowCooldown {
    #[must_use]
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            not_before: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub async fn follow<C: RemoteClient + ?Sized>(
        &self,
        client: &C,
        url: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<FollowEnvelope, RemoteError> {
        if self.wait.is_zero() {
            return client.follow(url).await;
        }

        // Held across the call so a new-repository result arms the gate
        // before any other follow gets through.
        let mut not_before = self.not_before.lock().await;
        if let Some(at) = *not_before {
            let now = Instant::now();
            if at > now {
                emit(on_progress, BatchProgress::CoolingDown { wait: at - now });
                tracing::debug!(wait_ms = (at - now).as_millis() as u64, "cooling down before next follow");
                tokio::time::sleep_until(at).await;
            }
        }

        let result = client.follow(url).await;
        if let Ok(envelope) = &result
            && !envelope.known
        {
            *not_before = Some(Instant::now() + self.wait);
        }
        result
    }
}

/// What a finished task hands back to the pool.
struct Finished {
    index: usize,
    label: String,
    result: Result<bool, String>,
}

/// Runs work items with at most `concurrency` remote calls in flight.
pub struct WorkerPool<C> {
    client: C,
    action: BatchAction,
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<Finished>,
    labels: HashMap<Id, (usize, String)>,
    finished: Vec<Finished>,
    tracker: Arc<ProgressTracker>,
    cooldown: Arc<FollowCooldown>,
    on_progress: Option<Arc<ProgressCallback>>,
    dispatched: usize,
    total: usize,
}

impl<C: RemoteClient + Clone + 'static> WorkerPool<C> {
    /// A pool for `total` items. A concurrency of 0 is treated as 1.
    pub fn new(client: C, action: BatchAction, total: usize, options: &BatchOptions) -> Self {
        let concurrency = options.concurrency.max(1);
        Self {
            client,
            action,
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            tasks: JoinSet::new(),
            labels: HashMap::new(),
            finished: Vec::with_capacity(total),
            tracker: Arc::new(ProgressTracker::new(total as u64)),
            cooldown: Arc::new(FollowCooldown::new(options.follow_wait)),
            on_progress: None,
            dispatched: 0,
            total,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<Arc<ProgressCallback>>) -> Self {
        self.on_progress = on_progress;
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Wait for a permit, then start `item` in the background.
    pub async fn dispatch(&mut self, item: WorkItem) {
        let index = self.dispatched;
        self.dispatched += 1;
        let label = item.to_string();

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.finished.push(Finished {
                    index,
                    label,
                    result: Err("worker pool closed".to_string()),
                });
                return;
            }
        };

        self.reap_finished();

        emit(
            self.on_progress.as_deref(),
            BatchProgress::ItemStarted {
                action: self.action,
                item: label.clone(),
                position: index + 1,
                total: self.total.max(self.dispatched),
                percent: self.tracker.formatted_percent(),
                eta: self.tracker.eta(),
            },
        );

        let client = self.client.clone();
        let tracker = Arc::clone(&self.tracker);
        let cooldown = Arc::clone(&self.cooldown);
        let on_progress = self.on_progress.clone();
        let action = self.action;
        let task_label = label.clone();

        let handle = self.tasks.spawn(async move {
            let _permit = permit;
            let result = run_item(&client, &item, &cooldown, on_progress.as_deref())
                .await
                .map_err(|e| short_error_message(&e));
            tracker.done(1);

            match &result {
                Ok(created) => emit(
                    on_progress.as_deref(),
                    BatchProgress::ItemSucceeded {
                        action,
                        item: task_label.clone(),
                        created: *created,
                    },
                ),
                Err(error) => {
                    tracing::warn!(item = %task_label, error = %error, "{} failed", action.verb());
                    emit(
                        on_progress.as_deref(),
                        BatchProgress::ItemFailed {
                            action,
                            item: task_label.clone(),
                            error: error.clone(),
                        },
                    );
                }
            }

            Finished {
                index,
                label: task_label,
                result,
            }
        });
        self.labels.insert(handle.id(), (index, label));
    }

    /// Wait for every dispatched item and summarize the batch.
    ///
    /// Entries in the report are in dispatch order.
    pub async fn wait(mut self) -> BatchReport {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.record(joined);
        }

        let mut finished = std::mem::take(&mut self.finished);
        finished.sort_by_key(|f| f.index);

        let mut report = BatchReport {
            total: finished.len(),
            ..BatchReport::default()
        };
        for Finished { label, result, .. } in finished {
            match result {
                Ok(created) => {
                    if created {
                        report.newly_created += 1;
                    }
                    report.succeeded.push(label);
                }
                Err(error) => report.failures.push(ItemFailure { item: label, error }),
            }
        }

        emit(
            self.on_progress.as_deref(),
            BatchProgress::BatchComplete {
                action: self.action,
                total: report.total,
                succeeded: report.succeeded_count(),
                created: report.newly_created,
                failed: report.failed_count(),
            },
        );
        tracing::info!(
            total = report.total,
            succeeded = report.succeeded_count(),
            created = report.newly_created,
            failed = report.failed_count(),
            "{} batch complete",
            self.action.verb()
        );

        report
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next_with_id() {
            self.record(joined);
        }
    }

    fn record(&mut self, joined: Result<(Id, Finished), JoinError>) {
        match joined {
            Ok((id, done)) => {
                self.labels.remove(&id);
                self.finished.push(done);
            }
            Err(e) => {
                let (index, label) = self
                    .labels
                    .remove(&e.id())
                    .unwrap_or((usize::MAX, "unknown item".to_string()));
                self.tracker.done(1);
                self.finished.push(Finished {
                    index,
                    label,
                    result: Err(format!("task panic: {e}")),
                });
            }
        }
    }
}

/// Issue the remote call for one item. `Ok(true)` means the follow
/// created a new project on the service.
async fn run_item<C: RemoteClient + ?Sized>(
    client: &C,
    item: &WorkItem,
    cooldown: &FollowCooldown,
    on_progress: Option<&ProgressCallback>,
) -> Result<bool, RemoteError> {
    match item {
        WorkItem::Follow { url } => cooldown
            .follow(client, url, on_progress)
            .await
            .map(|envelope| !envelope.known),
        WorkItem::Unfollow { key, is_proto, .. } => {
            client.unfollow(key, *is_proto).await.map(|()| false)
        }
        WorkItem::AddToSelection {
            selection_key,
            project_keys,
        } => client
            .add_to_selection(selection_key, project_keys)
            .await
            .map(|()| false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use crate::test_support::{Call, MockRemote};

    fn follows(n: usize) -> Vec<WorkItem> {
        (1..=n)
            .map(|i| WorkItem::Follow {
                url: format!("https://github.com/o/r{i}"),
            })
            .collect()
    }

    fn options(concurrency: usize, wait: Duration) -> BatchOptions {
        BatchOptions {
            concurrency,
            follow_wait: wait,
            ..BatchOptions::default()
        }
    }

    async fn run(client: Arc<MockRemote>, items: Vec<WorkItem>, opts: &BatchOptions) -> BatchReport {
        let action = items.first().map_or(BatchAction::Follow, WorkItem::action);
        let mut pool = WorkerPool::new(client, action, items.len(), opts);
        for item in items {
            pool.dispatch(item).await;
        }
        pool.wait().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_calls_never_exceed_concurrency() {
        let client = Arc::new(MockRemote::new().with_delay(Duration::from_millis(5)));
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            run(Arc::clone(&client), follows(40), &options(3, Duration::ZERO)),
        )
        .await
        .expect("pool finished");

        assert_eq!(report.total, 40);
        assert_eq!(report.succeeded_count(), 40);
        assert!(client.max_in_flight() <= 3, "peak {}", client.max_in_flight());
        assert!(client.max_in_flight() >= 2, "pool should run items in parallel");
    }

    #[tokio::test]
    async fn failures_do_not_stop_siblings() {
        let mut remote = MockRemote::new().with_delay(Duration::from_millis(1));
        for i in [2, 5, 9] {
            remote = remote.failing(&format!("https://github.com/o/r{i}"));
        }
        let client = Arc::new(remote);

        let report = run(Arc::clone(&client), follows(10), &options(4, Duration::ZERO)).await;

        let expected: Vec<String> = [1, 3, 4, 6, 7, 8, 10]
            .iter()
            .map(|i| format!("https://github.com/o/r{i}"))
            .collect();
        assert_eq!(report.total, 10);
        assert_eq!(report.succeeded, expected);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.item.as_str()).collect();
        assert_eq!(
            failed,
            vec![
                "https://github.com/o/r2",
                "https://github.com/o/r5",
                "https://github.com/o/r9"
            ]
        );
        assert!(report.failures[0].error.contains("cannot process"));
        assert_eq!(client.calls().len(), 10);
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let client = Arc::new(MockRemote::new());
        let report = run(client, follows(3), &options(0, Duration::ZERO)).await;
        assert_eq!(report.succeeded_count(), 3);
    }

    #[tokio::test]
    async fn unfollow_and_selection_items_reach_the_right_endpoint() {
        let client = Arc::new(MockRemote::new());
        let items = vec![
            WorkItem::Unfollow {
                key: "k1".to_string(),
                is_proto: false,
                display_name: "https://github.com/a/b".to_string(),
            },
            WorkItem::Unfollow {
                key: "k2".to_string(),
                is_proto: true,
                display_name: "https://github.com/a/c".to_string(),
            },
        ];
        let report = run(Arc::clone(&client), items, &options(1, Duration::ZERO)).await;
        assert_eq!(
            report.succeeded,
            vec!["https://github.com/a/b", "https://github.com/a/c (proto)"]
        );
        assert_eq!(
            client.calls(),
            vec![
                Call::Unfollow("k1".to_string(), false),
                Call::Unfollow("k2".to_string(), true)
            ]
        );

        let add = vec![WorkItem::AddToSelection {
            selection_key: "sel".to_string(),
            project_keys: vec!["k1".to_string()],
        }];
        let report = run(Arc::clone(&client), add, &options(1, Duration::ZERO)).await;
        assert_eq!(report.succeeded, vec!["1 project(s)"]);
    }

    #[tokio::test]
    async fn events_cover_every_item() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        });

        let client = Arc::new(MockRemote::new().failing("https://github.com/o/r2"));
        let opts = options(2, Duration::ZERO);
        let mut pool = WorkerPool::new(client, BatchAction::Follow, 3, &opts)
            .with_progress(Some(Arc::new(callback)));
        for item in follows(3) {
            pool.dispatch(item).await;
        }
        let report = pool.wait().await;
        assert_eq!(report.failed_count(), 1);

        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        let started: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                BatchProgress::ItemStarted { position, .. } => Some(*position),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![1, 2, 3]);
        assert!(matches!(
            events.first(),
            Some(BatchProgress::ItemStarted { percent, .. }) if percent == "0.0%"
        ));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, BatchProgress::ItemSucceeded { created: true, .. }))
                .count(),
            2
        );
        assert!(matches!(
            events.last(),
            Some(BatchProgress::BatchComplete {
                total: 3,
                succeeded: 2,
                created: 2,
                failed: 1,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_follows_new_repositories_only() {
        let wait = Duration::from_secs(30);
        // r1 new, r2 known, r3 new, r4 known.
        let client = Arc::new(
            MockRemote::new()
                .known("https://github.com/o/r2")
                .known("https://github.com/o/r4"),
        );
        let start = Instant::now();
        let report = run(Arc::clone(&client), follows(4), &options(4, wait)).await;
        assert_eq!(report.newly_created, 2);

        let offsets: Vec<Duration> = client
            .timed_calls()
            .into_iter()
            .map(|(at, _)| at - start)
            .collect();
        // r2 waits for r1's cooldown; r3 goes straight after known r2;
        // r4 waits for r3's cooldown.
        assert_eq!(offsets[0], Duration::ZERO);
        assert_eq!(offsets[1], wait);
        assert_eq!(offsets[2], wait);
        assert_eq!(offsets[3], wait * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_cooldown_when_everything_is_known() {
        let client = Arc::new(
            MockRemote::new()
                .known("https://github.com/o/r1")
                .known("https://github.com/o/r2"),
        );
        let start = Instant::now();
        let report = run(Arc::clone(&client), follows(2), &options(1, Duration::from_secs(60))).await;
        assert_eq!(report.newly_created, 0);
        for (at, _) in client.timed_calls() {
            assert_eq!(at - start, Duration::ZERO);
        }
    }
}

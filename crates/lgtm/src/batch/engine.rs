//! Command-level batch orchestration.
//!
//! Each entry point runs the same pipeline: apply the cache policy, plan,
//! confirm when the plan is destructive, dispatch through a
//! [`WorkerPool`], and summarize. Only configuration problems and snapshot
//! failures without permission to degrade come back as errors; per-item
//! failures land in the [`BatchReport`].

use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;

use super::pool::WorkerPool;
use super::progress::{BatchProgress, ProgressCallback, emit};
use super::types::{BatchAction, BatchOptions, BatchReport, Outcome, Unresolved, WorkItem};
use crate::cache::{CacheError, get_followed_cache};
use crate::matcher::{GlobList, MatcherError};
use crate::planner::{
    FollowPlan, SelectionPlan, parse_unfollow_inputs, plan_add_to_selection,
    plan_add_to_selection_degraded, plan_follow, plan_follow_degraded, plan_unfollow,
    plan_unfollow_all, plan_unfollow_degraded,
};
use crate::remote::{FollowedSnapshot, ProjectAdmin, RemoteClient, RemoteError};
use crate::target::TargetError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Pattern(#[from] MatcherError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("this command needs the full followed list and cannot run without it")]
    SnapshotRequired,
}

impl EngineError {
    /// The snapshot could not be fetched and degrading was not allowed.
    #[inline]
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::Cache(_) | Self::SnapshotRequired)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Asked before destructive batches. Returns whether to go ahead.
pub type Confirm = dyn Fn(&str) -> bool + Send + Sync;

/// Result of [`follow`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowReport {
    pub plan: FollowPlan,
    pub batch: BatchReport,
}

/// Result of [`add_to_selection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    pub plan: SelectionPlan,
    pub batch: BatchReport,
}

/// Fetch the followed snapshot according to the cache policy.
///
/// `Ok(None)` means degraded mode: the cache is disabled, or fetching failed
/// and `ignore_cache_errors` allows carrying on without it.
pub async fn load_followed<C: RemoteClient + Clone>(
    client: &C,
    options: &BatchOptions,
    on_progress: Option<&ProgressCallback>,
) -> Result<Option<Arc<FollowedSnapshot>>> {
    if !options.no_cache {
        emit(on_progress, BatchProgress::FetchingFollowed);
    }
    let started = Instant::now();

    match get_followed_cache(client.clone(), options.no_cache).await {
        Ok(cache) => {
            let snapshot = cache.snapshot();
            let elapsed = started.elapsed();
            tracing::info!(
                projects = snapshot.projects.len(),
                proto_projects = snapshot.proto_projects.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "fetched followed projects"
            );
            emit(
                on_progress,
                BatchProgress::FetchedFollowed {
                    projects: snapshot.projects.len(),
                    proto_projects: snapshot.proto_projects.len(),
                    elapsed,
                },
            );
            Ok(Some(snapshot))
        }
        Err(e) if e.is_disabled() => {
            tracing::debug!("followed cache disabled, resolving items one by one");
            emit(
                on_progress,
                BatchProgress::CacheUnavailable {
                    reason: e.to_string(),
                },
            );
            Ok(None)
        }
        Err(e) if options.ignore_cache_errors => {
            let message = if e.is_timeout() {
                "the followed list timed out (large account); continuing item by item".to_string()
            } else {
                format!("{e}; continuing item by item")
            };
            tracing::warn!(error = %e, timeout = e.is_timeout(), "continuing without the followed list");
            emit(on_progress, BatchProgress::Warning { message });
            emit(
                on_progress,
                BatchProgress::CacheUnavailable {
                    reason: e.to_string(),
                },
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn report_skips(
    excluded: &[(String, String)],
    unresolved: &[Unresolved],
    on_progress: Option<&ProgressCallback>,
) {
    for (item, pattern) in excluded {
        tracing::debug!(item = %item, pattern = %pattern, "excluded");
        emit(
            on_progress,
            BatchProgress::Excluded {
                item: item.clone(),
                pattern: pattern.clone(),
            },
        );
    }
    for u in unresolved {
        tracing::warn!(item = %u.item, reason = %u.reason, "skipping");
        emit(
            on_progress,
            BatchProgress::Unresolved {
                item: u.item.clone(),
                reason: u.reason.clone(),
            },
        );
    }
}

/// Dispatch `items` through a fresh pool and wait for all of them.
pub async fn run_batch<C: RemoteClient + Clone + 'static>(
    client: &C,
    action: BatchAction,
    items: Vec<WorkItem>,
    options: &BatchOptions,
    on_progress: Option<Arc<ProgressCallback>>,
) -> BatchReport {
    let mut pool = WorkerPool::new(client.clone(), action, items.len(), options)
        .with_progress(on_progress.clone());
    emit(
        on_progress.as_deref(),
        BatchProgress::Dispatching {
            action,
            total: items.len(),
            concurrency: pool.concurrency(),
        },
    );
    for item in items {
        pool.dispatch(item).await;
    }
    pool.wait().await
}

/// Follow every candidate the account doesn't already follow.
///
/// `candidates` are canonical repository URLs (see
/// [`resolve_candidates`](crate::target::resolve_candidates)).
pub async fn follow<C: RemoteClient + Clone + 'static>(
    client: &C,
    candidates: &[String],
    options: &BatchOptions,
    on_progress: Option<Arc<ProgressCallback>>,
) -> Result<FollowReport> {
    let exclude = GlobList::new(&options.exclude)?;
    let progress = on_progress.as_deref();

    let plan = match load_followed(client, options, progress).await? {
        Some(snapshot) => plan_follow(candidates, &snapshot, &exclude),
        None => plan_follow_degraded(client, candidates, &exclude, progress).await,
    };
    report_skips(&plan.excluded, &plan.unresolved, progress);
    emit(
        progress,
        BatchProgress::Planned {
            action: BatchAction::Follow,
            total: plan.delta.len(),
            skipped: plan.already_followed.len(),
        },
    );

    let batch = run_batch(client, BatchAction::Follow, plan.items(), options, on_progress).await;
    Ok(FollowReport { plan, batch })
}

fn confirmed(options: &BatchOptions, confirm: &Confirm, question: &str) -> bool {
    if options.assume_yes {
        return true;
    }
    confirm(question)
}

/// Unfollow everything matched by `inputs` (patterns, owners or URLs).
///
/// A pattern that would match every followed project must be confirmed;
/// declining issues no unfollow calls.
pub async fn unfollow<C: RemoteClient + Clone + 'static>(
    client: &C,
    inputs: &[String],
    options: &BatchOptions,
    confirm: &Confirm,
    on_progress: Option<Arc<ProgressCallback>>,
) -> Result<Outcome> {
    let selectors = parse_unfollow_inputs(inputs)?;
    let exclude = GlobList::new(&options.exclude)?;
    let progress = on_progress.as_deref();

    let plan = match load_followed(client, options, progress).await? {
        Some(snapshot) => plan_unfollow(&selectors, &snapshot, &exclude)?,
        None => plan_unfollow_degraded(client, &selectors, &exclude).await,
    };
    report_skips(&plan.excluded, &plan.unresolved, progress);

    if let Some(pattern) = &plan.match_everything {
        let question = format!(
            "Pattern {pattern:?} matches everything you follow. Unfollow {} projects?",
            plan.items.len()
        );
        if !confirmed(options, confirm, &question) {
            tracing::info!(pattern = %pattern, "unfollow declined");
            return Ok(Outcome::Declined);
        }
    }

    emit(
        progress,
        BatchProgress::Planned {
            action: BatchAction::Unfollow,
            total: plan.items.len(),
            skipped: plan.unresolved.len(),
        },
    );
    let report = run_batch(client, BatchAction::Unfollow, plan.items, options, on_progress).await;
    Ok(Outcome::Completed(report))
}

/// Unfollow every followed project and proto-project.
///
/// Needs the snapshot even when degrading is allowed, and always asks
/// unless `assume_yes` is set.
pub async fn unfollow_all<C: RemoteClient + Clone + 'static>(
    client: &C,
    options: &BatchOptions,
    confirm: &Confirm,
    on_progress: Option<Arc<ProgressCallback>>,
) -> Result<Outcome> {
    let progress = on_progress.as_deref();
    let Some(snapshot) = load_followed(client, options, progress).await? else {
        return Err(EngineError::SnapshotRequired);
    };

    let items = plan_unfollow_all(&snapshot);
    if items.is_empty() {
        return Ok(Outcome::Completed(BatchReport::default()));
    }

    let question = format!(
        "Unfollow all {} projects and {} proto-projects?",
        snapshot.projects.len(),
        snapshot.proto_projects.len()
    );
    if !confirmed(options, confirm, &question) {
        return Ok(Outcome::Declined);
    }

    emit(
        progress,
        BatchProgress::Planned {
            action: BatchAction::Unfollow,
            total: items.len(),
            skipped: 0,
        },
    );
    let report = run_batch(client, BatchAction::Unfollow, items, options, on_progress).await;
    Ok(Outcome::Completed(report))
}

/// Add followed candidates to the project list named `selection`.
pub async fn add_to_selection<C: RemoteClient + ProjectAdmin + Clone + 'static>(
    client: &C,
    selection: &str,
    candidates: &[String],
    options: &BatchOptions,
    on_progress: Option<Arc<ProgressCallback>>,
) -> Result<SelectionReport> {
    let exclude = GlobList::new(&options.exclude)?;
    let progress = on_progress.as_deref();
    let snapshot = load_followed(client, options, progress).await?;

    let contents = client.get_selection(selection).await?;
    tracing::info!(
        list = %selection,
        projects = contents.project_keys.len(),
        "fetched project list"
    );

    let plan = match snapshot {
        Some(snapshot) => plan_add_to_selection(candidates, &snapshot, &contents, &exclude),
        None => plan_add_to_selection_degraded(client, candidates, &contents, &exclude).await,
    };
    report_skips(&plan.excluded, &plan.unresolved, progress);
    emit(
        progress,
        BatchProgress::Planned {
            action: BatchAction::AddToSelection,
            total: plan.items.len(),
            skipped: plan.already_present,
        },
    );

    let batch = run_batch(
        client,
        BatchAction::AddToSelection,
        plan.items.clone(),
        options,
        on_progress,
    )
    .await;
    Ok(SelectionReport { plan, batch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::test_support::{Call, MockRemote, project, proto};

    fn snapshot() -> FollowedSnapshot {
        FollowedSnapshot {
            projects: vec![project("p1", "https://github.com/a/b")],
            proto_projects: vec![proto("x1", "https://github.com/a/new.git")],
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn never(_: &str) -> bool {
        panic!("confirmation should not be asked")
    }

    #[tokio::test]
    async fn follow_skips_already_followed() {
        let client = Arc::new(MockRemote::new().with_snapshot(snapshot()));
        let report = follow(
            &client,
            &strings(&["https://github.com/a/b", "https://github.com/a/c"]),
            &BatchOptions::default(),
            None,
        )
        .await
        .expect("follow");

        assert_eq!(report.plan.delta, vec!["https://github.com/a/c"]);
        assert_eq!(report.batch.succeeded, vec!["https://github.com/a/c"]);
        assert_eq!(report.batch.newly_created, 1);
        assert_eq!(
            client.calls(),
            vec![Call::ListFollowed, Call::Follow("https://github.com/a/c".to_string())]
        );
    }

    #[tokio::test]
    async fn snapshot_failure_without_permission_aborts() {
        let client = Arc::new(MockRemote::new().failing_list(504));
        let err = follow(
            &client,
            &strings(&["https://github.com/a/c"]),
            &BatchOptions::default(),
            None,
        )
        .await
        .expect_err("must abort");
        assert!(err.is_cache_error());
        assert_eq!(client.state_changing_calls(), 0);
    }

    #[tokio::test]
    async fn snapshot_failure_with_permission_degrades() {
        let client = Arc::new(
            MockRemote::new()
                .failing_list(504)
                .with_slug("g/a/b", project("p1", "https://github.com/a/b")),
        );
        let options = BatchOptions {
            ignore_cache_errors: true,
            ..BatchOptions::default()
        };
        let warnings = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&warnings);
        let callback: ProgressCallback = Box::new(move |event| {
            if matches!(event, BatchProgress::Warning { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let report = follow(
            &client,
            &strings(&["https://github.com/a/b", "https://github.com/a/c"]),
            &options,
            Some(Arc::new(callback)),
        )
        .await
        .expect("degraded follow");
        assert_eq!(report.batch.succeeded, vec!["https://github.com/a/c"]);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn followed_list_timeout_is_named_in_the_warning() {
        let client = Arc::new(MockRemote::new().timing_out_list());
        let options = BatchOptions {
            ignore_cache_errors: true,
            ..BatchOptions::default()
        };
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&warnings);
        let callback: ProgressCallback = Box::new(move |event| {
            if let BatchProgress::Warning { message } = event {
                sink.lock().expect("lock").push(message);
            }
        });

        let snapshot = load_followed(&client, &options, Some(&callback))
            .await
            .expect("degrades");
        assert!(snapshot.is_none());
        let warnings = warnings.lock().expect("lock");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("timed out (large account)"), "{}", warnings[0]);
    }

    #[tokio::test]
    async fn nocache_never_lists_followed() {
        let client = Arc::new(MockRemote::new());
        let options = BatchOptions {
            no_cache: true,
            ..BatchOptions::default()
        };
        let report = follow(&client, &strings(&["https://github.com/a/c"]), &options, None)
            .await
            .expect("follow");
        assert_eq!(report.batch.succeeded_count(), 1);
        assert!(!client.calls().contains(&Call::ListFollowed));
    }

    #[tokio::test]
    async fn match_everything_declined_sends_nothing() {
        let client = Arc::new(MockRemote::new().with_snapshot(snapshot()));
        let asked = Arc::new(AtomicUsize::new(0));
        let asked_in = Arc::clone(&asked);
        let decline = move |_: &str| {
            asked_in.fetch_add(1, Ordering::SeqCst);
            false
        };

        let outcome = unfollow(
            &client,
            &strings(&["github.com/*"]),
            &BatchOptions::default(),
            &decline,
            None,
        )
        .await
        .expect("unfollow");
        assert_eq!(outcome, Outcome::Declined);
        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert_eq!(client.state_changing_calls(), 0);
    }

    #[tokio::test]
    async fn match_everything_confirmed_unfollows_all() {
        let client = Arc::new(MockRemote::new().with_snapshot(snapshot()));
        let accept = |_: &str| true;
        let outcome = unfollow(
            &client,
            &strings(&["github.com/*"]),
            &BatchOptions::default(),
            &accept,
            None,
        )
        .await
        .expect("unfollow");
        let report = outcome.report().expect("completed");
        assert_eq!(report.succeeded_count(), 2);
        assert!(client.calls().contains(&Call::Unfollow("x1".to_string(), true)));
    }

    #[tokio::test]
    async fn narrow_unfollow_does_not_ask() {
        let client = Arc::new(MockRemote::new().with_snapshot(snapshot()));
        let outcome = unfollow(
            &client,
            &strings(&["a/b"]),
            &BatchOptions::default(),
            &never,
            None,
        )
        .await
        .expect("unfollow");
        assert_eq!(
            outcome.report().map(|r| r.succeeded.clone()),
            Some(vec!["https://github.com/a/b".to_string()])
        );
    }

    #[tokio::test]
    async fn unfollow_all_requires_snapshot() {
        let client = Arc::new(MockRemote::new().failing_list(504));
        let options = BatchOptions {
            ignore_cache_errors: true,
            assume_yes: true,
            ..BatchOptions::default()
        };
        let err = unfollow_all(&client, &options, &never, None)
            .await
            .expect_err("needs snapshot");
        assert!(matches!(err, EngineError::SnapshotRequired));
        assert_eq!(client.state_changing_calls(), 0);
    }

    #[tokio::test]
    async fn unfollow_all_with_assume_yes_skips_prompt() {
        let client = Arc::new(MockRemote::new().with_snapshot(snapshot()));
        let options = BatchOptions {
            assume_yes: true,
            ..BatchOptions::default()
        };
        let outcome = unfollow_all(&client, &options, &never, None)
            .await
            .expect("unfollow all");
        assert_eq!(outcome.report().map(BatchReport::succeeded_count), Some(2));
    }

    #[tokio::test]
    async fn invalid_exclude_pattern_is_reported_before_any_call() {
        let client = Arc::new(MockRemote::new().with_snapshot(snapshot()));
        let options = BatchOptions {
            exclude: vec!["[unterminated".to_string()],
            ..BatchOptions::default()
        };
        let err = follow(&client, &strings(&["https://github.com/a/c"]), &options, None)
            .await
            .expect_err("bad pattern");
        assert!(matches!(err, EngineError::Pattern(_)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn add_to_selection_adds_missing_keys() {
        let client = Arc::new(
            MockRemote::new()
                .with_snapshot(FollowedSnapshot {
                    projects: vec![
                        project("p1", "https://github.com/a/b"),
                        project("p2", "https://github.com/a/c"),
                    ],
                    proto_projects: vec![proto("x1", "https://github.com/a/new")],
                })
                .with_selection("sel-1", "mine", &["p2"]),
        );
        let report = add_to_selection(
            &client,
            "mine",
            &strings(&[
                "https://github.com/a/b",
                "https://github.com/a/c",
                "https://github.com/a/new",
            ]),
            &BatchOptions::default(),
            None,
        )
        .await
        .expect("add");
        assert_eq!(report.plan.keys, vec!["p1"]);
        assert_eq!(report.plan.unresolved.len(), 1);
        assert_eq!(report.batch.succeeded_count(), 1);
        assert!(client.calls().contains(&Call::AddToSelection(
            "sel-1".to_string(),
            vec!["p1".to_string()]
        )));
    }

    #[tokio::test]
    async fn add_to_selection_honors_excludes() {
        let client = Arc::new(
            MockRemote::new()
                .with_snapshot(FollowedSnapshot {
                    projects: vec![
                        project("p1", "https://github.com/a/b"),
                        project("p2", "https://github.com/skip/me"),
                    ],
                    proto_projects: Vec::new(),
                })
                .with_selection("sel-1", "mine", &[]),
        );
        let options = BatchOptions {
            exclude: vec!["skip/*".to_string()],
            ..BatchOptions::default()
        };
        let excluded = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&excluded);
        let callback: ProgressCallback = Box::new(move |event| {
            if matches!(event, BatchProgress::Excluded { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let report = add_to_selection(
            &client,
            "mine",
            &strings(&["https://github.com/a/b", "https://github.com/skip/me"]),
            &options,
            Some(Arc::new(callback)),
        )
        .await
        .expect("add");
        assert_eq!(report.plan.keys, vec!["p1"]);
        assert_eq!(excluded.load(Ordering::SeqCst), 1);
        assert!(client.calls().contains(&Call::AddToSelection(
            "sel-1".to_string(),
            vec!["p1".to_string()]
        )));
    }

    #[tokio::test]
    async fn add_to_unknown_selection_fails() {
        let client = Arc::new(MockRemote::new().with_snapshot(snapshot()));
        let err = add_to_selection(
            &client,
            "missing",
            &strings(&["https://github.com/a/b"]),
            &BatchOptions::default(),
            None,
        )
        .await
        .expect_err("no such list");
        assert!(matches!(err, EngineError::Remote(ref e) if e.is_not_found()));
        assert_eq!(client.state_changing_calls(), 0);
    }
}

//! Progress reporting types for batch operations.
//!
//! The library never prints. Everything a user might want to see is sent as
//! a [`BatchProgress`] event to an optional callback; the CLI renders them
//! as progress bars on a terminal and as log lines otherwise.

use std::time::Duration;

use super::types::BatchAction;

/// Progress events emitted while planning and running a batch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum BatchProgress {
    /// Fetching the followed snapshot.
    FetchingFollowed,

    /// Snapshot fetched.
    FetchedFollowed {
        projects: usize,
        proto_projects: usize,
        elapsed: Duration,
    },

    /// No snapshot; the planner falls back to per-item lookups.
    CacheUnavailable {
        /// Why there is no snapshot.
        reason: String,
    },

    /// Starting to list repositories for an owner or a search.
    FetchingRepos {
        /// Owner login or search query.
        namespace: String,
    },

    /// Fetched a page of repositories.
    FetchedPage {
        namespace: String,
        /// Page number (1-indexed).
        page: u32,
        count: usize,
        total_so_far: usize,
    },

    /// Finished listing repositories.
    FetchComplete { namespace: String, total: usize },

    /// A fork was dropped from the candidates.
    SkippedFork { full_name: String },

    /// A discovery request hit a rate limit and will be retried.
    RateLimitBackoff {
        /// What was being fetched.
        target: String,
        retry_after_ms: u64,
        attempt: u32,
    },

    /// A candidate matched an exclude pattern.
    Excluded { item: String, pattern: String },

    /// A candidate could not be planned.
    Unresolved { item: String, reason: String },

    /// Planning finished.
    Planned {
        action: BatchAction,
        /// Work items produced.
        total: usize,
        /// Candidates dropped because the remote state already matches.
        skipped: usize,
    },

    /// About to dispatch work items.
    Dispatching {
        action: BatchAction,
        total: usize,
        concurrency: usize,
    },

    /// A work item was admitted and its remote call is about to be issued.
    ItemStarted {
        action: BatchAction,
        item: String,
        /// 1-indexed dispatch position.
        position: usize,
        total: usize,
        /// Formatted percent done at admission.
        percent: String,
        eta: Duration,
    },

    /// A work item succeeded.
    ItemSucceeded {
        action: BatchAction,
        item: String,
        /// For follows: the service had never seen the repository.
        created: bool,
    },

    /// A work item failed. The batch carries on.
    ItemFailed {
        action: BatchAction,
        item: String,
        error: String,
    },

    /// Follows are paused after a brand-new repository.
    CoolingDown { wait: Duration },

    /// Every dispatched item has finished.
    BatchComplete {
        action: BatchAction,
        total: usize,
        succeeded: usize,
        created: usize,
        failed: usize,
    },

    /// Something worth surfacing that doesn't stop the batch.
    Warning { message: String },
}

/// Callback type for progress reporting.
pub type ProgressCallback = Box<dyn Fn(BatchProgress) + Send + Sync>;

/// Emit a progress event if a callback is registered.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: BatchProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

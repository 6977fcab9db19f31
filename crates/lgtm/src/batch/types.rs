//! Batch types and constants.

use std::fmt;
use std::time::Duration;

/// Default number of remote calls in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// The service accepts at most this many keys per selection update.
pub const SELECTION_CHUNK_SIZE: usize = 100;

/// Knobs shared by every batch command.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum concurrent remote calls.
    pub concurrency: usize,
    /// Cooldown after following a repository the service had never seen.
    pub follow_wait: Duration,
    /// Fall back to per-item lookups when the followed snapshot can't be fetched.
    pub ignore_cache_errors: bool,
    /// Skip the snapshot entirely and work item by item.
    pub no_cache: bool,
    /// Display-name globs to leave out of the plan.
    pub exclude: Vec<String>,
    /// Answer yes to every confirmation.
    pub assume_yes: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            follow_wait: Duration::ZERO,
            ignore_cache_errors: false,
            no_cache: false,
            exclude: Vec::new(),
            assume_yes: false,
        }
    }
}

/// What a batch does to each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchAction {
    Follow,
    Unfollow,
    AddToSelection,
}

impl BatchAction {
    /// Present participle used in progress lines.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            BatchAction::Follow => "Following",
            BatchAction::Unfollow => "Unfollowing",
            BatchAction::AddToSelection => "Adding to list",
        }
    }

    #[must_use]
    pub fn past(self) -> &'static str {
        match self {
            BatchAction::Follow => "Followed",
            BatchAction::Unfollow => "Unfollowed",
            BatchAction::AddToSelection => "Added",
        }
    }
}

/// One outstanding remote action. Consumed exactly once; never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Follow {
        url: String,
    },
    Unfollow {
        key: String,
        is_proto: bool,
        display_name: String,
    },
    AddToSelection {
        selection_key: String,
        project_keys: Vec<String>,
    },
}

impl WorkItem {
    #[must_use]
    pub fn action(&self) -> BatchAction {
        match self {
            WorkItem::Follow { .. } => BatchAction::Follow,
            WorkItem::Unfollow { .. } => BatchAction::Unfollow,
            WorkItem::AddToSelection { .. } => BatchAction::AddToSelection,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Follow { url } => f.write_str(url),
            WorkItem::Unfollow {
                display_name,
                is_proto,
                ..
            } => {
                if *is_proto {
                    write!(f, "{display_name} (proto)")
                } else {
                    f.write_str(display_name)
                }
            }
            WorkItem::AddToSelection { project_keys, .. } => {
                write!(f, "{} project(s)", project_keys.len())
            }
        }
    }
}

/// A work item that failed, with the remote error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

/// Summary of a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items dispatched.
    pub total: usize,
    /// Items that succeeded, in dispatch order.
    pub succeeded: Vec<String>,
    /// Follows of repositories the service had never seen.
    pub newly_created: usize,
    /// Items that failed, in dispatch order.
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

/// How a guarded batch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(BatchReport),
    /// The user declined the confirmation; nothing was sent.
    Declined,
}

impl Outcome {
    #[must_use]
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            Outcome::Completed(report) => Some(report),
            Outcome::Declined => None,
        }
    }
}

/// An input the planner could not turn into work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub item: String,
    pub reason: String,
}

impl Unresolved {
    pub fn new(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            reason: reason.into(),
        }
    }
}

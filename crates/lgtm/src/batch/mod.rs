//! Bounded-concurrency batch execution against the followed set.
//!
//! # Module Structure
//!
//! - [`types`] - `BatchOptions`, `WorkItem`, `BatchReport`, constants
//! - [`progress`] - `BatchProgress`, `ProgressCallback`, `emit()`
//! - [`eta`] - `ProgressTracker` and ETA formatting
//! - [`pool`] - `WorkerPool` and the follow cooldown gate
//! - [`engine`] - `follow()`, `unfollow()`, `unfollow_all()`, `add_to_selection()`
//!
//! # Example
//!
//! ```ignore
//! use lgtm::batch::{BatchOptions, follow};
//! use lgtm::remote::{LgtmClient, RateLimitedClient, rate_limits};
//!
//! let client = RateLimitedClient::new(LgtmClient::new(credentials)?, rate_limits::LGTM_DEFAULT_RPS);
//! let report = follow(&client, &candidates, &BatchOptions::default(), None).await?;
//! println!("Followed {} projects ({} new)", report.batch.succeeded_count(), report.batch.newly_created);
//! ```

pub mod engine;
pub mod eta;
pub mod pool;
mod progress;
mod types;

pub use types::{
    BatchAction, BatchOptions, BatchReport, ItemFailure, Outcome, Unresolved, WorkItem,
};

pub use types::{DEFAULT_CONCURRENCY, SELECTION_CHUNK_SIZE};

pub use progress::{BatchProgress, ProgressCallback, emit};

pub use engine::{
    Confirm, EngineError, FollowReport, SelectionReport, add_to_selection, follow, load_followed,
    run_batch, unfollow, unfollow_all,
};
pub use eta::{ProgressTracker, format_eta};
pub use pool::{FollowCooldown, WorkerPool};

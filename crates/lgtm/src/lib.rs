//! lgtm - batch management of the projects an account follows on lgtm.com.
//!
//! The library reconciles a list of candidate repositories against the
//! account's followed set and issues the remaining follow, unfollow and
//! list-membership calls through a bounded worker pool.
//!
//! # Features
//!
//! - `github` - expand owners and searches into repositories via the GitHub API.
//! - `discovery` - find the importers of a Go package on pkg.go.dev.
//!
//! # Example
//!
//! ```ignore
//! use lgtm::{BatchOptions, Credentials, LgtmClient, RateLimitedClient, rate_limits};
//!
//! let client = RateLimitedClient::new(LgtmClient::new(credentials)?, rate_limits::LGTM_DEFAULT_RPS);
//! let report = lgtm::batch::follow(&client, &["github.com/tokio-rs/tokio".into()], &BatchOptions::default(), None).await?;
//! println!("Followed {} projects ({} new)", report.batch.succeeded_count(), report.batch.newly_created);
//! ```

pub mod batch;
pub mod cache;
pub mod http;
pub mod matcher;
pub mod planner;
pub mod remote;
pub mod target;

#[cfg(feature = "github")]
pub mod retry;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "discovery")]
pub mod discovery;

#[cfg(test)]
mod test_support;

pub use batch::{BatchAction, BatchOptions, BatchProgress, BatchReport, Outcome, ProgressCallback};
pub use cache::{CacheError, FollowedCache};
pub use matcher::{GlobList, MatcherError};
pub use remote::{
    ApiRateLimiter, Credentials, LgtmClient, ProjectAdmin, RateLimitedClient, RemoteClient,
    RemoteError, rate_limits,
};
pub use target::{GitUrl, RepoSource, TargetError, parse_git_url};

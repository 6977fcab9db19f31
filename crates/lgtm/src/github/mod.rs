//! Repository discovery on GitHub.
//!
//! Used to expand bare owners into repository lists and to build follow
//! candidates from language, metadata and code searches.
//!
//! # Module Structure
//!
//! - [`error`] - `GitHubError` and rate limit detection
//! - [`types`] - wire types and paging constants
//! - `client` - client creation, owner listings, [`RepoSource`](crate::target::RepoSource)
//! - `search` - repository and code search

mod client;
pub mod error;
mod search;
pub mod types;

pub use client::{GitHubClient, create_client};
pub use error::{GitHubError, is_rate_limit_error, is_rate_limit_error_from_github};
pub use search::{dedupe_repos, language_query, owner_language_query};
pub use types::{GhRepo, PER_PAGE, SEARCH_RESULT_CAP};

//! GitHub API error types.

use thiserror::Error;

/// Errors from discovery calls against GitHub.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    #[error("owner not found: {0}")]
    OwnerNotFound(String),

    #[error("owner {owner} is neither a user nor an organization (type {kind:?})")]
    UnknownOwnerType { owner: String, kind: String },
}

pub use crate::remote::short_error_message;

/// 403 and 429 are rate limits; so is an empty body that fails to parse.
pub fn is_rate_limit_error(e: &octocrab::Error) -> bool {
    match e {
        octocrab::Error::GitHub { source, .. } => {
            let status = source.status_code.as_u16();
            status == 403 || status == 429
        }
        octocrab::Error::Json { .. } => true,
        _ => false,
    }
}

pub fn is_rate_limit_error_from_github(e: &GitHubError) -> bool {
    match e {
        GitHubError::Api(inner) => is_rate_limit_error(inner),
        _ => false,
    }
}

/// Whether GitHub answered 404.
pub fn is_not_found_error(e: &octocrab::Error) -> bool {
    matches!(e, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

//! Client for the service that holds the account's follow state.
//!
//! The batch engine only depends on the [`RemoteClient`] trait; the HTTP
//! implementation lives in [`LgtmClient`] and pacing is layered on with
//! [`RateLimitedClient`].
//!
//! # Example
//!
//! ```ignore
//! use lgtm::remote::{Credentials, LgtmClient, RateLimitedClient, RemoteClient, rate_limits};
//!
//! let client = LgtmClient::new(credentials)?;
//! let client = RateLimitedClient::new(client, rate_limits::LGTM_DEFAULT_RPS);
//! let snapshot = client.list_followed().await?;
//! println!("{} projects followed", snapshot.projects.len());
//! ```

mod client;
mod errors;
mod rate_limit;
mod types;

pub use client::{Credentials, DEFAULT_BASE_URL, LgtmClient, REQUEST_TIMEOUT};
pub use errors::{RemoteError, Result, short_error_message};
pub use rate_limit::{ApiRateLimiter, RateLimitedClient, rate_limits};
pub use types::{
    ExternalUrl, FollowEnvelope, Followed, FollowedSnapshot, Project, ProjectAdmin, ProtoProject,
    QueryRequest, QueryRun, QueryStats, RemoteClient, SelectionContents, SelectionSummary,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_predicate() {
        assert!(RemoteError::not_found("g/a/b").is_not_found());
        assert!(!RemoteError::decode("bad").is_not_found());
        assert!(!RemoteError::status("error", "bad nonce").is_not_found());
    }

    #[test]
    fn timeout_predicate_only_matches_transport_timeouts() {
        let err = RemoteError::from(crate::http::HttpError::Timeout("5m".to_string()));
        assert!(err.is_timeout());
        let err = RemoteError::from(crate::http::HttpError::Transport("reset".to_string()));
        assert!(!err.is_timeout());
    }

    #[test]
    fn short_error_message_takes_first_line() {
        let err = RemoteError::Http {
            status: 500,
            body: "first line\nsecond line".to_string(),
        };
        assert_eq!(short_error_message(&err), "HTTP 500: first line");
    }

    #[test]
    fn project_supports_language() {
        let project = Project {
            languages: vec!["go".to_string(), "javascript".to_string()],
            ..Project::default()
        };
        assert!(project.supports_language("go"));
        assert!(!project.supports_language("python"));
    }

    #[test]
    fn followed_accessors() {
        let proto = Followed::Proto(ProtoProject {
            key: "x".to_string(),
            display_name: "a/b".to_string(),
            ..ProtoProject::default()
        });
        assert!(proto.is_proto());
        assert_eq!(proto.key(), "x");
        assert_eq!(proto.display_name(), "a/b");
    }
}

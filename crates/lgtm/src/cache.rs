//! In-memory snapshot of everything the account follows.
//!
//! The snapshot is fetched with a single `list_followed` call and replaced
//! wholesale on refresh. Readers take a cheap `Arc` clone, so a refresh
//! never tears a read in progress.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::matcher::{normalize_url, url_equals};
use crate::remote::{FollowedSnapshot, Project, ProtoProject, RemoteClient, RemoteError};

#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache was turned off by the caller; no request was made.
    #[error("followed projects were not fetched (cache disabled)")]
    Disabled,

    /// Fetching the snapshot failed.
    #[error("failed to fetch followed projects: {0}")]
    Fetch(#[source] RemoteError),
}

impl CacheError {
    #[inline]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Fetching timed out, which accounts following thousands of projects
    /// tend to hit.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_timeout())
    }
}

impl FollowedSnapshot {
    /// The followed project whose external URL matches `url`.
    #[must_use]
    pub fn get_project(&self, url: &str) -> Option<&Project> {
        self.projects
            .iter()
            .find(|p| url_equals(&p.external_url.url, url))
    }

    /// The followed proto-project whose clone URL matches `url`.
    #[must_use]
    pub fn get_proto(&self, url: &str) -> Option<&ProtoProject> {
        self.proto_projects
            .iter()
            .find(|p| url_equals(&p.clone_url, url))
    }

    #[must_use]
    pub fn is_followed(&self, url: &str) -> bool {
        self.get_project(url).is_some() || self.get_proto(url).is_some()
    }

    #[must_use]
    pub fn is_proto(&self, url: &str) -> bool {
        self.get_proto(url).is_some()
    }

    /// Candidates that are not followed, deduplicated in first-seen order.
    #[must_use]
    pub fn remove_followed<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .map(AsRef::as_ref)
            .filter(|c| seen.insert(dedupe_key(c)))
            .filter(|c| !self.is_followed(c))
            .map(str::to_string)
            .collect()
    }
}

/// Identity used when deduplicating candidate URLs.
#[must_use]
pub fn dedupe_key(url: &str) -> String {
    normalize_url(url).to_ascii_lowercase()
}

/// Read-mostly holder for the followed snapshot.
pub struct FollowedCache<C> {
    client: C,
    snapshot: RwLock<Arc<FollowedSnapshot>>,
}

impl<C: RemoteClient> FollowedCache<C> {
    /// An empty cache; call [`refresh`](Self::refresh) to populate it.
    pub fn new(client: C) -> Self {
        Self::with_snapshot(client, FollowedSnapshot::default())
    }

    pub fn with_snapshot(client: C, snapshot: FollowedSnapshot) -> Self {
        Self {
            client,
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Fetch a fresh snapshot and swap it in.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), CacheError> {
        let fresh = self.client.list_followed().await.map_err(CacheError::Fetch)?;
        tracing::debug!(
            projects = fresh.projects.len(),
            proto_projects = fresh.proto_projects.len(),
            "replacing followed snapshot"
        );
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(fresh);
        Ok(())
    }

    /// The current snapshot. Later refreshes don't affect the returned value.
    #[must_use]
    pub fn snapshot(&self) -> Arc<FollowedSnapshot> {
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    #[must_use]
    pub fn get_project(&self, url: &str) -> Option<Project> {
        self.snapshot().get_project(url).cloned()
    }

    #[must_use]
    pub fn get_proto(&self, url: &str) -> Option<ProtoProject> {
        self.snapshot().get_proto(url).cloned()
    }

    #[must_use]
    pub fn is_followed(&self, url: &str) -> bool {
        self.snapshot().is_followed(url)
    }

    #[must_use]
    pub fn is_proto(&self, url: &str) -> bool {
        self.snapshot().is_proto(url)
    }

    #[must_use]
    pub fn remove_followed<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<String> {
        self.snapshot().remove_followed(candidates)
    }

    #[must_use]
    pub fn num_projects(&self) -> usize {
        self.snapshot().projects.len()
    }

    #[must_use]
    pub fn num_proto(&self) -> usize {
        self.snapshot().proto_projects.len()
    }

    #[must_use]
    pub fn projects(&self) -> Vec<Project> {
        self.snapshot().projects.clone()
    }

    #[must_use]
    pub fn proto_projects(&self) -> Vec<ProtoProject> {
        self.snapshot().proto_projects.clone()
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

/// Build a populated cache, or report why there isn't one.
///
/// With `disabled` set this returns [`CacheError::Disabled`] without
/// touching the network.
pub async fn get_followed_cache<C: RemoteClient>(
    client: C,
    disabled: bool,
) -> Result<FollowedCache<C>, CacheError> {
    if disabled {
        return Err(CacheError::Disabled);
    }
    let cache = FollowedCache::new(client);
    cache.refresh().await?;
    Ok(cache)
}

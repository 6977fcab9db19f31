use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::errors::Result;
use super::types::{
    FollowEnvelope, FollowedSnapshot, Project, ProjectAdmin, QueryRequest, QueryRun, RemoteClient,
    SelectionContents, SelectionSummary,
};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default pacing for the remote service.
pub mod rate_limits {
    /// The internal API is shared with the web UI; one request per second keeps us polite.
    pub const LGTM_DEFAULT_RPS: u32 = 1;
    /// No burst beyond the steady rate by default.
    pub const LGTM_DEFAULT_BURST: u32 = 1;
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// A process-wide token bucket shared by every worker.
///
/// Cloning shares the bucket, so one limiter paces all callers.
///
/// # Example
///
/// ```ignore
/// use lgtm::remote::ApiRateLimiter;
///
/// let limiter = ApiRateLimiter::new(1);
/// limiter.wait().await;
/// client.follow(url).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}

impl ApiRateLimiter {
    /// Create a limiter with `requests_per_second` steady rate and no burst slack.
    ///
    /// Zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        Self::with_burst(requests_per_second, rate_limits::LGTM_DEFAULT_BURST)
    }

    /// Create a limiter that allows up to `burst` back-to-back requests.
    pub fn with_burst(requests_per_second: u32, burst: u32) -> Self {
        let quota = Quota::per_second(non_zero(requests_per_second)).allow_burst(non_zero(burst));
        Self {
            inner: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl Default for ApiRateLimiter {
    fn default() -> Self {
        Self::new(rate_limits::LGTM_DEFAULT_RPS)
    }
}

/// A rate-limited wrapper around any remote client.
///
/// Every trait method takes a token before delegating, so the batch engine
/// never has to think about pacing.
pub struct RateLimitedClient<C> {
    inner: C,
    limiter: ApiRateLimiter,
}

impl<C> RateLimitedClient<C> {
    pub fn new(inner: C, requests_per_second: u32) -> Self {
        Self::with_limiter(inner, ApiRateLimiter::new(requests_per_second))
    }

    /// Wrap `inner` with an existing (possibly shared) limiter.
    pub fn with_limiter(inner: C, limiter: ApiRateLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn wait(&self) {
        self.limiter.wait().await;
    }
}

impl<C: Clone> Clone for RateLimitedClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

#[async_trait]
impl<C: RemoteClient> RemoteClient for RateLimitedClient<C> {
    async fn list_followed(&self) -> Result<FollowedSnapshot> {
        self.wait().await;
        self.inner.list_followed().await
    }

    async fn follow(&self, url: &str) -> Result<FollowEnvelope> {
        self.wait().await;
        self.inner.follow(url).await
    }

    async fn unfollow(&self, key: &str, is_proto: bool) -> Result<()> {
        self.wait().await;
        self.inner.unfollow(key, is_proto).await
    }

    async fn get_project_by_slug(&self, slug: &str) -> Result<Project> {
        self.wait().await;
        self.inner.get_project_by_slug(slug).await
    }

    async fn add_to_selection(&self, selection_key: &str, project_keys: &[String]) -> Result<()> {
        self.wait().await;
        self.inner.add_to_selection(selection_key, project_keys).await
    }
}

#[async_trait]
impl<C: ProjectAdmin> ProjectAdmin for RateLimitedClient<C> {
    async fn list_selections(&self) -> Result<Vec<SelectionSummary>> {
        self.wait().await;
        self.inner.list_selections().await
    }

    async fn get_selection(&self, name: &str) -> Result<SelectionContents> {
        self.wait().await;
        self.inner.get_selection(name).await
    }

    async fn create_selection(&self, name: &str) -> Result<()> {
        self.wait().await;
        self.inner.create_selection(name).await
    }

    async fn delete_selection(&self, name: &str) -> Result<()> {
        self.wait().await;
        self.inner.delete_selection(name).await
    }

    async fn get_projects_by_key(&self, keys: &[String]) -> Result<HashMap<String, Project>> {
        self.wait().await;
        self.inner.get_projects_by_key(keys).await
    }

    async fn run_query(&self, request: &QueryRequest) -> Result<QueryRun> {
        self.wait().await;
        self.inner.run_query(request).await
    }

    async fn rebuild_proto(&self, key: &str) -> Result<()> {
        self.wait().await;
        self.inner.rebuild_proto(key).await
    }

    async fn new_build_attempt(&self, project_key: &str, lang: &str) -> Result<()> {
        self.wait().await;
        self.inner.new_build_attempt(project_key, lang).await
    }

    async fn request_test_build(&self, url_identifier: &str, langs: &[String]) -> Result<()> {
        self.wait().await;
        self.inner.request_test_build(url_identifier, langs).await
    }
}

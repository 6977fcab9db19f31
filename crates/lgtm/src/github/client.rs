//! GitHub client creation and owner listings.

use std::sync::Arc;

use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::{GitHubError, is_not_found_error, is_rate_limit_error_from_github, short_error_message};
use super::types::{Account, GhRepo, PER_PAGE, PageParams};
use crate::batch::{BatchProgress, ProgressCallback, emit};
use crate::retry::with_retry;
use crate::target::{RepoSource, SourceRepo, TargetError};

/// Create an Octocrab instance, authenticated when a token is given.
pub fn create_client(token: Option<&str>) -> Result<Octocrab, GitHubError> {
    let builder = Octocrab::builder();
    let builder = match token {
        Some(token) if !token.is_empty() => builder.personal_token(token.to_string()),
        _ => builder,
    };
    builder.build().map_err(GitHubError::Api)
}

/// Discovery client. Every request is retried on rate limiting.
#[derive(Clone)]
pub struct GitHubClient {
    pub(super) inner: Arc<Octocrab>,
    pub(super) on_progress: Option<Arc<ProgressCallback>>,
}

impl GitHubClient {
    pub fn new(token: Option<&str>) -> Result<Self, GitHubError> {
        Ok(Self::from_octocrab(create_client(token)?))
    }

    pub fn from_octocrab(client: Octocrab) -> Self {
        Self {
            inner: Arc::new(client),
            on_progress: None,
        }
    }

    /// Report paging and backoff events to `on_progress`.
    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<Arc<ProgressCallback>>) -> Self {
        self.on_progress = on_progress;
        self
    }

    pub(super) fn progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_deref()
    }

    pub(super) async fn get<R, P>(
        &self,
        route: &str,
        params: Option<&P>,
        target: &str,
    ) -> Result<R, GitHubError>
    where
        R: DeserializeOwned,
        P: Serialize + ?Sized + Sync,
    {
        with_retry(
            || async { self.inner.get(route, params).await.map_err(GitHubError::Api) },
            is_rate_limit_error_from_github,
            short_error_message,
            target,
            self.progress(),
        )
        .await
    }

    /// Look up whether `owner` is a user or an organization.
    pub async fn get_account(&self, owner: &str) -> Result<Account, GitHubError> {
        let route = format!("/users/{owner}");
        match self.get::<Account, ()>(&route, None, owner).await {
            Err(GitHubError::Api(e)) if is_not_found_error(&e) => {
                Err(GitHubError::OwnerNotFound(owner.to_string()))
            }
            Ok(account) if account.kind != "User" && !account.is_organization() => {
                Err(GitHubError::UnknownOwnerType {
                    owner: owner.to_string(),
                    kind: account.kind,
                })
            }
            other => other,
        }
    }

    /// Every repository `owner` has, forks included.
    pub async fn list_owner_repos(&self, owner: &str) -> Result<Vec<GhRepo>, GitHubError> {
        let account = self.get_account(owner).await?;
        let route = account.repos_route();
        emit(
            self.progress(),
            BatchProgress::FetchingRepos {
                namespace: owner.to_string(),
            },
        );

        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let params = PageParams {
                per_page: PER_PAGE,
                page,
                kind: (!account.is_organization()).then_some("owner"),
            };
            let repos: Vec<GhRepo> = self.get(&route, Some(&params), owner).await?;
            let count = repos.len();
            all.extend(repos);
            emit(
                self.progress(),
                BatchProgress::FetchedPage {
                    namespace: owner.to_string(),
                    page,
                    count,
                    total_so_far: all.len(),
                },
            );
            if count < PER_PAGE as usize {
                break;
            }
            page += 1;
        }

        tracing::debug!(owner, repos = all.len(), "listed owner repositories");
        emit(
            self.progress(),
            BatchProgress::FetchComplete {
                namespace: owner.to_string(),
                total: all.len(),
            },
        );
        Ok(all)
    }
}

#[async_trait]
impl RepoSource for GitHubClient {
    async fn list_owner_repos(
        &self,
        owner: &str,
        language: Option<&str>,
    ) -> Result<Vec<SourceRepo>, TargetError> {
        let repos = match language {
            Some(lang) => self.list_owner_repos_by_language(owner, lang).await,
            None => GitHubClient::list_owner_repos(self, owner).await,
        };
        repos
            .map(|repos| repos.into_iter().map(SourceRepo::from).collect())
            .map_err(|e| TargetError::Source {
                owner: owner.to_string(),
                message: short_error_message(&e),
            })
    }
}

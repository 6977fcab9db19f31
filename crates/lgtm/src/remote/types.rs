use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::Result;

/// A project the service has analyzed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    /// Opaque remote identifier.
    pub key: String,
    /// Languages the project has been built for.
    pub languages: Vec<String>,
    pub repo_provider: String,
    /// `owner/repo`.
    pub display_name: String,
    /// Provider-prefixed slug, e.g. `g/owner/repo`.
    pub slug: String,
    #[serde(rename = "externalURL")]
    pub external_url: ExternalUrl,
    #[serde(rename = "adminURL")]
    pub admin_url: String,
}

impl Project {
    #[must_use]
    pub fn supports_language(&self, lang: &str) -> bool {
        self.languages.iter().any(|l| l == lang)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalUrl {
    pub url: String,
    pub name: String,
    pub theme: String,
}

/// A project that is followed but not yet built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtoProject {
    pub key: String,
    pub display_name: String,
    pub state: String,
    pub build_attempt_key: String,
    pub next_build_started: bool,
    #[serde(rename = "cloneUrl")]
    pub clone_url: String,
}

/// One followed entry, decoded from the remote's two-slot envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followed {
    Project(Project),
    Proto(ProtoProject),
}

impl Followed {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Followed::Project(p) => &p.key,
            Followed::Proto(p) => &p.key,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Followed::Project(p) => &p.display_name,
            Followed::Proto(p) => &p.display_name,
        }
    }

    #[must_use]
    pub fn is_proto(&self) -> bool {
        matches!(self, Followed::Proto(_))
    }
}

/// Result of a follow call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowEnvelope {
    pub followed: Followed,
    /// False when the service had never seen the repository and created a
    /// proto-project for it.
    pub known: bool,
}

/// Everything the account follows, as returned by one `list_followed` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowedSnapshot {
    pub projects: Vec<Project>,
    pub proto_projects: Vec<ProtoProject>,
}

impl FollowedSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.proto_projects.is_empty()
    }
}

/// A named project list ("project selection") owned by the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSummary {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionContents {
    pub identity: SelectionSummary,
    #[serde(default)]
    pub project_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    pub lang: String,
    pub project_keys: Vec<String>,
    pub selection_keys: Vec<String>,
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryStats {
    pub all_runs: u64,
    pub failed: u64,
    pub finished_with_results: u64,
    pub finished_without_results: u64,
    pub incomplete: u64,
}

/// A submitted query run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRun {
    pub key: String,
    pub query_text: String,
    pub language_key: String,
    pub project_keys: Vec<String>,
    pub project_selection_keys: Vec<String>,
    pub stats: QueryStats,
}

impl QueryRun {
    #[must_use]
    pub fn result_link(&self) -> String {
        format!("https://lgtm.com/query/{}/", self.key)
    }
}

/// The five follow-state operations the batch engine depends on.
///
/// Implementations must be safe to call concurrently from multiple workers.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch every followed project and proto-project in one call.
    async fn list_followed(&self) -> Result<FollowedSnapshot>;

    /// Follow a repository by canonical URL.
    async fn follow(&self, url: &str) -> Result<FollowEnvelope>;

    /// Unfollow by key; proto-projects use a different endpoint.
    async fn unfollow(&self, key: &str, is_proto: bool) -> Result<()>;

    /// Look up a single project. Unknown slugs yield [`RemoteError::NotFound`].
    ///
    /// [`RemoteError::NotFound`]: super::RemoteError::NotFound
    async fn get_project_by_slug(&self, slug: &str) -> Result<Project>;

    /// Append project keys to a selection. Callers chunk to at most 100 keys.
    async fn add_to_selection(&self, selection_key: &str, project_keys: &[String]) -> Result<()>;
}

/// Account-management endpoints used by the single-shot commands.
#[async_trait]
pub trait ProjectAdmin: Send + Sync {
    async fn list_selections(&self) -> Result<Vec<SelectionSummary>>;

    async fn get_selection(&self, name: &str) -> Result<SelectionContents>;

    async fn create_selection(&self, name: &str) -> Result<()>;

    async fn delete_selection(&self, name: &str) -> Result<()>;

    async fn get_projects_by_key(&self, keys: &[String]) -> Result<HashMap<String, Project>>;

    async fn run_query(&self, request: &QueryRequest) -> Result<QueryRun>;

    async fn rebuild_proto(&self, key: &str) -> Result<()>;

    /// Attempt a build for a language the project was never built for.
    async fn new_build_attempt(&self, project_key: &str, lang: &str) -> Result<()>;

    /// Re-run the build for languages the project already has.
    async fn request_test_build(&self, url_identifier: &str, langs: &[String]) -> Result<()>;
}

#[async_trait]
impl<T: RemoteClient + ?Sized> RemoteClient for Arc<T> {
    async fn list_followed(&self) -> Result<FollowedSnapshot> {
        (**self).list_followed().await
    }

    async fn follow(&self, url: &str) -> Result<FollowEnvelope> {
        (**self).follow(url).await
    }

    async fn unfollow(&self, key: &str, is_proto: bool) -> Result<()> {
        (**self).unfollow(key, is_proto).await
    }

    async fn get_project_by_slug(&self, slug: &str) -> Result<Project> {
        (**self).get_project_by_slug(slug).await
    }

    async fn add_to_selection(&self, selection_key: &str, project_keys: &[String]) -> Result<()> {
        (**self).add_to_selection(selection_key, project_keys).await
    }
}

#[async_trait]
impl<T: ProjectAdmin + ?Sized> ProjectAdmin for Arc<T> {
    async fn list_selections(&self) -> Result<Vec<SelectionSummary>> {
        (**self).list_selections().await
    }

    async fn get_selection(&self, name: &str) -> Result<SelectionContents> {
        (**self).get_selection(name).await
    }

    async fn create_selection(&self, name: &str) -> Result<()> {
        (**self).create_selection(name).await
    }

    async fn delete_selection(&self, name: &str) -> Result<()> {
        (**self).delete_selection(name).await
    }

    async fn get_projects_by_key(&self, keys: &[String]) -> Result<HashMap<String, Project>> {
        (**self).get_projects_by_key(keys).await
    }

    async fn run_query(&self, request: &QueryRequest) -> Result<QueryRun> {
        (**self).run_query(request).await
    }

    async fn rebuild_proto(&self, key: &str) -> Result<()> {
        (**self).rebuild_proto(key).await
    }

    async fn new_build_attempt(&self, project_key: &str, lang: &str) -> Result<()> {
        (**self).new_build_attempt(project_key, lang).await
    }

    async fn request_test_build(&self, url_identifier: &str, langs: &[String]) -> Result<()> {
        (**self).request_test_build(url_identifier, langs).await
    }
}

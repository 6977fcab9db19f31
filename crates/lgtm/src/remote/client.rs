//! HTTP implementation of the remote client traits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpHeaders, HttpRequest, HttpResponse, HttpTransport};

use super::errors::{RemoteError, Result};
use super::types::{
    FollowEnvelope, Followed, FollowedSnapshot, Project, ProjectAdmin, ProtoProject, QueryRequest,
    QueryRun, RemoteClient, SelectionContents, SelectionSummary,
};

pub const DEFAULT_BASE_URL: &str = "https://lgtm.com/internal_api/v0.2/";

/// Snapshot fetches for large accounts are slow; keep the timeout generous.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_0) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/73.0.3683.103 Safari/537.36";

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";
const ERROR_NOT_FOUND: &str = "not found";

/// Session credentials copied from a logged-in browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_version: String,
    pub nonce: String,
    pub short_session: String,
    pub long_session: String,
}

impl Credentials {
    /// Every field is required and must be non-empty.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("api_version", &self.api_version),
            ("session.nonce", &self.nonce),
            ("session.short_session", &self.short_session),
            ("session.long_session", &self.long_session),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(RemoteError::config(format!("{name} is not set")));
            }
        }
        Ok(())
    }
}

/// Client for the service's internal JSON API.
pub struct LgtmClient<T> {
    transport: Arc<T>,
    credentials: Arc<Credentials>,
    base_url: Arc<str>,
}

impl<T> Clone for LgtmClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            credentials: Arc::clone(&self.credentials),
            base_url: Arc::clone(&self.base_url),
        }
    }
}

impl LgtmClient<ReqwestTransport> {
    /// Create a client backed by reqwest with the default request timeout.
    pub fn new(credentials: Credentials) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?;
        Self::with_transport(transport, credentials)
    }
}

impl<T: HttpTransport> LgtmClient<T> {
    pub fn with_transport(transport: T, credentials: Credentials) -> Result<Self> {
        credentials.validate()?;
        Ok(Self {
            transport: Arc::new(transport),
            credentials: Arc::new(credentials),
            base_url: Arc::from(DEFAULT_BASE_URL),
        })
    }

    /// Point the client at a different API root (trailing slash optional).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let trimmed = base_url.trim_end_matches('/');
        self.base_url = Arc::from(format!("{trimmed}/"));
        self
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name)
    }

    fn headers(&self) -> HttpHeaders {
        let creds = &self.credentials;
        let cookie = format!(
            "lgtm_long_session={}; lgtm_short_session={}; _consent_settings=accepted",
            creds.long_session, creds.short_session
        );
        [
            ("authority", "lgtm.com"),
            ("accept", "*/*"),
            ("lgtm-nonce", creds.nonce.as_str()),
            ("dnt", "1"),
            ("x-requested-with", "XMLHttpRequest"),
            ("user-agent", USER_AGENT),
            ("sec-fetch-site", "same-origin"),
            ("sec-fetch-mode", "cors"),
            ("referer", "https://lgtm.com/dashboard"),
            ("cookie", cookie.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    async fn get<D: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        resource: &str,
    ) -> Result<D> {
        let mut all = params.to_vec();
        all.push(("apiVersion", self.credentials.api_version.as_str()));
        let request = HttpRequest::get(&self.endpoint(endpoint), &all).with_headers(self.headers());
        self.execute(request, resource).await
    }

    async fn post<D: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        resource: &str,
    ) -> Result<D> {
        let mut all = params.to_vec();
        all.push(("apiVersion", self.credentials.api_version.as_str()));
        let request =
            HttpRequest::form_post(&self.endpoint(endpoint), &all).with_headers(self.headers());
        self.execute(request, resource).await
    }

    async fn execute<D: DeserializeOwned>(&self, request: HttpRequest, resource: &str) -> Result<D> {
        let endpoint = request.url.clone();
        tracing::debug!(method = request.method.as_str(), url = %endpoint, "remote request");

        let response = self.transport.send(request).await?;
        let data = decode_status(&response, resource)?;
        serde_json::from_value(data).map_err(|e| {
            RemoteError::decode(format!("unexpected data from {endpoint}: {e}"))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusEnvelope {
    status: String,
    error: String,
    message: Option<String>,
    data: serde_json::Value,
}

/// Validate the status envelope and hand back its `data` member.
fn decode_status(response: &HttpResponse, resource: &str) -> Result<serde_json::Value> {
    let parsed = serde_json::from_slice::<StatusEnvelope>(&response.body);

    let envelope = match parsed {
        Ok(env) if !env.status.is_empty() => env,
        Ok(_) | Err(_) if !response.is_success() => {
            return Err(RemoteError::Http {
                status: response.status,
                body: response.text(),
            });
        }
        Ok(_) => return Err(RemoteError::decode("response has no status field")),
        Err(e) => return Err(RemoteError::decode(e.to_string())),
    };

    if envelope.status == STATUS_SUCCESS && response.is_success() {
        return Ok(envelope.data);
    }
    if envelope.status == STATUS_ERROR && envelope.error == ERROR_NOT_FOUND {
        return Err(RemoteError::not_found(resource));
    }
    Err(RemoteError::Status {
        status: envelope.status,
        error: envelope.error,
        message: envelope.message,
    })
}

/// The wire shape of one followed entry: at most one slot is meaningful.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireEnvelope {
    #[serde(rename = "realProject")]
    real_project: Option<Vec<Project>>,
    protoproject: Option<ProtoProject>,
}

impl WireEnvelope {
    fn into_parts(self) -> (Option<Project>, Option<ProtoProject>) {
        let project = self.real_project.and_then(|v| v.into_iter().next());
        (project, self.protoproject)
    }

    fn into_followed(self) -> Option<Followed> {
        match self.into_parts() {
            (Some(project), _) => Some(Followed::Project(project)),
            (None, Some(proto)) => Some(Followed::Proto(proto)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlugLookup {
    left: Option<Project>,
    right: Option<SlugRedirect>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SlugRedirect {
    #[allow(dead_code)]
    requested_url_identifier: String,
    redirect: Option<Project>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProjectsByKey {
    full_projects: HashMap<String, Project>,
}

/// Encode keys the way the service expects list parameters: a JSON array string.
fn json_array(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[async_trait]
impl<T: HttpTransport> RemoteClient for LgtmClient<T> {
    async fn list_followed(&self) -> Result<FollowedSnapshot> {
        let envelopes: Vec<WireEnvelope> = self.get("getMyProjects", &[], "followed projects").await?;

        let mut snapshot = FollowedSnapshot::default();
        for env in envelopes {
            match env.into_followed() {
                Some(Followed::Project(p)) => snapshot.projects.push(p),
                Some(Followed::Proto(p)) => snapshot.proto_projects.push(p),
                None => tracing::debug!("skipping empty followed envelope"),
            }
        }
        tracing::debug!(
            projects = snapshot.projects.len(),
            proto_projects = snapshot.proto_projects.len(),
            "fetched followed snapshot"
        );
        Ok(snapshot)
    }

    async fn follow(&self, url: &str) -> Result<FollowEnvelope> {
        let env: WireEnvelope = self.post("followProject", &[("url", url)], url).await?;
        match env.into_parts() {
            (Some(project), _) => Ok(FollowEnvelope {
                followed: Followed::Project(project),
                known: true,
            }),
            (None, Some(proto)) => Ok(FollowEnvelope {
                followed: Followed::Proto(proto),
                known: false,
            }),
            (None, None) => Err(RemoteError::decode(format!(
                "follow response for {url} carried neither a project nor a proto-project"
            ))),
        }
    }

    async fn unfollow(&self, key: &str, is_proto: bool) -> Result<()> {
        let (endpoint, param) = if is_proto {
            ("unfollowProtoproject", "protoproject_key")
        } else {
            ("unfollowProject", "project_key")
        };
        let _: serde_json::Value = self.post(endpoint, &[(param, key)], key).await?;
        Ok(())
    }

    async fn get_project_by_slug(&self, slug: &str) -> Result<Project> {
        let lookup: Option<SlugLookup> =
            self.get("getProjectBySlug", &[("slug", slug)], slug).await?;
        let lookup = lookup.unwrap_or_default();
        lookup
            .left
            .or_else(|| lookup.right.and_then(|r| r.redirect))
            .ok_or_else(|| RemoteError::decode(format!("slug lookup for {slug} returned no project")))
    }

    async fn add_to_selection(&self, selection_key: &str, project_keys: &[String]) -> Result<()> {
        let added = json_array(project_keys);
        let _: serde_json::Value = self
            .post(
                "updateProjectSelection",
                &[
                    ("projectSelectionId", selection_key),
                    ("addedProjects", added.as_str()),
                    ("removedProjects", "[]"),
                ],
                selection_key,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<T: HttpTransport> ProjectAdmin for LgtmClient<T> {
    async fn list_selections(&self) -> Result<Vec<SelectionSummary>> {
        let lists: Option<Vec<SelectionSummary>> = self
            .post("getUsedProjectSelections", &[], "project lists")
            .await?;
        Ok(lists.unwrap_or_default())
    }

    async fn get_selection(&self, name: &str) -> Result<SelectionContents> {
        self.get("getProjectSelectionByName", &[("name", name)], name)
            .await
    }

    async fn create_selection(&self, name: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post("createProjectSelection", &[("name", name)], name)
            .await?;
        Ok(())
    }

    async fn delete_selection(&self, name: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post("deleteProjectSelection", &[("name", name)], name)
            .await?;
        Ok(())
    }

    async fn get_projects_by_key(&self, keys: &[String]) -> Result<HashMap<String, Project>> {
        let encoded = json_array(keys);
        let found: ProjectsByKey = self
            .get("getProjectsByKey", &[("keys", encoded.as_str())], "projects")
            .await?;
        Ok(found.full_projects)
    }

    async fn run_query(&self, request: &QueryRequest) -> Result<QueryRun> {
        let project_keys = json_array(&request.project_keys);
        let selection_keys = json_array(&request.selection_keys);
        self.post(
            "runQuery",
            &[
                ("lang", request.lang.as_str()),
                ("projectKeys", project_keys.as_str()),
                ("projectSelectionKeys", selection_keys.as_str()),
                ("queryString", request.query.as_str()),
                ("queryAllProjects", "false"),
                ("guessedLocation", ""),
            ],
            "query",
        )
        .await
    }

    async fn rebuild_proto(&self, key: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "rebuildProtoproject",
                &[("config", ""), ("protoproject_key", key)],
                key,
            )
            .await?;
        Ok(())
    }

    async fn new_build_attempt(&self, project_key: &str, lang: &str) -> Result<()> {
        let _: serde_json::Value = self
            .get(
                "newBuildAttempt",
                &[("projectKey", project_key), ("language", lang)],
                project_key,
            )
            .await?;
        Ok(())
    }

    async fn request_test_build(&self, url_identifier: &str, langs: &[String]) -> Result<()> {
        let languages = json_array(langs);
        let _: serde_json::Value = self
            .get(
                "requestTestBuild",
                &[
                    ("urlIdentifier", url_identifier),
                    ("languages", languages.as_str()),
                    ("config", ""),
                ],
                url_identifier,
            )
            .await?;
        Ok(())
    }
}

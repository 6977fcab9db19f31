//! In-memory remote used by unit tests across the crate.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::http::HttpError;
use crate::matcher::normalize_url;
use crate::remote::{
    ExternalUrl, FollowEnvelope, Followed, FollowedSnapshot, Project, ProjectAdmin, ProtoProject,
    QueryRequest, QueryRun, RemoteClient, RemoteError, Result as RemoteResult, SelectionContents,
    SelectionSummary,
};

pub(crate) fn project(key: &str, url: &str) -> Project {
    Project {
        key: key.to_string(),
        display_name: url.trim_start_matches("https://github.com/").to_string(),
        external_url: ExternalUrl {
            url: url.to_string(),
            ..ExternalUrl::default()
        },
        ..Project::default()
    }
}

pub(crate) fn proto(key: &str, clone_url: &str) -> ProtoProject {
    ProtoProject {
        key: key.to_string(),
        clone_url: clone_url.to_string(),
        ..ProtoProject::default()
    }
}

/// A remote call as the mock saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListFollowed,
    Follow(String),
    Unfollow(String, bool),
    Lookup(String),
    AddToSelection(String, Vec<String>),
}

impl Call {
    pub(crate) fn is_state_changing(&self) -> bool {
        matches!(
            self,
            Call::Follow(_) | Call::Unfollow(..) | Call::AddToSelection(..)
        )
    }
}

fn ident(s: &str) -> String {
    normalize_url(s).to_ascii_lowercase()
}

/// Scriptable [`RemoteClient`] that records calls and peak concurrency.
#[derive(Default)]
pub(crate) struct MockRemote {
    snapshot: FollowedSnapshot,
    list_error: Option<u16>,
    list_timeout: bool,
    /// URLs the service has seen before; other follows create proto-projects.
    known: HashSet<String>,
    /// URLs, keys or selection keys whose calls fail.
    failing: HashSet<String>,
    slugs: HashMap<String, Project>,
    selections: Vec<SelectionContents>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl MockRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_snapshot(mut self, snapshot: FollowedSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub(crate) fn failing_list(mut self, status: u16) -> Self {
        self.list_error = Some(status);
        self
    }

    pub(crate) fn timing_out_list(mut self) -> Self {
        self.list_timeout = true;
        self
    }

    pub(crate) fn known(mut self, url: &str) -> Self {
        self.known.insert(ident(url));
        self
    }

    pub(crate) fn failing(mut self, id: &str) -> Self {
        self.failing.insert(ident(id));
        self
    }

    pub(crate) fn with_slug(mut self, slug: &str, project: Project) -> Self {
        self.slugs.insert(slug.to_string(), project);
        self
    }

    pub(crate) fn with_selection(mut self, key: &str, name: &str, project_keys: &[&str]) -> Self {
        self.selections.push(SelectionContents {
            identity: SelectionSummary {
                key: key.to_string(),
                name: name.to_string(),
            },
            project_keys: project_keys.iter().map(|k| k.to_string()).collect(),
        });
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.timed_calls().into_iter().map(|(_, c)| c).collect()
    }

    pub(crate) fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn state_changing_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.is_state_changing()).count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((Instant::now(), call));
    }

    async fn in_flight<T>(&self, id: &str, ok: T) -> RemoteResult<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing.contains(&ident(id)) {
            return Err(RemoteError::status("error", format!("cannot process {id}")));
        }
        Ok(ok)
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn list_followed(&self) -> RemoteResult<FollowedSnapshot> {
        self.record(Call::ListFollowed);
        if self.list_timeout {
            return Err(HttpError::Timeout("list followed".to_string()).into());
        }
        match self.list_error {
            Some(status) => Err(RemoteError::Http {
                status,
                body: "upstream timed out".to_string(),
            }),
            None => Ok(self.snapshot.clone()),
        }
    }

    async fn follow(&self, url: &str) -> RemoteResult<FollowEnvelope> {
        self.record(Call::Follow(url.to_string()));
        let known = self.known.contains(&ident(url));
        let followed = if known {
            Followed::Project(project(&format!("key:{url}"), url))
        } else {
            Followed::Proto(proto(&format!("proto:{url}"), url))
        };
        self.in_flight(url, FollowEnvelope { followed, known }).await
    }

    async fn unfollow(&self, key: &str, is_proto: bool) -> RemoteResult<()> {
        self.record(Call::Unfollow(key.to_string(), is_proto));
        self.in_flight(key, ()).await
    }

    async fn get_project_by_slug(&self, slug: &str) -> RemoteResult<Project> {
        self.record(Call::Lookup(slug.to_string()));
        match self.slugs.get(slug) {
            Some(project) => self.in_flight(slug, project.clone()).await,
            None => Err(RemoteError::not_found(slug)),
        }
    }

    async fn add_to_selection(&self, selection_key: &str, project_keys: &[String]) -> RemoteResult<()> {
        self.record(Call::AddToSelection(
            selection_key.to_string(),
            project_keys.to_vec(),
        ));
        self.in_flight(selection_key, ()).await
    }
}

#[async_trait]
impl ProjectAdmin for MockRemote {
    async fn list_selections(&self) -> RemoteResult<Vec<SelectionSummary>> {
        Ok(self.selections.iter().map(|s| s.identity.clone()).collect())
    }

    async fn get_selection(&self, name: &str) -> RemoteResult<SelectionContents> {
        self.selections
            .iter()
            .find(|s| s.identity.name == name)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(name))
    }

    async fn create_selection(&self, _name: &str) -> RemoteResult<()> {
        panic!("unused in tests")
    }

    async fn delete_selection(&self, _name: &str) -> RemoteResult<()> {
        panic!("unused in tests")
    }

    async fn get_projects_by_key(&self, _keys: &[String]) -> RemoteResult<HashMap<String, Project>> {
        panic!("unused in tests")
    }

    async fn run_query(&self, _request: &QueryRequest) -> RemoteResult<QueryRun> {
        panic!("unused in tests")
    }

    async fn rebuild_proto(&self, _key: &str) -> RemoteResult<()> {
        panic!("unused in tests")
    }

    async fn new_build_attempt(&self, _project_key: &str, _lang: &str) -> RemoteResult<()> {
        panic!("unused in tests")
    }

    async fn request_test_build(&self, _url_identifier: &str, _langs: &[String]) -> RemoteResult<()> {
        panic!("unused in tests")
    }
}

//! Reconciliation planning: which candidates need a remote call.
//!
//! Every planner is deterministic. The same inputs and snapshot always give
//! the same items in the same order.
//!
//! With a snapshot the planners are pure. Without one (degraded mode) they
//! look candidates up one by one with `get_project_by_slug`; anything that
//! can't be looked up that way is reported as unresolved, never dropped
//! silently.

use std::collections::HashSet;

use crate::batch::{
    BatchProgress, ProgressCallback, SELECTION_CHUNK_SIZE, Unresolved, WorkItem, emit,
};
use crate::cache::dedupe_key;
use crate::matcher::{GlobList, MatcherError, expand_owner_to_glob, is_glob, url_equals};
use crate::remote::{FollowedSnapshot, RemoteClient, SelectionContents, short_error_message};
use crate::target::{TargetError, parse_git_url};

/// Planned follows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowPlan {
    /// Candidates to follow, in first-seen order.
    pub delta: Vec<String>,
    /// Candidates the account already follows (or, in degraded mode, that
    /// the service already knows).
    pub already_followed: Vec<String>,
    /// `(candidate, pattern)` for each excluded candidate.
    pub excluded: Vec<(String, String)>,
    pub unresolved: Vec<Unresolved>,
}

impl FollowPlan {
    #[must_use]
    pub fn items(&self) -> Vec<WorkItem> {
        self.delta
            .iter()
            .map(|url| WorkItem::Follow { url: url.clone() })
            .collect()
    }
}

/// Exclude patterns match the candidate URL or its `owner/repo` name.
fn excluded_by<'a>(exclude: &'a GlobList, candidate: &str) -> Option<&'a str> {
    if exclude.is_empty() {
        return None;
    }
    exclude.first_match(candidate).or_else(|| {
        parse_git_url(candidate, false)
            .ok()
            .and_then(|parsed| exclude.first_match(&parsed.display_name()))
    })
}

fn dedupe_candidates<S: AsRef<str>>(candidates: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| seen.insert(dedupe_key(c)))
        .collect()
}

/// Candidates minus what the snapshot already follows, minus excludes.
#[must_use]
pub fn plan_follow<S: AsRef<str>>(
    candidates: &[S],
    snapshot: &FollowedSnapshot,
    exclude: &GlobList,
) -> FollowPlan {
    let mut plan = FollowPlan::default();
    for candidate in dedupe_candidates(candidates) {
        if snapshot.is_followed(candidate) {
            plan.already_followed.push(candidate.to_string());
        } else if let Some(pattern) = excluded_by(exclude, candidate) {
            plan.excluded
                .push((candidate.to_string(), pattern.to_string()));
        } else {
            plan.delta.push(candidate.to_string());
        }
    }
    plan
}

/// [`plan_follow`] without a snapshot.
///
/// Candidates the service resolves to a built project are skipped. A
/// not-found lookup puts the candidate in the delta; any other lookup
/// error also keeps it (following is idempotent) with a warning.
pub async fn plan_follow_degraded<C: RemoteClient + ?Sized, S: AsRef<str>>(
    client: &C,
    candidates: &[S],
    exclude: &GlobList,
    on_progress: Option<&ProgressCallback>,
) -> FollowPlan {
    let mut plan = FollowPlan::default();
    for candidate in dedupe_candidates(candidates) {
        if let Some(pattern) = excluded_by(exclude, candidate) {
            plan.excluded
                .push((candidate.to_string(), pattern.to_string()));
            continue;
        }

        let parsed = match parse_git_url(candidate, true) {
            Ok(parsed) => parsed,
            Err(e) => {
                plan.unresolved.push(Unresolved::new(
                    candidate,
                    format!("not an owner/repo pair: {}", short_error_message(&e)),
                ));
                continue;
            }
        };
        let Some(slug) = parsed.slug() else {
            plan.delta.push(candidate.to_string());
            continue;
        };

        match client.get_project_by_slug(&slug).await {
            Ok(_) => plan.already_followed.push(candidate.to_string()),
            Err(e) if e.is_not_found() => plan.delta.push(candidate.to_string()),
            Err(e) => {
                let message = format!("lookup of {slug} failed: {}", short_error_message(&e));
                tracing::warn!(candidate, error = %e, "project lookup failed, following anyway");
                emit(on_progress, BatchProgress::Warning { message });
                plan.delta.push(candidate.to_string());
            }
        }
    }
    plan
}

/// One unfollow input, after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnfollowSelector {
    /// A glob, possibly expanded from a bare owner.
    Pattern(String),
    /// A single repository URL.
    Exact(String),
}

impl UnfollowSelector {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            UnfollowSelector::Pattern(s) | UnfollowSelector::Exact(s) => s,
        }
    }
}

/// Classify raw unfollow inputs. Owners become `owner/*` patterns.
pub fn parse_unfollow_inputs<S: AsRef<str>>(
    inputs: &[S],
) -> Result<Vec<UnfollowSelector>, TargetError> {
    let mut selectors = Vec::new();
    let mut seen = HashSet::new();
    for input in inputs.iter().map(|i| i.as_ref().trim()) {
        if input.is_empty() {
            continue;
        }
        let selector = if is_glob(input) {
            UnfollowSelector::Pattern(input.to_string())
        } else {
            let parsed = parse_git_url(input, false)?;
            if parsed.is_owner_only() {
                UnfollowSelector::Pattern(expand_owner_to_glob(&parsed.url()))
            } else {
                UnfollowSelector::Exact(parsed.url())
            }
        };
        if seen.insert(dedupe_key(selector.as_str())) {
            selectors.push(selector);
        }
    }
    Ok(selectors)
}

/// Planned unfollows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnfollowPlan {
    pub items: Vec<WorkItem>,
    /// The first pattern that would match everything followed.
    pub match_everything: Option<String>,
    /// Selectors that matched nothing.
    pub unresolved: Vec<Unresolved>,
    /// `(item, pattern)` for each followed entry kept by an exclude.
    pub excluded: Vec<(String, String)>,
}

/// Followed entries matched by any selector: projects first, then
/// proto-projects, each in snapshot order.
pub fn plan_unfollow(
    selectors: &[UnfollowSelector],
    snapshot: &FollowedSnapshot,
    exclude: &GlobList,
) -> Result<UnfollowPlan, MatcherError> {
    let patterns: Vec<&str> = selectors
        .iter()
        .filter_map(|s| match s {
            UnfollowSelector::Pattern(p) => Some(p.as_str()),
            UnfollowSelector::Exact(_) => None,
        })
        .collect();
    let globs = GlobList::new(&patterns)?;
    let mut hits = vec![false; selectors.len()];

    let mut matches = |url: &str, name: &str| -> bool {
        let mut any = false;
        for (i, selector) in selectors.iter().enumerate() {
            let hit = match selector {
                UnfollowSelector::Exact(exact) => url_equals(url, exact),
                UnfollowSelector::Pattern(_) => false,
            };
            if hit {
                hits[i] = true;
                any = true;
            }
        }
        for pattern in globs.matches(url).chain(globs.matches(name)) {
            if let Some(i) = selectors.iter().position(|s| s.as_str() == pattern) {
                hits[i] = true;
            }
            any = true;
        }
        any
    };

    let mut plan = UnfollowPlan {
        match_everything: globs.has_match_everything().map(str::to_string),
        ..UnfollowPlan::default()
    };

    let mut candidates = Vec::new();
    for project in &snapshot.projects {
        let url = &project.external_url.url;
        if matches(url, &project.display_name) {
            candidates.push((project.key.clone(), false, url.clone()));
        }
    }
    for proto in &snapshot.proto_projects {
        let url = &proto.clone_url;
        if matches(url, &proto.display_name) {
            candidates.push((proto.key.clone(), true, url.clone()));
        }
    }

    for (key, is_proto, display_name) in candidates {
        if let Some(pattern) = excluded_by(exclude, &display_name) {
            plan.excluded.push((display_name, pattern.to_string()));
            continue;
        }
        plan.items.push(WorkItem::Unfollow {
            key,
            is_proto,
            display_name,
        });
    }

    for (selector, hit) in selectors.iter().zip(hits) {
        if !hit {
            plan.unresolved
                .push(Unresolved::new(selector.as_str(), "matches nothing followed"));
        }
    }
    Ok(plan)
}

/// [`plan_unfollow`] without a snapshot: exact repositories are resolved by
/// slug, patterns and owners can't be and are reported.
pub async fn plan_unfollow_degraded<C: RemoteClient + ?Sized>(
    client: &C,
    selectors: &[UnfollowSelector],
    exclude: &GlobList,
) -> UnfollowPlan {
    let mut plan = UnfollowPlan::default();
    for selector in selectors {
        let url = match selector {
            UnfollowSelector::Pattern(p) => {
                plan.unresolved.push(Unresolved::new(
                    p,
                    "patterns and owners need the followed list",
                ));
                continue;
            }
            UnfollowSelector::Exact(url) => url,
        };
        if let Some(pattern) = excluded_by(exclude, url) {
            plan.excluded.push((url.clone(), pattern.to_string()));
            continue;
        }
        let Some(slug) = parse_git_url(url, true).ok().and_then(|p| p.slug()) else {
            plan.unresolved
                .push(Unresolved::new(url, "host has no project lookup"));
            continue;
        };
        match client.get_project_by_slug(&slug).await {
            Ok(project) => plan.items.push(WorkItem::Unfollow {
                key: project.key,
                is_proto: false,
                display_name: url.clone(),
            }),
            Err(e) if e.is_not_found() => {
                plan.unresolved.push(Unresolved::new(url, "not found"));
            }
            Err(e) => plan
                .unresolved
                .push(Unresolved::new(url, short_error_message(&e))),
        }
    }
    plan
}

/// Every followed entry, projects first.
#[must_use]
pub fn plan_unfollow_all(snapshot: &FollowedSnapshot) -> Vec<WorkItem> {
    let projects = snapshot.projects.iter().map(|p| WorkItem::Unfollow {
        key: p.key.clone(),
        is_proto: false,
        display_name: p.external_url.url.clone(),
    });
    let protos = snapshot.proto_projects.iter().map(|p| WorkItem::Unfollow {
        key: p.key.clone(),
        is_proto: true,
        display_name: p.clone_url.clone(),
    });
    projects.chain(protos).collect()
}

/// Planned additions to a project list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPlan {
    /// One item per chunk of at most [`SELECTION_CHUNK_SIZE`] keys.
    pub items: Vec<WorkItem>,
    /// Keys being added, in candidate order.
    pub keys: Vec<String>,
    /// Candidates already in the list.
    pub already_present: usize,
    /// `(candidate, pattern)` for each excluded candidate.
    pub excluded: Vec<(String, String)>,
    pub unresolved: Vec<Unresolved>,
}

fn chunk_keys(selection_key: &str, keys: &[String]) -> Vec<WorkItem> {
    keys.chunks(SELECTION_CHUNK_SIZE)
        .map(|chunk| WorkItem::AddToSelection {
            selection_key: selection_key.to_string(),
            project_keys: chunk.to_vec(),
        })
        .collect()
}

/// Keys of followed, built candidates that aren't in the list yet, minus
/// excludes.
///
/// Proto-projects are reported and skipped because the service rejects
/// their keys. Candidates that aren't followed are reported.
#[must_use]
pub fn plan_add_to_selection<S: AsRef<str>>(
    candidates: &[S],
    snapshot: &FollowedSnapshot,
    selection: &SelectionContents,
    exclude: &GlobList,
) -> SelectionPlan {
    let present: HashSet<&str> = selection.project_keys.iter().map(String::as_str).collect();
    let mut queued = HashSet::new();
    let mut plan = SelectionPlan::default();

    for candidate in dedupe_candidates(candidates) {
        if let Some(pattern) = excluded_by(exclude, candidate) {
            plan.excluded
                .push((candidate.to_string(), pattern.to_string()));
        } else if let Some(project) = snapshot.get_project(candidate) {
            if present.contains(project.key.as_str()) {
                plan.already_present += 1;
            } else if queued.insert(project.key.clone()) {
                plan.keys.push(project.key.clone());
            }
        } else if snapshot.is_proto(candidate) {
            plan.unresolved
                .push(Unresolved::new(candidate, "not built yet, lists only take built projects"));
        } else {
            plan.unresolved
                .push(Unresolved::new(candidate, "project is not followed"));
        }
    }

    plan.items = chunk_keys(&selection.identity.key, &plan.keys);
    plan
}

/// [`plan_add_to_selection`] without a snapshot, resolving keys by slug.
pub async fn plan_add_to_selection_degraded<C: RemoteClient + ?Sized, S: AsRef<str>>(
    client: &C,
    candidates: &[S],
    selection: &SelectionContents,
    exclude: &GlobList,
) -> SelectionPlan {
    let present: HashSet<&str> = selection.project_keys.iter().map(String::as_str).collect();
    let mut queued = HashSet::new();
    let mut plan = SelectionPlan::default();

    for candidate in dedupe_candidates(candidates) {
        if let Some(pattern) = excluded_by(exclude, candidate) {
            plan.excluded
                .push((candidate.to_string(), pattern.to_string()));
            continue;
        }
        let Some(slug) = parse_git_url(candidate, true).ok().and_then(|p| p.slug()) else {
            plan.unresolved
                .push(Unresolved::new(candidate, "cannot look up without the followed list"));
            continue;
        };
        match client.get_project_by_slug(&slug).await {
            Ok(project) if present.contains(project.key.as_str()) => plan.already_present += 1,
            Ok(project) => {
                if queued.insert(project.key.clone()) {
                    plan.keys.push(project.key);
                }
            }
            Err(e) if e.is_not_found() => plan
                .unresolved
                .push(Unresolved::new(candidate, "project not found")),
            Err(e) => plan
                .unresolved
                .push(Unresolved::new(candidate, short_error_message(&e))),
        }
    }

    plan.items = chunk_keys(&selection.identity.key, &plan.keys);
    plan
}

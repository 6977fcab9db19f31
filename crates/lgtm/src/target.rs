//! Turning free-text repository identifiers into canonical URLs.
//!
//! Accepted forms are full URLs (`https://github.com/owner/repo.git`),
//! shorthand (`owner/repo`, `github.com/owner`) and bare owners
//! (`owner`), which expand to every repository the owner has.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::batch::{BatchProgress, ProgressCallback, emit};
use crate::cache::dedupe_key;

/// Host assumed for shorthand entries.
pub const DEFAULT_HOST: &str = "github.com";

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid repository URL {input:?}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("cannot list repositories for {owner}: {message}")]
    Source { owner: String, message: String },

    #[error("cannot expand owner {owner}: no repository source configured")]
    NoSource { owner: String },

    #[error("cannot expand owner {owner}: only github.com owners can be listed")]
    UnsupportedHost { owner: String },
}

impl TargetError {
    #[inline]
    pub fn invalid(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// A canonicalized repository or owner location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitUrl {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub owner: String,
    pub repo: Option<String>,
}

impl GitUrl {
    /// `scheme://host[:port]/owner[/repo]`.
    #[must_use]
    pub fn url(&self) -> String {
        let mut out = format!("{}://{}", self.scheme, self.host);
        if let Some(port) = self.port {
            out.push_str(&format!(":{port}"));
        }
        out.push('/');
        out.push_str(&self.owner);
        if let Some(repo) = &self.repo {
            out.push('/');
            out.push_str(repo);
        }
        out
    }

    /// `owner/repo`, or just `owner`.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.repo {
            Some(repo) => format!("{}/{}", self.owner, repo),
            None => self.owner.clone(),
        }
    }

    #[must_use]
    pub fn is_owner_only(&self) -> bool {
        self.repo.is_none()
    }

    /// The slug the service uses to look the project up, when the host has one.
    #[must_use]
    pub fn slug(&self) -> Option<String> {
        let repo = self.repo.as_ref()?;
        let prefix = match self.host.as_str() {
            "github.com" => "g",
            "gitlab.com" => "gl",
            "bitbucket.org" => "b",
            _ => return None,
        };
        Some(format!("{prefix}/{}/{repo}", self.owner))
    }
}

/// Parse a raw identifier into a [`GitUrl`].
///
/// Entries with at most one slash and no host-like first segment are
/// taken to live on [`DEFAULT_HOST`]. The path may hold at most
/// `owner/repo`; with `must_have_repo` an owner alone is rejected.
pub fn parse_git_url(raw: &str, must_have_repo: bool) -> Result<GitUrl, TargetError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(TargetError::invalid(raw, "empty input"));
    }

    let with_host = if !trimmed.contains("://") && trimmed.matches('/').count() <= 1 {
        let first = trimmed.split('/').next().unwrap_or_default();
        if first.contains('.') {
            trimmed.to_string()
        } else {
            format!("{DEFAULT_HOST}/{trimmed}")
        }
    } else {
        trimmed.to_string()
    };

    let with_scheme = if with_host.contains("://") {
        with_host
    } else {
        format!("https://{with_host}")
    };

    let parsed = Url::parse(&with_scheme).map_err(|e| TargetError::invalid(raw, e.to_string()))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TargetError::invalid(raw, "missing host"))?
        .to_lowercase();

    let path = parsed.path().trim_matches('/');
    let segments: Vec<&str> = if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').map(str::trim).collect()
    };
    if segments.len() > 2 {
        return Err(TargetError::invalid(
            raw,
            format!("{path} contains a wrong number of slashes"),
        ));
    }

    let owner = segments.first().copied().unwrap_or_default();
    if owner.is_empty() {
        return Err(TargetError::invalid(raw, "owner is required"));
    }
    let repo = segments
        .get(1)
        .map(|r| r.strip_suffix(".git").unwrap_or(r))
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    if must_have_repo && repo.is_none() {
        return Err(TargetError::invalid(raw, "repository name is required"));
    }

    Ok(GitUrl {
        scheme: parsed.scheme().to_string(),
        host,
        port: parsed.port(),
        owner: owner.to_string(),
        repo,
    })
}

/// Lines of a target list file: trimmed, without blanks or `#` comments.
#[must_use]
pub fn parse_target_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Deduplicate raw entries, keeping the first occurrence.
#[must_use]
pub fn dedupe(entries: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(dedupe_key(e)))
        .collect()
}

/// A repository as listed by a hosting provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepo {
    /// `owner/repo`.
    pub full_name: String,
    pub html_url: String,
    pub fork: bool,
}

/// Lists an owner's repositories, for expanding bare owners.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn list_owner_repos(
        &self,
        owner: &str,
        language: Option<&str>,
    ) -> Result<Vec<SourceRepo>, TargetError>;
}

/// Keep non-fork repositories, emitting a warning for each fork.
pub fn drop_forks(repos: Vec<SourceRepo>, on_progress: Option<&ProgressCallback>) -> Vec<String> {
    repos
        .into_iter()
        .filter_map(|repo| {
            if repo.fork {
                tracing::debug!(repo = %repo.full_name, "skipping fork");
                emit(
                    on_progress,
                    BatchProgress::SkippedFork {
                        full_name: repo.full_name,
                    },
                );
                None
            } else {
                Some(repo.html_url)
            }
        })
        .collect()
}

/// Canonicalize follow candidates, expanding bare owners through `source`.
///
/// Forks are skipped. The result is deduplicated in first-seen order.
pub async fn resolve_candidates(
    raw: &[String],
    source: Option<&dyn RepoSource>,
    language: Option<&str>,
    on_progress: Option<&ProgressCallback>,
) -> Result<Vec<String>, TargetError> {
    let mut urls = Vec::new();

    for entry in dedupe(raw.iter().cloned()) {
        let parsed = parse_git_url(&entry, false)?;
        if !parsed.is_owner_only() {
            urls.push(parsed.url());
            continue;
        }

        if parsed.host != DEFAULT_HOST {
            return Err(TargetError::UnsupportedHost {
                owner: parsed.url(),
            });
        }
        let source = source.ok_or_else(|| TargetError::NoSource {
            owner: parsed.owner.clone(),
        })?;

        tracing::debug!(owner = %parsed.owner, language = ?language, "expanding owner");
        let repos = source.list_owner_repos(&parsed.owner, language).await?;
        urls.extend(drop_forks(repos, on_progress));
    }

    Ok(dedupe(urls))
}

//! URL and pattern matching rules.
//!
//! Every comparison between a candidate repository and something the
//! account follows goes through this module, so `.git` suffixes, letter
//! case and scheme prefixes are handled in exactly one place.

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Strip trailing `.git` suffixes and slashes. Case is preserved.
#[must_use]
pub fn normalize_url(url: &str) -> &str {
    let mut current = url.trim();
    loop {
        let next = current
            .strip_suffix(".git")
            .or_else(|| current.strip_suffix('/'))
            .unwrap_or(current);
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}

/// Case-insensitive equality after normalization.
#[must_use]
pub fn url_equals(a: &str, b: &str) -> bool {
    normalize_url(a).eq_ignore_ascii_case(normalize_url(b))
}

/// The URL without its `scheme://` prefix.
#[must_use]
pub fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

/// Whether `s` contains glob metacharacters.
#[must_use]
pub fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Turn an owner URL into a pattern matching all of the owner's repositories.
#[must_use]
pub fn expand_owner_to_glob(owner_url: &str) -> String {
    format!("{}/*", normalize_url(owner_url))
}

/// Heuristic guard for patterns that would match every followed repository.
///
/// True when the pattern ends in `/*/*` or is exactly `<host>/*`. Broader
/// shapes such as `owner/*/extra` are not detected, and neither is a bare
/// `*`: it has no `/`, yet since `*` crosses `/` in a [`GlobList`] it
/// matches every followed repository on every host.
#[must_use]
pub fn is_match_everything(pattern: &str) -> bool {
    let p = strip_scheme(normalize_url(pattern));
    if p.ends_with("/*/*") {
        return true;
    }
    match p.strip_suffix("/*") {
        Some(host) => !host.is_empty() && !host.contains('/'),
        None => false,
    }
}

/// An ordered list of compiled glob patterns.
///
/// `*` crosses `/`, so `github.com/*` covers every repository on the host.
#[derive(Debug, Clone, Default)]
pub struct GlobList {
    patterns: Vec<(String, GlobMatcher)>,
}

impl GlobList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, MatcherError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let raw = raw.as_ref();
            let normalized = normalize_url(raw).to_lowercase();
            let glob = GlobBuilder::new(&normalized)
                .literal_separator(false)
                .build()
                .map_err(|source| MatcherError::InvalidPattern {
                    pattern: raw.to_string(),
                    source,
                })?;
            compiled.push((raw.to_string(), glob.compile_matcher()));
        }
        Ok(Self { patterns: compiled })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(raw, _)| raw.as_str())
    }

    /// The first pattern (in list order) matching `candidate`.
    ///
    /// The candidate is normalized and lower-cased; it matches if either the
    /// full URL or the URL without its scheme matches.
    #[must_use]
    pub fn first_match(&self, candidate: &str) -> Option<&str> {
        self.matches(candidate).next()
    }

    /// Every pattern matching `candidate`, in list order.
    pub fn matches<'a>(&'a self, candidate: &str) -> impl Iterator<Item = &'a str> + 'a {
        let full = normalize_url(candidate).to_lowercase();
        self.patterns
            .iter()
            .filter(move |(_, m)| m.is_match(&full) || m.is_match(strip_scheme(&full)))
            .map(|(raw, _)| raw.as_str())
    }

    #[must_use]
    pub fn is_match(&self, candidate: &str) -> bool {
        self.first_match(candidate).is_some()
    }

    /// Whether any pattern trips the match-everything guard.
    #[must_use]
    pub fn has_match_everything(&self) -> Option<&str> {
        self.patterns().find(|p| is_match_everything(p))
    }
}

/// One-shot form of [`GlobList::first_match`].
pub fn glob_match<S: AsRef<str>>(
    candidate: &str,
    patterns: &[S],
) -> Result<Option<String>, MatcherError> {
    let list = GlobList::new(patterns)?;
    Ok(list.first_match(candidate).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URLS: &[&str] = &[
        "https://github.com/a/b",
        "https://github.com/a/b.git",
        "https://github.com/a/b.git.git",
        "https://github.com/a/b/",
        "https://github.com/a/b.git/",
        "github.com/Owner/Repo",
        "",
        ".git",
    ];

    #[test]
    fn normalize_is_idempotent() {
        for url in URLS {
            let once = normalize_url(url);
            assert_eq!(normalize_url(once), once, "input {url:?}");
        }
    }

    #[test]
    fn normalize_strips_suffix_and_preserves_case() {
        assert_eq!(normalize_url("https://github.com/A/B.git"), "https://github.com/A/B");
        assert_eq!(normalize_url("https://github.com/a/b/"), "https://github.com/a/b");
        assert_eq!(normalize_url("https://github.com/a/legit"), "https://github.com/a/legit");
    }

    #[test]
    fn url_equals_is_symmetric_on_git_suffix() {
        let clone = "https://github.com/Foo/Bar";
        for candidate in ["https://github.com/foo/bar", "https://github.com/foo/baz"] {
            let base = url_equals(clone, candidate);
            assert_eq!(base, url_equals(&format!("{clone}.git"), candidate));
            assert_eq!(base, url_equals(clone, &format!("{candidate}.git")));
        }
        assert!(url_equals(clone, "https://github.com/foo/bar.git"));
        assert!(!url_equals(clone, "https://github.com/foo/baz"));
    }

    #[test]
    fn glob_returns_first_matching_pattern_in_order() {
        let patterns = ["github.com/other/*", "github.com/acme/*", "*/acme/web"];
        let hit = glob_match("https://github.com/ACME/web.git", &patterns).expect("valid");
        assert_eq!(hit.as_deref(), Some("github.com/acme/*"));

        let miss = glob_match("https://gitlab.com/acme/web", &patterns[..2]).expect("valid");
        assert_eq!(miss, None);
    }

    #[test]
    fn glob_matches_display_names() {
        let excludes = GlobList::new(&["github/*", "kubernetes/dashboard"]).expect("valid");
        assert_eq!(excludes.first_match("github/api"), Some("github/*"));
        assert!(excludes.is_match("Kubernetes/Dashboard"));
        assert!(!excludes.is_match("kubernetes/kubernetes"));
    }

    #[test]
    fn glob_matches_full_urls_with_scheme() {
        let list = GlobList::new(&["https://github.com/a/*"]).expect("valid");
        assert!(list.is_match("https://github.com/a/b"));
        assert!(!list.is_match("https://github.com/c/b"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = GlobList::new(&["github.com/[a"]).expect_err("unclosed class");
        assert!(err.to_string().contains("github.com/[a"));
    }

    #[test]
    fn owner_expansion_matches_owner_repos_only() {
        let pattern = expand_owner_to_glob("https://github.com/acme/");
        assert_eq!(pattern, "https://github.com/acme/*");
        let list = GlobList::new(&[pattern]).expect("valid");
        assert!(list.is_match("https://github.com/acme/tool"));
        assert!(!list.is_match("https://github.com/acmex/tool"));
    }

    #[test]
    fn match_everything_heuristic() {
        assert!(is_match_everything("github.com/*"));
        assert!(is_match_everything("https://github.com/*"));
        assert!(is_match_everything("github.com/*/*"));
        assert!(is_match_everything("*/*/*"));
        assert!(!is_match_everything("github.com/acme/*"));
        assert!(!is_match_everything("acme/*/extra"));
        assert!(!is_match_everything("github.com/acme/tool"));

        let list = GlobList::new(&["github.com/acme/*", "github.com/*"]).expect("valid");
        assert_eq!(list.has_match_everything(), Some("github.com/*"));
    }

    #[test]
    fn bare_star_matches_everything_but_is_not_flagged() {
        assert!(!is_match_everything("*"));
        let list = GlobList::new(&["*"]).expect("valid");
        assert!(list.is_match("https://github.com/a/b"));
        assert!(list.is_match("https://gitlab.com/group/sub/repo"));
        assert_eq!(list.has_match_everything(), None);
    }

    #[test]
    fn matches_yields_every_matching_pattern() {
        let list = GlobList::new(&["github.com/a/*", "other/*", "a/b*"]).expect("valid");
        let hits: Vec<&str> = list.matches("https://github.com/a/b").collect();
        assert_eq!(hits, vec!["github.com/a/*", "a/b*"]);
    }

    #[test]
    fn is_glob_detects_metacharacters() {
        assert!(is_glob("github.com/*"));
        assert!(is_glob("a/b?"));
        assert!(is_glob("a/[bc]"));
        assert!(!is_glob("https://github.com/a/b"));
    }
}

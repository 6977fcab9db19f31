//! GitHub wire types and paging constants.

use serde::{Deserialize, Serialize};

use crate::target::SourceRepo;

/// Page size for listings and searches.
pub const PER_PAGE: u32 = 100;

/// GitHub never returns more than this many search results.
pub const SEARCH_RESULT_CAP: usize = 1000;

/// The subset of a repository object discovery needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GhRepo {
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
}

impl From<GhRepo> for SourceRepo {
    fn from(repo: GhRepo) -> Self {
        SourceRepo {
            full_name: repo.full_name,
            html_url: repo.html_url,
            fork: repo.fork,
        }
    }
}

/// `GET /users/{owner}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Account {
    #[must_use]
    pub fn is_organization(&self) -> bool {
        self.kind == "Organization"
    }

    /// Route listing this account's repositories.
    #[must_use]
    pub fn repos_route(&self) -> String {
        if self.is_organization() {
            format!("/orgs/{}/repos", self.login)
        } else {
            format!("/users/{}/repos", self.login)
        }
    }
}

/// One page of `/search/*` results.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage<T> {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// A `/search/code` hit; only its repository matters.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeHit {
    pub repository: GhRepo,
}

#[derive(Debug, Serialize)]
pub(crate) struct PageParams {
    pub per_page: u32,
    pub page: u32,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchParams<'a> {
    pub q: &'a str,
    pub per_page: u32,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_route_depends_on_type() {
        let org: Account =
            serde_json::from_str(r#"{"login":"kubernetes","type":"Organization"}"#).expect("json");
        assert!(org.is_organization());
        assert_eq!(org.repos_route(), "/orgs/kubernetes/repos");

        let user: Account = serde_json::from_str(r#"{"login":"octocat","type":"User"}"#).expect("json");
        assert_eq!(user.repos_route(), "/users/octocat/repos");
    }

    #[test]
    fn search_page_tolerates_missing_fields() {
        let page: SearchPage<CodeHit> = serde_json::from_str(
            r#"{"items":[{"repository":{"full_name":"a/b","html_url":"https://github.com/a/b"}}]}"#,
        )
        .expect("json");
        assert_eq!(page.total_count, 0);
        assert_eq!(page.items[0].repository.full_name, "a/b");
        assert!(!page.items[0].repository.fork);

        let source: SourceRepo = page.items[0].repository.clone().into();
        assert_eq!(source.html_url, "https://github.com/a/b");
    }
}

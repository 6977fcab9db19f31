//! Repository and code search.

use std::collections::HashSet;

use serde::de::DeserializeOwned;

use super::client::GitHubClient;
use super::error::GitHubError;
use super::types::{CodeHit, GhRepo, PER_PAGE, SEARCH_RESULT_CAP, SearchPage, SearchParams};
use crate::batch::{BatchProgress, emit};

/// `user:{owner} language:{lang}`.
#[must_use]
pub fn owner_language_query(owner: &str, lang: &str) -> String {
    format!("user:{} language:{}", owner.trim(), lang.trim())
}

/// `language:{lang} fork:false`.
#[must_use]
pub fn language_query(lang: &str) -> String {
    format!("language:{} fork:false", lang.trim())
}

/// Keep the first hit for each repository.
#[must_use]
pub fn dedupe_repos(repos: Vec<GhRepo>) -> Vec<GhRepo> {
    let mut seen = HashSet::new();
    repos
        .into_iter()
        .filter(|r| seen.insert(r.full_name.to_ascii_lowercase()))
        .collect()
}

/// Whether another page could add results.
fn has_more(fetched: usize, page_len: usize, total_count: u64) -> bool {
    let reachable = (total_count as usize).min(SEARCH_RESULT_CAP);
    page_len >= PER_PAGE as usize && fetched < reachable
}

impl GitHubClient {
    async fn search<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &str,
        sort: Option<&str>,
    ) -> Result<Vec<T>, GitHubError> {
        emit(
            self.progress(),
            BatchProgress::FetchingRepos {
                namespace: query.to_string(),
            },
        );

        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let params = SearchParams {
                q: query,
                per_page: PER_PAGE,
                page,
                sort,
                order: sort.map(|_| "desc"),
            };
            let result: SearchPage<T> = self.get(endpoint, Some(&params), query).await?;
            let count = result.items.len();
            if result.incomplete_results {
                tracing::debug!(query, page, "search results are incomplete");
            }
            all.extend(result.items);
            emit(
                self.progress(),
                BatchProgress::FetchedPage {
                    namespace: query.to_string(),
                    page,
                    count,
                    total_so_far: all.len(),
                },
            );
            if !has_more(all.len(), count, result.total_count) {
                break;
            }
            page += 1;
        }

        all.truncate(SEARCH_RESULT_CAP);
        emit(
            self.progress(),
            BatchProgress::FetchComplete {
                namespace: query.to_string(),
                total: all.len(),
            },
        );
        Ok(all)
    }

    /// Repositories matching a search query, best match first.
    pub async fn search_repositories(&self, query: &str) -> Result<Vec<GhRepo>, GitHubError> {
        self.search("/search/repositories", query, None).await
    }

    /// An owner's repositories in `lang`.
    pub async fn list_owner_repos_by_language(
        &self,
        owner: &str,
        lang: &str,
    ) -> Result<Vec<GhRepo>, GitHubError> {
        self.search("/search/repositories", &owner_language_query(owner, lang), None)
            .await
    }

    /// The most starred non-fork repositories in `lang`.
    pub async fn list_repos_by_language(&self, lang: &str) -> Result<Vec<GhRepo>, GitHubError> {
        self.search("/search/repositories", &language_query(lang), Some("stars"))
            .await
    }

    /// Repositories containing code that matches `query`.
    pub async fn search_code(&self, query: &str) -> Result<Vec<GhRepo>, GitHubError> {
        let hits: Vec<CodeHit> = self.search("/search/code", query, None).await?;
        Ok(dedupe_repos(hits.into_iter().map(|h| h.repository).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str) -> GhRepo {
        GhRepo {
            full_name: name.to_string(),
            html_url: format!("https://github.com/{name}"),
            fork: false,
            language: None,
            stargazers_count: 0,
        }
    }

    #[test]
    fn queries() {
        assert_eq!(owner_language_query(" kubernetes ", "Go"), "user:kubernetes language:Go");
        assert_eq!(language_query("rust"), "language:rust fork:false");
    }

    #[test]
    fn code_hits_collapse_to_repositories() {
        let repos = dedupe_repos(vec![repo("a/b"), repo("c/d"), repo("A/B"), repo("a/b")]);
        let names: Vec<&str> = repos.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["a/b", "c/d"]);
    }

    #[test]
    fn paging_stops_at_short_page_total_or_cap() {
        assert!(has_more(100, 100, 5000));
        assert!(!has_more(40, 40, 5000));
        assert!(!has_more(200, 100, 200));
        assert!(!has_more(1000, 100, 50_000));
        assert!(has_more(900, 100, 50_000));
    }
}

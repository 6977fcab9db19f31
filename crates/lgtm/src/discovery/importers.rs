use std::collections::HashSet;

use scraper::{Html, Selector};

use crate::http::{HttpRequest, HttpTransport};

/// Where the "imported by" listing lives.
pub const PKG_GO_DEV: &str = "https://pkg.go.dev";

/// Hosts whose importers can be followed.
const SUPPORTED_HOSTS: [&str; 3] = ["github.com/", "gitlab.org/", "bitbucket.org/"];

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("invalid package path: {0:?}")]
    InvalidPackage(String),
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid selector: {0}")]
    Selector(String),
}

/// Strip the scheme and surrounding slashes from a Go package path.
pub fn normalize_package_path(raw: &str) -> Result<String, DiscoveryError> {
    let trimmed = raw.trim();
    let path = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .trim_matches('/');
    if path.is_empty() {
        return Err(DiscoveryError::InvalidPackage(raw.to_string()));
    }
    Ok(path.to_string())
}

#[must_use]
pub fn importers_url(package: &str) -> String {
    format!("{PKG_GO_DEV}/{package}?tab=importedby")
}

/// Reduce an importer path to the root of its repository.
///
/// `github.com/a/b/pkg/x` becomes `https://github.com/a/b`; paths on other
/// hosts or without a repository segment give `None`.
#[must_use]
pub fn repository_root(path: &str) -> Option<String> {
    let path = path.trim().trim_start_matches('/');
    if !SUPPORTED_HOSTS.iter().any(|host| path.starts_with(host)) {
        return None;
    }
    let parts: Vec<&str> = path.splitn(4, '/').collect();
    if parts.len() < 3 || parts[1].is_empty() || parts[2].is_empty() {
        return None;
    }
    Some(format!("https://{}/{}/{}", parts[0], parts[1], parts[2]))
}

/// Repository roots linked from an "imported by" page, in page order.
pub fn parse_importers(html: &str) -> Result<Vec<String>, DiscoveryError> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse(".u-breakWord").map_err(|e| DiscoveryError::Selector(e.to_string()))?;

    let mut seen = HashSet::new();
    let roots = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(repository_root)
        .filter(|root| seen.insert(root.clone()))
        .collect();
    Ok(roots)
}

/// Repositories importing the Go package `package`, per pkg.go.dev.
///
/// `limit` of zero keeps every result.
pub async fn importers_of<T: HttpTransport + ?Sized>(
    transport: &T,
    package: &str,
    limit: usize,
) -> Result<Vec<String>, DiscoveryError> {
    let package = normalize_package_path(package)?;
    let url = importers_url(&package);

    tracing::debug!(package = %package, "fetching importers");
    let response = transport
        .send(HttpRequest::get(&url, &[]))
        .await
        .map_err(|e| DiscoveryError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;
    if !response.is_success() {
        return Err(DiscoveryError::Status {
            url,
            status: response.status,
        });
    }

    let mut roots = parse_importers(&response.text())?;
    if limit > 0 {
        roots.truncate(limit);
    }
    tracing::info!(package = %package, importers = roots.len(), "found importers");
    Ok(roots)
}

//! Configuration file support for the lgtm CLI.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `LGTM_`, `__` between nested keys,
//!    e.g. `LGTM_SESSION__NONCE`, `LGTM_BATCH__CONCURRENCY`)
//! 3. Credentials file given with `--conf` or `LGTM_CLI_CONFIG`
//! 4. Config file (./lgtm.toml, then ~/.config/lgtm/config.toml)
//! 5. Built-in defaults
//!
//! The credentials file keeps the JSON layout used by earlier releases:
//! ```json
//! {
//!   "api_version": "...",
//!   "session": { "nonce": "...", "short_session": "...", "long_session": "..." },
//!   "github": { "token": "ghp_..." }
//! }
//! ```
//!
//! The same keys can live in the TOML config file:
//! ```toml
//! api_version = "..."
//!
//! [session]
//! nonce = "..."
//! short_session = "..."
//! long_session = "..."
//!
//! [github]
//! token = "ghp_..."
//!
//! [batch]
//! concurrency = 6
//! wait = "30s"
//! requests_per_second = 1
//! burst = 1
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use lgtm::batch::DEFAULT_CONCURRENCY;
use lgtm::remote::{Credentials, rate_limits};
use serde::Deserialize;

use crate::duration::deserialize_duration;

/// Environment variable naming the credentials file.
pub(crate) const CONFIG_ENV: &str = "LGTM_CLI_CONFIG";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Internal API version the session was issued for.
    pub api_version: Option<String>,
    /// Browser session cookies and nonce.
    pub session: SessionConfig,
    /// GitHub configuration.
    pub github: GitHubConfig,
    /// Batch defaults.
    pub batch: BatchConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub nonce: Option<String>,
    pub short_session: Option<String>,
    pub long_session: Option<String>,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token, used to expand owners and run searches.
    /// Can also be set via LGTM_GITHUB__TOKEN.
    pub token: Option<String>,
}

/// Default batch options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum concurrent remote calls.
    pub concurrency: usize,
    /// Pause after following a repository the service had never seen.
    #[serde(deserialize_with = "deserialize_duration")]
    pub wait: Duration,
    /// Steady request rate against lgtm.com.
    pub requests_per_second: u32,
    pub burst: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            wait: Duration::ZERO,
            requests_per_second: rate_limits::LGTM_DEFAULT_RPS,
            burst: rate_limits::LGTM_DEFAULT_BURST,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// `credentials` is the `--conf` path; when absent, `LGTM_CLI_CONFIG` is
    /// consulted. A named credentials file must exist.
    pub fn load(credentials: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!(path = %path.display(), "loading config");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let local_config = PathBuf::from("lgtm.toml");
        if local_config.exists() {
            tracing::debug!("loading config from ./lgtm.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let credentials = credentials
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        if let Some(path) = credentials {
            tracing::debug!(path = %path.display(), "loading credentials");
            builder = builder.add_source(File::from(path).format(FileFormat::Json).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("LGTM")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    /// Session credentials for the remote client. Validation happens when
    /// the client is built.
    pub fn credentials(&self) -> Credentials {
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        Credentials {
            api_version: field(&self.api_version),
            nonce: field(&self.session.nonce),
            short_session: field(&self.session.short_session),
            long_session: field(&self.session.long_session),
        }
    }

    /// Get the GitHub token.
    #[cfg(feature = "github")]
    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone().filter(|t| !t.trim().is_empty())
    }

    /// Get the default config file path (~/.config/lgtm/config.toml on Linux).
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lgtm").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

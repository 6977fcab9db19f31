use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::{Term, style};
use lgtm::batch::{BatchOptions, BatchReport, EngineError, ProgressCallback};
use lgtm::http::reqwest_transport::ReqwestTransport;
use lgtm::remote::{ApiRateLimiter, LgtmClient, RateLimitedClient};
use lgtm::target::{RepoSource, parse_target_list, resolve_candidates};

use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::{GlobalOptions, TargetArgs};

pub(crate) type CliResult = Result<(), Box<dyn Error>>;

/// The lgtm.com client every command talks through.
pub(crate) type Client = RateLimitedClient<LgtmClient<ReqwestTransport>>;

/// Everything a command needs from configuration and global flags.
pub(crate) struct Context {
    pub(crate) client: Client,
    options: BatchOptions,
    #[cfg(feature = "github")]
    github_token: Option<String>,
}

impl Context {
    pub(crate) fn new(config: &Config, global: &GlobalOptions) -> Result<Self, Box<dyn Error>> {
        let limiter =
            ApiRateLimiter::with_burst(config.batch.requests_per_second, config.batch.burst);
        let client = RateLimitedClient::with_limiter(LgtmClient::new(config.credentials())?, limiter);

        Ok(Self {
            client,
            options: batch_options(config, global),
            #[cfg(feature = "github")]
            github_token: config.github_token(),
        })
    }

    /// Batch options for one command, with its own exclude patterns.
    pub(crate) fn options(&self, exclude: Vec<String>) -> BatchOptions {
        BatchOptions {
            exclude,
            ..self.options.clone()
        }
    }

    /// Pause after each successful request in sequential commands.
    pub(crate) fn wait(&self) -> std::time::Duration {
        self.options.follow_wait
    }

    pub(crate) fn assume_yes(&self) -> bool {
        self.options.assume_yes
    }

    #[cfg(feature = "github")]
    pub(crate) fn github(
        &self,
        on_progress: &Arc<ProgressCallback>,
    ) -> Result<lgtm::github::GitHubClient, lgtm::github::GitHubError> {
        if self.github_token.is_none() {
            tracing::debug!("no GitHub token configured, using anonymous requests");
        }
        Ok(lgtm::github::GitHubClient::new(self.github_token.as_deref())?
            .with_progress(Some(Arc::clone(on_progress))))
    }
}

/// Flags win over the config file; the config file wins over defaults.
pub(crate) fn batch_options(config: &Config, global: &GlobalOptions) -> BatchOptions {
    BatchOptions {
        concurrency: global.concurrency.unwrap_or(config.batch.concurrency).max(1),
        follow_wait: global.wait.unwrap_or(config.batch.wait),
        ignore_cache_errors: global.ignore_followed_errors,
        no_cache: global.nocache,
        exclude: Vec::new(),
        assume_yes: global.yes,
    }
}

/// Inline targets followed by the lines of every target file.
pub(crate) fn collect_targets(args: &TargetArgs) -> Result<Vec<String>, Box<dyn Error>> {
    let mut targets = args.targets.clone();
    for path in &args.files {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        let entries = parse_target_list(&contents);
        tracing::debug!(path = %path.display(), entries = entries.len(), "read target file");
        targets.extend(entries);
    }
    Ok(targets)
}

/// Canonical repository URLs for `raw`, expanding owners through GitHub.
pub(crate) async fn resolve_targets(
    ctx: &Context,
    raw: &[String],
    language: Option<&str>,
    on_progress: &Arc<ProgressCallback>,
) -> Result<Vec<String>, Box<dyn Error>> {
    let source = repo_source(ctx, on_progress)?;
    let urls = resolve_candidates(raw, source.as_deref(), language, Some(on_progress.as_ref())).await?;
    Ok(urls)
}

#[cfg(feature = "github")]
fn repo_source(
    ctx: &Context,
    on_progress: &Arc<ProgressCallback>,
) -> Result<Option<Box<dyn RepoSource>>, Box<dyn Error>> {
    Ok(Some(Box::new(ctx.github(on_progress)?)))
}

#[cfg(not(feature = "github"))]
fn repo_source(
    _ctx: &Context,
    _on_progress: &Arc<ProgressCallback>,
) -> Result<Option<Box<dyn RepoSource>>, Box<dyn Error>> {
    Ok(None)
}

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` declines,
/// and so does a session without a terminal.
pub(crate) fn confirm(question: &str) -> bool {
    let term = Term::stderr();
    if !term.is_term() {
        tracing::warn!(question, "no terminal to confirm on, pass --yes to proceed");
        return false;
    }
    if term.write_str(&format!("{question} [y/N] ")).is_err() {
        return false;
    }
    match term.read_line() {
        Ok(answer) => is_yes(&answer),
        Err(_) => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// `confirm` unless `--yes` was given.
pub(crate) fn confirm_unless(assume_yes: bool, question: &str) -> bool {
    assume_yes || confirm(question)
}

/// Write the compiled follow list to `dir` and keep the file.
pub(crate) fn write_follow_list(dir: &Path, urls: &[String]) -> std::io::Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let mut file = tempfile::Builder::new()
        .prefix(&format!("lgtm-cli-follow-{stamp}."))
        .suffix(".txt")
        .tempfile_in(dir)?;
    for url in urls {
        writeln!(file, "{url}")?;
    }
    file.flush()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

/// Print each failed item below the summary.
pub(crate) fn print_failures(reporter: &ProgressReporter, report: &BatchReport) {
    for failure in &report.failures {
        reporter.println(&format!(
            "  {} {}: {}",
            style("✗").red(),
            failure.item,
            failure.error
        ));
    }
}

/// Adds a hint to snapshot failures that can be worked around.
pub(crate) fn engine_error(e: EngineError) -> Box<dyn Error> {
    if e.is_cache_error() {
        eprintln!(
            "{} Rerun with --ignore-followed-errors to continue without the followed list.",
            style("hint:").yellow()
        );
    }
    Box::new(e)
}

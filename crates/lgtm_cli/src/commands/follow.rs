//! `follow` and the discovery-driven follow commands.
//!
//! Every variant compiles a list of canonical repository URLs, writes it
//! to a temp file for reference, then hands it to the batch engine, which
//! only follows what the account doesn't follow yet.

use std::sync::Arc;

use lgtm::batch::{self, ProgressCallback};
#[cfg(feature = "github")]
use lgtm::github::GhRepo;
#[cfg(feature = "github")]
use lgtm::target::{SourceRepo, drop_forks};

use super::shared::{self, CliResult, Context};
use crate::TargetArgs;
use crate::progress::ProgressReporter;

pub(crate) async fn handle_follow(ctx: &Context, targets: TargetArgs, lang: Option<&str>) -> CliResult {
    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let raw = shared::collect_targets(&targets)?;
    if raw.is_empty() {
        return Err("no repositories given; pass them as arguments or with -f".into());
    }
    let candidates = shared::resolve_targets(ctx, &raw, lang, &callback).await?;
    follow_candidates(ctx, &reporter, callback, candidates, targets.exclude).await
}

#[cfg(feature = "github")]
pub(crate) async fn handle_follow_by_lang(ctx: &Context, lang: &str, exclude: Vec<String>) -> CliResult {
    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let repos = ctx.github(&callback)?.list_repos_by_language(lang).await?;
    let candidates = without_forks(repos, &callback);
    follow_candidates(ctx, &reporter, callback, candidates, exclude).await
}

#[cfg(feature = "github")]
pub(crate) async fn handle_follow_by_search_meta(
    ctx: &Context,
    query: &str,
    exclude: Vec<String>,
) -> CliResult {
    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let repos = ctx.github(&callback)?.search_repositories(query).await?;
    let candidates = without_forks(repos, &callback);
    follow_candidates(ctx, &reporter, callback, candidates, exclude).await
}

#[cfg(feature = "github")]
pub(crate) async fn handle_follow_by_code_search(
    ctx: &Context,
    query: &str,
    exclude: Vec<String>,
) -> CliResult {
    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let repos = ctx.github(&callback)?.search_code(query).await?;
    let candidates = without_forks(repos, &callback);
    follow_candidates(ctx, &reporter, callback, candidates, exclude).await
}

#[cfg(feature = "discovery")]
pub(crate) async fn handle_follow_by_importers(
    ctx: &Context,
    package: &str,
    limit: usize,
    exclude: Vec<String>,
) -> CliResult {
    use lgtm::http::reqwest_transport::ReqwestTransport;
    use lgtm::remote::REQUEST_TIMEOUT;

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?;
    let candidates = lgtm::discovery::importers_of(&transport, package, limit).await?;
    follow_candidates(ctx, &reporter, callback, candidates, exclude).await
}

#[cfg(feature = "github")]
fn without_forks(repos: Vec<GhRepo>, on_progress: &Arc<ProgressCallback>) -> Vec<String> {
    let repos = repos.into_iter().map(SourceRepo::from).collect();
    drop_forks(repos, Some(on_progress.as_ref()))
}

async fn follow_candidates(
    ctx: &Context,
    reporter: &ProgressReporter,
    callback: Arc<ProgressCallback>,
    candidates: Vec<String>,
    exclude: Vec<String>,
) -> CliResult {
    if candidates.is_empty() {
        reporter.finish();
        println!("No repositories to follow");
        return Ok(());
    }

    let path = shared::write_follow_list(&std::env::temp_dir(), &candidates)?;
    reporter.println(&format!(
        "Compiled {} repositories into {}",
        candidates.len(),
        path.display()
    ));

    let options = ctx.options(exclude);
    let report = batch::follow(&ctx.client, &candidates, &options, Some(callback))
        .await
        .map_err(shared::engine_error)?;
    reporter.finish();

    shared::print_failures(reporter, &report.batch);
    println!(
        "Followed {} projects ({} new)",
        report.batch.succeeded_count(),
        report.batch.newly_created
    );
    Ok(())
}

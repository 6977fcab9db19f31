use std::path::PathBuf;
use std::sync::Arc;

use lgtm::matcher::GlobList;
use lgtm::remote::{FollowedSnapshot, ProjectAdmin, QueryRequest, RemoteClient};

use super::shared::{self, CliResult, Context};
use crate::TargetArgs;
use crate::progress::ProgressReporter;

pub(crate) struct QueryArgs {
    pub(crate) lang: String,
    pub(crate) query: PathBuf,
    pub(crate) list_keys: Vec<String>,
    pub(crate) all: bool,
    pub(crate) targets: TargetArgs,
}

/// Why a requested project is left out of a query run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Excluded,
    Proto,
    NotFollowed,
    MissingLanguage,
}

impl Skip {
    fn reason(self) -> &'static str {
        match self {
            Skip::Excluded => "excluded",
            Skip::Proto => "not built yet",
            Skip::NotFollowed => "not followed",
            Skip::MissingLanguage => "not built for this language",
        }
    }
}

/// Project keys to query, plus the requested entries that were skipped.
fn select_projects(
    snapshot: &FollowedSnapshot,
    urls: &[String],
    all: bool,
    lang: &str,
    exclude: &GlobList,
) -> (Vec<String>, Vec<(String, Skip)>) {
    let mut keys = Vec::new();
    let mut skipped = Vec::new();

    let mut consider = |name: &str, project: Option<&lgtm::remote::Project>| match project {
        Some(p) if exclude.is_match(&p.display_name) => {
            skipped.push((p.display_name.clone(), Skip::Excluded));
        }
        Some(p) if !p.supports_language(lang) => {
            skipped.push((p.display_name.clone(), Skip::MissingLanguage));
        }
        Some(p) => {
            if !keys.contains(&p.key) {
                keys.push(p.key.clone());
            }
        }
        None if snapshot.is_proto(name) => skipped.push((name.to_string(), Skip::Proto)),
        None => skipped.push((name.to_string(), Skip::NotFollowed)),
    };

    if all {
        for project in &snapshot.projects {
            consider(&project.display_name, Some(project));
        }
    }
    for url in urls {
        consider(url, snapshot.get_project(url));
    }
    (keys, skipped)
}

pub(crate) async fn handle_query(ctx: &Context, args: QueryArgs) -> CliResult {
    if args.query.extension().and_then(|e| e.to_str()) != Some("ql") {
        return Err(format!("{} is not a .ql file", args.query.display()).into());
    }
    let query = std::fs::read_to_string(&args.query)
        .map_err(|e| format!("cannot read {}: {e}", args.query.display()))?;
    let exclude = GlobList::new(&args.targets.exclude)?;

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let raw = shared::collect_targets(&args.targets)?;
    let urls = if raw.is_empty() {
        Vec::new()
    } else {
        shared::resolve_targets(ctx, &raw, None, &callback).await?
    };

    let snapshot = ctx.client.list_followed().await?;
    reporter.finish();

    let (project_keys, skipped) = select_projects(&snapshot, &urls, args.all, &args.lang, &exclude);
    for (name, skip) in &skipped {
        tracing::warn!(project = %name, reason = skip.reason(), "skipping project");
    }
    if project_keys.is_empty() && args.list_keys.is_empty() {
        return Err("no projects or lists to run the query on".into());
    }

    let question = format!(
        "Run the query on {} projects and {} lists?",
        project_keys.len(),
        args.list_keys.len()
    );
    if !shared::confirm_unless(ctx.assume_yes(), &question) {
        println!("Query not submitted");
        return Ok(());
    }

    let request = QueryRequest {
        lang: args.lang,
        project_keys,
        selection_keys: args.list_keys,
        query,
    };
    let run = ctx.client.run_query(&request).await?;
    tracing::info!(key = %run.key, projects = run.project_keys.len(), "query submitted");
    println!("Results: {}", run.result_link());
    Ok(())
}

//! Followed projects and project lists.

use std::sync::Arc;

use lgtm::batch::{self, SELECTION_CHUNK_SIZE};
use lgtm::remote::{FollowedSnapshot, ProjectAdmin, RemoteClient, SelectionSummary};

use super::shared::{self, CliResult, Context};
use crate::TargetArgs;
use crate::progress::ProgressReporter;

pub(crate) async fn handle_followed(ctx: &Context) -> CliResult {
    let snapshot = ctx.client.list_followed().await?;
    for line in followed_lines(&snapshot) {
        println!("{line}");
    }
    Ok(())
}

/// Proto-project clone URLs first, then project URLs.
fn followed_lines(snapshot: &FollowedSnapshot) -> Vec<&str> {
    snapshot
        .proto_projects
        .iter()
        .map(|p| p.clone_url.as_str())
        .chain(snapshot.projects.iter().map(|p| p.external_url.url.as_str()))
        .collect()
}

pub(crate) async fn handle_lists(ctx: &Context) -> CliResult {
    let selections = ctx.client.list_selections().await?;
    for line in selection_lines(selections) {
        println!("{line}");
    }
    Ok(())
}

fn selection_lines(mut selections: Vec<SelectionSummary>) -> Vec<String> {
    selections.sort_by(|a, b| a.name.cmp(&b.name));
    selections
        .into_iter()
        .map(|s| format!("{} | {}", s.name, s.key))
        .collect()
}

pub(crate) async fn handle_create_list(ctx: &Context, name: &str) -> CliResult {
    ctx.client.create_selection(name).await?;
    tracing::info!(list = %name, "created project list");
    println!("Created list {name}");
    Ok(())
}

pub(crate) async fn handle_delete_list(ctx: &Context, name: &str) -> CliResult {
    ctx.client.delete_selection(name).await?;
    tracing::info!(list = %name, "deleted project list");
    println!("Deleted list {name}");
    Ok(())
}

pub(crate) async fn handle_list(ctx: &Context, name: &str) -> CliResult {
    let contents = ctx.client.get_selection(name).await?;
    for chunk in contents.project_keys.chunks(SELECTION_CHUNK_SIZE) {
        let projects = ctx.client.get_projects_by_key(chunk).await?;
        for key in chunk {
            match projects.get(key) {
                Some(project) => println!("{}", project.external_url.url),
                None => tracing::warn!(key = %key, "project in list could not be fetched"),
            }
        }
    }
    Ok(())
}

pub(crate) async fn handle_add_to_list(ctx: &Context, name: &str, targets: TargetArgs) -> CliResult {
    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let raw = shared::collect_targets(&targets)?;
    if raw.is_empty() {
        return Err("no repositories given; pass them as arguments or with -f".into());
    }
    let candidates = shared::resolve_targets(ctx, &raw, None, &callback).await?;

    let options = ctx.options(targets.exclude);
    let report = batch::add_to_selection(&ctx.client, name, &candidates, &options, Some(callback))
        .await
        .map_err(shared::engine_error)?;
    reporter.finish();

    shared::print_failures(&reporter, &report.batch);
    if report.batch.failures.is_empty() {
        println!(
            "Added {} projects to {name} ({} already there)",
            report.plan.keys.len(),
            report.plan.already_present
        );
    } else {
        println!(
            "Added projects to {name} in {} of {} requests",
            report.batch.succeeded_count(),
            report.batch.total
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use lgtm::remote::{ExternalUrl, Project, ProtoProject};

    use super::*;

    #[test]
    fn followed_lists_protos_before_projects() {
        let snapshot = FollowedSnapshot {
            projects: vec![Project {
                key: "1".to_string(),
                external_url: ExternalUrl {
                    url: "https://github.com/a/built".to_string(),
                    ..ExternalUrl::default()
                },
                ..Project::default()
            }],
            proto_projects: vec![ProtoProject {
                key: "p".to_string(),
                clone_url: "https://github.com/a/pending.git".to_string(),
                ..ProtoProject::default()
            }],
        };
        assert_eq!(
            followed_lines(&snapshot),
            vec!["https://github.com/a/pending.git", "https://github.com/a/built"]
        );
    }

    #[test]
    fn lists_sorted_by_name() {
        let summary = |name: &str, key: &str| SelectionSummary {
            key: key.to_string(),
            name: name.to_string(),
        };
        let lines = selection_lines(vec![summary("web", "k2"), summary("infra", "k1")]);
        assert_eq!(lines, vec!["infra | k1", "web | k2"]);
    }
}

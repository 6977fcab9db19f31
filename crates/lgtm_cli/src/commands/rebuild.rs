//! Sequential build requests for followed projects.
//!
//! Unlike the batch commands these run one request at a time, pausing for
//! `--wait` after each success, and stop early on Ctrl+C.

use console::style;
use lgtm::matcher::GlobList;
use lgtm::remote::{Project, ProjectAdmin, ProtoProject, RemoteClient, short_error_message};

use super::shared::{self, CliResult, Context};
use crate::shutdown::is_shutdown_requested;

/// What to do for one followed project on `rebuild --lang`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildRequest {
    /// The project has never been built for the language.
    NewAttempt,
    /// The project has the language; rebuild it anyway.
    TestBuild,
}

fn build_request(project: &Project, lang: &str, all: bool) -> Option<BuildRequest> {
    if !project.supports_language(lang) {
        Some(BuildRequest::NewAttempt)
    } else if all {
        Some(BuildRequest::TestBuild)
    } else {
        None
    }
}

fn proto_question(proto: &ProtoProject) -> String {
    if proto.next_build_started {
        format!(
            "A build of {} has already been started. Request another?",
            proto.display_name
        )
    } else {
        format!("Rebuild {}?", proto.display_name)
    }
}

fn report_failure(name: &str, e: &impl std::error::Error) {
    tracing::warn!(project = %name, error = %short_error_message(e), "build request failed");
    eprintln!("{} {name}: {}", style("✗").red(), short_error_message(e));
}

pub(crate) async fn handle_rebuild_proto(ctx: &Context, exclude: &[String], force: bool) -> CliResult {
    let exclude = GlobList::new(exclude)?;
    let snapshot = ctx.client.list_followed().await?;

    let mut requested = 0usize;
    for proto in &snapshot.proto_projects {
        if is_shutdown_requested() {
            break;
        }
        if let Some(pattern) = exclude.first_match(&proto.display_name) {
            tracing::info!(project = %proto.display_name, pattern, "excluded");
            continue;
        }
        if !force && !shared::confirm_unless(ctx.assume_yes(), &proto_question(proto)) {
            continue;
        }

        match ctx.client.rebuild_proto(&proto.key).await {
            Ok(()) => {
                requested += 1;
                println!("{} Requested a build of {}", style("✓").green(), proto.display_name);
                tokio::time::sleep(ctx.wait()).await;
            }
            Err(e) => report_failure(&proto.display_name, &e),
        }
    }

    println!(
        "Requested builds for {requested} of {} proto-projects",
        snapshot.proto_projects.len()
    );
    Ok(())
}

pub(crate) async fn handle_rebuild(
    ctx: &Context,
    lang: &str,
    exclude: &[String],
    all: bool,
    force: bool,
) -> CliResult {
    let exclude = GlobList::new(exclude)?;
    let snapshot = ctx.client.list_followed().await?;
    let langs = [lang.to_string()];

    let mut requested = 0usize;
    for project in &snapshot.projects {
        if is_shutdown_requested() {
            break;
        }
        if let Some(pattern) = exclude.first_match(&project.display_name) {
            tracing::info!(project = %project.display_name, pattern, "excluded");
            continue;
        }

        let result = match build_request(project, lang, all) {
            None => continue,
            Some(BuildRequest::NewAttempt) => ctx.client.new_build_attempt(&project.key, lang).await,
            Some(BuildRequest::TestBuild) => {
                let question = format!("Rebuild {} for {lang}?", project.display_name);
                if !force && !shared::confirm_unless(ctx.assume_yes(), &question) {
                    continue;
                }
                ctx.client.request_test_build(&project.slug, &langs).await
            }
        };

        match result {
            Ok(()) => {
                requested += 1;
                println!("{} Requested a {lang} build of {}", style("✓").green(), project.display_name);
                tokio::time::sleep(ctx.wait()).await;
            }
            Err(e) => report_failure(&project.display_name, &e),
        }
    }

    println!("Requested {requested} {lang} builds");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(languages: &[&str]) -> Project {
        Project {
            display_name: "acme/api".to_string(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            ..Project::default()
        }
    }

    #[test]
    fn missing_language_gets_a_new_attempt() {
        assert_eq!(build_request(&project(&["go"]), "python", false), Some(BuildRequest::NewAttempt));
        assert_eq!(build_request(&project(&[]), "python", true), Some(BuildRequest::NewAttempt));
    }

    #[test]
    fn built_language_needs_all() {
        assert_eq!(build_request(&project(&["go"]), "go", false), None);
        assert_eq!(build_request(&project(&["go"]), "go", true), Some(BuildRequest::TestBuild));
    }

    #[test]
    fn queued_protos_ask_differently() {
        let mut proto = ProtoProject {
            display_name: "acme/new".to_string(),
            ..ProtoProject::default()
        };
        assert_eq!(proto_question(&proto), "Rebuild acme/new?");
        proto.next_build_started = true;
        assert!(proto_question(&proto).contains("already been started"));
    }
}

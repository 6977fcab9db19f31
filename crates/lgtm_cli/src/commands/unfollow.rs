use std::sync::Arc;

use lgtm::batch::{self, Outcome};

use super::shared::{self, CliResult, Context};
use crate::TargetArgs;
use crate::progress::ProgressReporter;

pub(crate) async fn handle_unfollow(ctx: &Context, targets: TargetArgs) -> CliResult {
    let inputs = shared::collect_targets(&targets)?;
    if inputs.is_empty() {
        return Err("nothing to unfollow; pass patterns, owners or URLs".into());
    }

    let reporter = Arc::new(ProgressReporter::new());
    let options = ctx.options(targets.exclude);
    let outcome = batch::unfollow(
        &ctx.client,
        &inputs,
        &options,
        &shared::confirm,
        Some(reporter.as_callback()),
    )
    .await
    .map_err(shared::engine_error)?;
    reporter.finish();

    print_outcome(&reporter, &outcome);
    Ok(())
}

pub(crate) async fn handle_unfollow_all(ctx: &Context) -> CliResult {
    let reporter = Arc::new(ProgressReporter::new());
    let options = ctx.options(Vec::new());
    let outcome = batch::unfollow_all(
        &ctx.client,
        &options,
        &shared::confirm,
        Some(reporter.as_callback()),
    )
    .await
    .map_err(shared::engine_error)?;
    reporter.finish();

    print_outcome(&reporter, &outcome);
    Ok(())
}

fn print_outcome(reporter: &ProgressReporter, outcome: &Outcome) {
    match outcome {
        Outcome::Declined => println!("Nothing was unfollowed"),
        Outcome::Completed(report) => {
            shared::print_failures(reporter, report);
            println!("Unfollowed {} projects", report.succeeded_count());
        }
    }
}

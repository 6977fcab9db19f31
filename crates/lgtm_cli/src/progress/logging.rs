use lgtm::batch::BatchProgress;

/// Logging reporter using tracing for structured output.
pub(crate) struct LoggingReporter;

impl LoggingReporter {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn handle(&self, event: BatchProgress) {
        match event {
            BatchProgress::FetchingFollowed => {
                tracing::info!("Getting list of followed projects");
            }

            BatchProgress::FetchedFollowed {
                projects,
                proto_projects,
                elapsed,
            } => {
                tracing::info!(
                    projects,
                    proto_projects,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Fetched followed projects"
                );
            }

            BatchProgress::CacheUnavailable { reason } => {
                tracing::info!(reason = %reason, "Resolving projects one by one");
            }

            BatchProgress::FetchingRepos { namespace } => {
                tracing::info!(namespace = %namespace, "Fetching repositories");
            }

            BatchProgress::FetchedPage {
                namespace,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(namespace = %namespace, page, count, total_so_far, "Fetched page");
            }

            BatchProgress::FetchComplete { namespace, total } => {
                tracing::info!(namespace = %namespace, total, "Fetch complete");
            }

            BatchProgress::SkippedFork { full_name } => {
                tracing::warn!(repo = %full_name, "Skipping fork");
            }

            BatchProgress::RateLimitBackoff {
                target,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(target_name = %target, retry_after_ms, attempt, "Rate limited, backing off");
            }

            BatchProgress::Excluded { item, pattern } => {
                tracing::warn!(item = %item, pattern = %pattern, "Excluded");
            }

            BatchProgress::Unresolved { item, reason } => {
                tracing::warn!(item = %item, reason = %reason, "Skipping");
            }

            BatchProgress::Planned {
                action,
                total,
                skipped,
            } => {
                tracing::info!(action = action.verb(), total, skipped, "Planned");
            }

            BatchProgress::Dispatching {
                action,
                total,
                concurrency,
            } => {
                tracing::info!(action = action.verb(), total, concurrency, "Dispatching");
            }

            BatchProgress::ItemStarted {
                action,
                item,
                position,
                total,
                percent,
                eta,
            } => {
                tracing::info!(
                    action = action.verb(),
                    item = %item,
                    position,
                    total,
                    percent = %percent,
                    eta = %lgtm::batch::format_eta(eta),
                    "Started"
                );
            }

            BatchProgress::ItemSucceeded {
                action,
                item,
                created,
            } => {
                if created {
                    tracing::info!(action = action.past(), item = %item, "Done (new)");
                } else {
                    tracing::debug!(action = action.past(), item = %item, "Done");
                }
            }

            BatchProgress::ItemFailed {
                action,
                item,
                error,
            } => {
                tracing::error!(action = action.verb(), item = %item, error = %error, "Failed");
            }

            BatchProgress::CoolingDown { wait } => {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Cooling down");
            }

            BatchProgress::BatchComplete {
                action,
                total,
                succeeded,
                created,
                failed,
            } => {
                tracing::info!(action = action.past(), total, succeeded, created, failed, "Batch complete");
            }

            BatchProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}

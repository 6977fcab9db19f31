use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use lgtm::batch::{BatchProgress, format_eta};

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    /// Spinner shown while the followed list is fetched.
    followed_bar: Option<ProgressBar>,
    /// Fetch spinners by owner or search query.
    fetch_bars: HashMap<String, ProgressBar>,
    /// Bar for the running batch.
    batch_bar: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
pub(crate) struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub(crate) fn new() -> Self {
        Self::with_multi(MultiProgress::new())
    }

    /// A reporter that draws nothing.
    #[cfg(test)]
    pub(crate) fn hidden() -> Self {
        Self::with_multi(MultiProgress::with_draw_target(
            indicatif::ProgressDrawTarget::hidden(),
        ))
    }

    fn with_multi(multi: MultiProgress) -> Self {
        Self {
            multi,
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub(crate) fn println(&self, line: &str) {
        self.multi.println(line).ok();
    }

    fn spinner(&self, prefix: &str, message: String) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_prefix(format!("{prefix:12}"));
        pb.set_message(message);
        pb
    }

    pub(crate) fn handle(&self, event: BatchProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            BatchProgress::FetchingFollowed => {
                let pb = self.spinner("Followed", "Getting list of followed projects...".to_string());
                state.followed_bar = Some(pb);
            }

            BatchProgress::FetchedFollowed {
                projects,
                proto_projects,
                elapsed,
            } => {
                let msg = format!(
                    "✓ {projects} projects (and {proto_projects} proto) followed; took {:.1}s",
                    elapsed.as_secs_f64()
                );
                match state.followed_bar.take() {
                    Some(pb) => pb.finish_with_message(msg),
                    None => self.println(&msg),
                }
            }

            BatchProgress::CacheUnavailable { reason } => {
                if let Some(pb) = state.followed_bar.take() {
                    pb.finish_and_clear();
                }
                self.println(&format!(
                    "{} {reason}; checking projects one by one",
                    style("·").dim()
                ));
            }

            BatchProgress::FetchingRepos { namespace } => {
                let pb = self.spinner(&namespace, "Fetching repositories...".to_string());
                state.fetch_bars.insert(namespace, pb);
            }

            BatchProgress::FetchedPage {
                namespace,
                page,
                total_so_far,
                ..
            } => {
                if let Some(pb) = state.fetch_bars.get(&namespace) {
                    pb.set_message(format!("Page {page} ({total_so_far} repos)"));
                }
            }

            BatchProgress::FetchComplete { namespace, total } => {
                if let Some(pb) = state.fetch_bars.remove(&namespace) {
                    pb.finish_with_message(format!("✓ {total} repos"));
                }
            }

            BatchProgress::SkippedFork { full_name } => {
                drop(state);
                self.println(&format!("{} Skipping fork {full_name}", style("⚠").yellow()));
            }

            BatchProgress::RateLimitBackoff {
                target,
                retry_after_ms,
                attempt,
            } => {
                if let Some(pb) = state.fetch_bars.get(&target) {
                    pb.set_message(format!(
                        "⏳ rate limited, retry {attempt} in {:.1}s",
                        retry_after_ms as f64 / 1000.0
                    ));
                }
            }

            BatchProgress::Excluded { item, pattern } => {
                drop(state);
                self.println(&format!(
                    "{} {item} is excluded (by pattern {pattern:?}); skipping",
                    style("⚠").yellow()
                ));
            }

            BatchProgress::Unresolved { item, reason } => {
                drop(state);
                self.println(&format!("{} {item}: {reason}; skipping", style("⚠").yellow()));
            }

            BatchProgress::Planned {
                action,
                total,
                skipped,
            } => {
                drop(state);
                self.println(&format!(
                    "{} {total} to process ({skipped} skipped)",
                    style(action.verb()).bold()
                ));
            }

            BatchProgress::Dispatching { action, total, .. } => {
                if total == 0 {
                    return;
                }
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", action.verb()));
                state.batch_bar = Some(pb);
            }

            BatchProgress::ItemStarted {
                item, percent, eta, ..
            } => {
                if let Some(pb) = &state.batch_bar {
                    let eta = if eta.is_zero() {
                        String::new()
                    } else {
                        format!(" ETA {}", format_eta(eta))
                    };
                    pb.set_message(format!("{item} ({percent}{eta})"));
                }
            }

            BatchProgress::ItemSucceeded { item, created, .. } => {
                if let Some(pb) = &state.batch_bar {
                    pb.inc(1);
                    let symbol = if created { "★" } else { "·" };
                    pb.set_message(format!("{symbol} {item}"));
                }
            }

            BatchProgress::ItemFailed { item, error, .. } => {
                if let Some(pb) = &state.batch_bar {
                    pb.inc(1);
                }
                drop(state);
                self.println(&format!("{} {item}: {error}", style("✗").red()));
            }

            BatchProgress::CoolingDown { wait } => {
                if let Some(pb) = &state.batch_bar {
                    pb.set_message(format!(
                        "⏳ new project, waiting {}",
                        format_eta(wait)
                    ));
                }
            }

            BatchProgress::BatchComplete {
                action,
                succeeded,
                created,
                failed,
                ..
            } => {
                if let Some(pb) = state.batch_bar.take() {
                    let msg = if failed > 0 {
                        format!("✓ {} {succeeded} ({created} new), {failed} failed", action.past())
                    } else {
                        format!("✓ {} {succeeded} ({created} new)", action.past())
                    };
                    pb.finish_with_message(msg);
                }
            }

            BatchProgress::Warning { message } => {
                drop(state);
                self.println(&format!("{} {message}", style("⚠").yellow()));
            }

            _ => {}
        }
    }

    pub(crate) fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pb) = state.followed_bar.take() {
            pb.finish();
        }
        for (_, pb) in state.fetch_bars.drain() {
            pb.finish();
        }
        if let Some(pb) = state.batch_bar.take() {
            pb.finish();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}

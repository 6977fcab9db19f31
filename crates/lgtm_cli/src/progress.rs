//! Progress reporting for batch commands.
//!
//! This module provides two modes of progress reporting:
//! - Interactive mode (TTY): progress bars using indicatif
//! - Logging mode (non-TTY): structured logging using tracing
//!
//! Both are driven by the library's [`BatchProgress`] events.

mod interactive;
mod logging;

use std::sync::Arc;

use console::Term;
use lgtm::batch::{BatchProgress, ProgressCallback};

pub(crate) use interactive::InteractiveReporter;
pub(crate) use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub(crate) enum ProgressReporter {
    /// Interactive progress bars for TTY.
    Interactive(InteractiveReporter),
    /// Structured logging for non-TTY (CI, pipes).
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub(crate) fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub(crate) fn handle(&self, event: BatchProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a ProgressCallback for the library.
    pub(crate) fn as_callback(self: &Arc<Self>) -> Arc<ProgressCallback> {
        let reporter = Arc::clone(self);
        Arc::new(Box::new(move |event| {
            reporter.handle(event);
        }))
    }

    /// Print a line without tearing any bar that is being drawn.
    pub(crate) fn println(&self, line: &str) {
        match self {
            Self::Interactive(r) => r.println(line),
            Self::Logging(_) => println!("{line}"),
        }
    }

    /// Finish all progress bars (interactive mode only).
    pub(crate) fn finish(&self) {
        if let Self::Interactive(r) = self {
            r.finish();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lgtm::batch::BatchAction;

    use super::*;

    fn events() -> Vec<BatchProgress> {
        vec![
            BatchProgress::FetchingFollowed,
            BatchProgress::FetchedFollowed {
                projects: 3,
                proto_projects: 1,
                elapsed: Duration::from_millis(1200),
            },
            BatchProgress::Excluded {
                item: "https://github.com/a/b".to_string(),
                pattern: "a/*".to_string(),
            },
            BatchProgress::Planned {
                action: BatchAction::Follow,
                total: 2,
                skipped: 3,
            },
            BatchProgress::Dispatching {
                action: BatchAction::Follow,
                total: 2,
                concurrency: 6,
            },
            BatchProgress::ItemStarted {
                action: BatchAction::Follow,
                item: "https://github.com/a/c".to_string(),
                position: 1,
                total: 2,
                percent: "0.0%".to_string(),
                eta: Duration::ZERO,
            },
            BatchProgress::ItemSucceeded {
                action: BatchAction::Follow,
                item: "https://github.com/a/c".to_string(),
                created: true,
            },
            BatchProgress::CoolingDown {
                wait: Duration::from_secs(30),
            },
            BatchProgress::ItemFailed {
                action: BatchAction::Follow,
                item: "https://github.com/a/d".to_string(),
                error: "boom".to_string(),
            },
            BatchProgress::BatchComplete {
                action: BatchAction::Follow,
                total: 2,
                succeeded: 1,
                created: 1,
                failed: 1,
            },
        ]
    }

    #[test]
    fn logging_reporter_handles_a_whole_batch() {
        let reporter = Arc::new(ProgressReporter::Logging(LoggingReporter::new()));
        let callback = reporter.as_callback();
        for event in events() {
            callback(event);
        }
        reporter.finish();
    }

    #[test]
    fn interactive_reporter_handles_a_whole_batch() {
        let reporter = Arc::new(ProgressReporter::Interactive(InteractiveReporter::hidden()));
        let callback = reporter.as_callback();
        for event in events() {
            callback(event);
        }
        reporter.finish();
    }
}

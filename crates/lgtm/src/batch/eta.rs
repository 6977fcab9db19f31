//! Completion counting and remaining-time estimates.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Completions kept for the moving average.
const WINDOW: usize = 50;

/// Thread-safe done counter with an ETA.
///
/// Time is read from tokio's clock so paused-time tests are deterministic.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    done: AtomicU64,
    /// `(when, done count at that moment)`, oldest first.
    window: Mutex<VecDeque<(Instant, u64)>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(total: u64) -> Self {
        let mut window = VecDeque::with_capacity(WINDOW + 1);
        window.push_back((Instant::now(), 0));
        Self {
            total,
            done: AtomicU64::new(0),
            window: Mutex::new(window),
        }
    }

    /// Record `n` more completions.
    pub fn done(&self, n: u64) {
        let now_done = self.done.fetch_add(n, Ordering::SeqCst) + n;
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.push_back((Instant::now(), now_done));
        while window.len() > WINDOW {
            window.pop_front();
        }
    }

    #[must_use]
    pub fn done_count(&self) -> u64 {
        self.done.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Tenths of a percent done, rounded down so 100% only shows once
    /// everything is done. An empty batch is complete.
    fn permille(&self) -> u64 {
        if self.total == 0 {
            return 1000;
        }
        let done = u128::from(self.done_count().min(self.total));
        (done * 1000 / u128::from(self.total)) as u64
    }

    /// Percent done in `[0, 100]`.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.permille() as f64 / 10.0
    }

    /// Percent done with one decimal, e.g. `42.5%`.
    #[must_use]
    pub fn formatted_percent(&self) -> String {
        let permille = self.permille();
        format!("{}.{}%", permille / 10, permille % 10)
    }

    /// Estimated time to finish, from the average time per completion over
    /// the recent window. Zero before the first completion and once done.
    #[must_use]
    pub fn eta(&self) -> Duration {
        let done = self.done_count();
        if self.total == 0 || done == 0 || done >= self.total {
            return Duration::ZERO;
        }

        let (since, done_then) = {
            let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            match window.front() {
                Some(front) => *front,
                None => return Duration::ZERO,
            }
        };
        let completed = done.saturating_sub(done_then);
        if completed == 0 {
            return Duration::ZERO;
        }

        let per_item = Instant::now().duration_since(since).as_secs_f64() / completed as f64;
        Duration::from_secs_f64(per_item * (self.total - done) as f64)
    }
}

/// Human-readable duration: `42s`, `2m 5s`, `1h 5m`.
#[must_use]
pub fn format_eta(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn zero_total_is_complete_and_has_no_eta() {
        let tracker = ProgressTracker::new(0);
        assert_eq!(tracker.formatted_percent(), "100.0%");
        assert_eq!(tracker.eta(), Duration::ZERO);
    }

    #[tokio::test]
    async fn eta_is_zero_before_first_completion() {
        let tracker = ProgressTracker::new(10);
        assert_eq!(tracker.formatted_percent(), "0.0%");
        assert_eq!(tracker.eta(), Duration::ZERO);
    }

    #[test]
    fn percent_is_monotonic_bounded_and_exact_at_completion() {
        let tracker = ProgressTracker::new(3);
        let mut last = tracker.percent();
        for _ in 0..3 {
            tracker.done(1);
            let now = tracker.percent();
            assert!(now >= last);
            assert!((0.0..=100.0).contains(&now));
            last = now;
        }
        assert_eq!(tracker.done_count(), tracker.total());
        assert_eq!(tracker.formatted_percent(), "100.0%");

        tracker.done(5);
        assert_eq!(tracker.formatted_percent(), "100.0%");
    }

    #[test]
    fn nearly_done_does_not_round_up_to_100() {
        let tracker = ProgressTracker::new(10_000);
        tracker.done(9_999);
        assert_eq!(tracker.formatted_percent(), "99.9%");
    }

    #[test]
    fn whole_percentages_format_exactly() {
        let tracker = ProgressTracker::new(100);
        assert_eq!(tracker.formatted_percent(), "0.0%");
        for n in 1..=100 {
            tracker.done(1);
            assert_eq!(tracker.formatted_percent(), format!("{n}.0%"));
        }
    }

    #[test]
    fn fractional_percent_truncates_to_one_decimal() {
        let tracker = ProgressTracker::new(3);
        tracker.done(1);
        assert_eq!(tracker.formatted_percent(), "33.3%");
        tracker.done(1);
        assert_eq!(tracker.formatted_percent(), "66.6%");
    }

    #[tokio::test(start_paused = true)]
    async fn eta_follows_average_pace() {
        let tracker = ProgressTracker::new(10);
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(2)).await;
            tracker.done(1);
        }
        // 2s per item, 6 items left.
        assert_eq!(tracker.eta(), Duration::from_secs(12));

        tracker.done(6);
        assert_eq!(tracker.eta(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn eta_uses_recent_window() {
        let tracker = ProgressTracker::new(200);
        for _ in 0..WINDOW {
            tokio::time::advance(Duration::from_secs(10)).await;
            tracker.done(1);
        }
        for _ in 0..WINDOW {
            tokio::time::advance(Duration::from_secs(1)).await;
            tracker.done(1);
        }
        // The slow start has left the window: ~1s per item, 100 left.
        let eta = tracker.eta();
        assert!(eta >= Duration::from_secs(95), "eta {eta:?}");
        assert!(eta <= Duration::from_secs(105), "eta {eta:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_done_calls_are_all_counted() {
        let tracker = Arc::new(ProgressTracker::new(400));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    tracker.done(1);
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(tracker.done_count(), 400);
        assert_eq!(tracker.formatted_percent(), "100.0%");
    }

    #[test]
    fn format_eta_handles_seconds_minutes_and_hours() {
        assert_eq!(format_eta(Duration::from_secs(42)), "42s");
        assert_eq!(format_eta(Duration::from_secs(120)), "2m");
        assert_eq!(format_eta(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_eta(Duration::from_secs(3600)), "1h");
        assert_eq!(format_eta(Duration::from_secs(3900)), "1h 5m");
    }
}

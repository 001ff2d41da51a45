// Run metrics module
//
// Lock-free counters for one or more cleaning runs, logged at the end of a run.

use crate::models::CleanResult;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every worker of a run.
#[derive(Debug)]
pub struct RunMetrics {
    pub profiles_cleaned: AtomicUsize,
    pub profiles_failed: AtomicUsize,
    pub profiles_skipped: AtomicUsize,

    pub cookies_deleted: AtomicU64,
    pub storage_items_deleted: AtomicU64,
    pub cache_items_deleted: AtomicU64,

    /// Time spent inside cleaning (backup included), in milliseconds
    pub total_clean_time_ms: AtomicU64,

    /// Browsers that had to be terminated before cleaning
    pub browsers_terminated: AtomicUsize,

    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            profiles_cleaned: AtomicUsize::new(0),
            profiles_failed: AtomicUsize::new(0),
            profiles_skipped: AtomicUsize::new(0),
            cookies_deleted: AtomicU64::new(0),
            storage_items_deleted: AtomicU64::new(0),
            cache_items_deleted: AtomicU64::new(0),
            total_clean_time_ms: AtomicU64::new(0),
            browsers_terminated: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count a finished profile in the matching bucket and add its deletions
    pub fn record_result(&self, result: &CleanResult) {
        let bucket = if result.skipped {
            &self.profiles_skipped
        } else if result.has_errors() {
            &self.profiles_failed
        } else {
            &self.profiles_cleaned
        };
        bucket.fetch_add(1, Ordering::Relaxed);

        self.cookies_deleted
            .fetch_add(result.cookies_deleted, Ordering::Relaxed);
        self.storage_items_deleted
            .fetch_add(result.storage_items_deleted, Ordering::Relaxed);
        self.cache_items_deleted
            .fetch_add(result.cache_items_deleted, Ordering::Relaxed);
    }

    pub fn record_clean_time(&self, duration: Duration) {
        self.total_clean_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_termination(&self) {
        self.browsers_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn profiles_processed(&self) -> usize {
        self.profiles_cleaned.load(Ordering::Relaxed)
            + self.profiles_failed.load(Ordering::Relaxed)
            + self.profiles_skipped.load(Ordering::Relaxed)
    }

    /// Average clean time over profiles that were not skipped
    pub fn avg_clean_time_ms(&self) -> f64 {
        let total = self.total_clean_time_ms.load(Ordering::Relaxed);
        let count = self.profiles_cleaned.load(Ordering::Relaxed)
            + self.profiles_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Run Metrics Summary ===");
        tracing::info!("Elapsed: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Profiles: {} cleaned, {} failed, {} skipped ({} browsers terminated)",
            self.profiles_cleaned.load(Ordering::Relaxed),
            self.profiles_failed.load(Ordering::Relaxed),
            self.profiles_skipped.load(Ordering::Relaxed),
            self.browsers_terminated.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Removed: {} cookies, {} storage items, {} cache items",
            self.cookies_deleted.load(Ordering::Relaxed),
            self.storage_items_deleted.load(Ordering::Relaxed),
            self.cache_items_deleted.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Clean time: {:.2}s (avg: {:.2}ms per profile)",
            self.total_clean_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_clean_time_ms()
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrowserKind, BrowserProfile};
    use camino::Utf8PathBuf;

    fn profile() -> BrowserProfile {
        BrowserProfile::new(
            BrowserKind::Firefox,
            Utf8PathBuf::from("/p/abc.default-release"),
            Utf8PathBuf::from("/p"),
            true,
        )
    }

    #[test]
    fn test_record_result_buckets_and_counts() {
        let metrics = RunMetrics::new();

        let mut cleaned = CleanResult::for_profile(&profile());
        cleaned.cookies_deleted = 5;
        cleaned.cache_items_deleted = 2;
        metrics.record_result(&cleaned);

        let mut failed = CleanResult::for_profile(&profile());
        failed.errors.push("boom".to_string());
        metrics.record_result(&failed);

        metrics.record_result(&CleanResult::skipped(&profile(), "process did not close in time"));

        assert_eq!(metrics.profiles_cleaned.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.profiles_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.profiles_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.cookies_deleted.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.profiles_processed(), 3);
    }

    #[test]
    fn test_avg_clean_time() {
        let metrics = RunMetrics::new();
        assert_eq!(metrics.avg_clean_time_ms(), 0.0);

        metrics.record_result(&CleanResult::for_profile(&profile()));
        metrics.record_result(&CleanResult::for_profile(&profile()));
        metrics.record_clean_time(Duration::from_millis(100));
        metrics.record_clean_time(Duration::from_millis(200));

        assert_eq!(metrics.avg_clean_time_ms(), 150.0);
    }
}

//! Negative cache of recently failed keys.

use dashmap::DashMap;
use tokio::time::{Duration, Instant};

/// How long a failure suppresses new attempts for the same key.
pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Entries older than this are pruned whenever a new failure is recorded.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Short-lived memo of failed keys, independent of the positive cache.
pub struct FailureMemo {
    failed: DashMap<String, Instant>,
    window: Duration,
    retention: Duration,
}

impl FailureMemo {
    pub fn new(window: Duration, retention: Duration) -> Self {
        Self {
            failed: DashMap::new(),
            window,
            retention: retention.max(window),
        }
    }

    /// Record a failure for `key` and prune stale entries.
    pub fn mark_failed(&self, key: &str) {
        let now = Instant::now();
        self.failed.insert(key.to_string(), now);

        let retention = self.retention;
        self.failed
            .retain(|_, failed_at| now.duration_since(*failed_at) <= retention);
    }

    /// Whether `key` failed inside the suppression window.
    pub fn is_recently_failed(&self, key: &str) -> bool {
        self.failed
            .get(key)
            .is_some_and(|failed_at| failed_at.elapsed() < self.window)
    }

    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn clear(&self) {
        self.failed.clear();
    }
}

impl Default for FailureMemo {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPRESSION_WINDOW, DEFAULT_RETENTION)
    }
}

//! Mediarelay-Governor: consumer-side request governor.
//!
//! Many image and video elements asking for relay URLs at once is exactly the
//! load pattern that exhausts a shared upstream quota. The [`Governor`] sits
//! in front of every such fetch:
//!
//! - **Positive cache** ([`AssetCache`]): small payloads are kept for 24 hours
//! - **Failure memo** ([`FailureMemo`]): a failed key is not retried for 5 minutes
//! - **Throttle mirror** ([`ThrottleMirror`]): learned from `X-Rate-Limit-Reset`;
//!   while limited, no provider-backed request is issued at all
//! - **Request queue** ([`RequestQueue`]): at most two provider-backed fetches
//!   in flight, FIFO, slot released on every exit path
//!
//! [`GovernedClient`] wires these together around `reqwest` and collapses
//! concurrent fetches of the same URL into one request. [`VisibilityGate`] and
//! [`RateLimitBanner`] are the two UI-facing helpers.
//!
//! # Examples
//!
//! ```
//! use mediarelay_governor::Governor;
//! use bytes::Bytes;
//!
//! let governor = Governor::default();
//! governor.set("cover:42", Bytes::from_static(b"jpeg"));
//! assert_eq!(governor.get("cover:42"), Some(Bytes::from_static(b"jpeg")));
//!
//! governor.mark_request_failed("page:42:3");
//! assert!(governor.is_recently_failed("page:42:3"));
//! ```

pub mod banner;
pub mod cache;
pub mod client;
pub mod error;
pub mod failure;
pub mod mirror;
pub mod queue;
pub mod visibility;

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::time::Duration;

pub use banner::{format_countdown, BannerState, RateLimitBanner};
pub use cache::AssetCache;
pub use client::{Fetched, GovernedClient};
pub use error::GovernorError;
pub use failure::FailureMemo;
pub use mirror::{RateLimitStatus, ThrottleMirror};
pub use queue::{QueueStats, RequestQueue};
pub use visibility::{Rect, VisibilityGate};

/// Tunables for a [`Governor`].
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub max_concurrent: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub max_entry_bytes: usize,
    pub failure_window: Duration,
    pub failure_retention: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: queue::DEFAULT_MAX_CONCURRENT,
            cache_ttl: cache::DEFAULT_TTL,
            cache_capacity: cache::DEFAULT_CAPACITY,
            max_entry_bytes: cache::MAX_ENTRY_BYTES,
            failure_window: failure::DEFAULT_SUPPRESSION_WINDOW,
            failure_retention: failure::DEFAULT_RETENTION,
        }
    }
}

/// Snapshot for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernorStats {
    pub cached_entries: usize,
    pub failed_keys: usize,
    pub rate_limit: RateLimitStatus,
    pub queue: QueueStats,
}

struct GovernorInner {
    cache: AssetCache,
    failures: FailureMemo,
    mirror: Arc<ThrottleMirror>,
    queue: RequestQueue,
}

/// Shared governor state. Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct Governor {
    inner: Arc<GovernorInner>,
}

impl Governor {
    pub fn new(config: GovernorConfig) -> Self {
        let mirror = Arc::new(ThrottleMirror::new());
        Self {
            inner: Arc::new(GovernorInner {
                cache: AssetCache::new(
                    config.cache_ttl,
                    config.cache_capacity,
                    config.max_entry_bytes,
                ),
                failures: FailureMemo::new(config.failure_window, config.failure_retention),
                queue: RequestQueue::new(config.max_concurrent, mirror.clone()),
                mirror,
            }),
        }
    }

    /// Cached payload for `key`, if present and fresh.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.cache.get(key)
    }

    /// Cache `payload`; returns `false` if it was too large to admit.
    pub fn set(&self, key: &str, payload: Bytes) -> bool {
        self.inner.cache.set(key, payload)
    }

    pub fn is_recently_failed(&self, key: &str) -> bool {
        self.inner.failures.is_recently_failed(key)
    }

    pub fn mark_request_failed(&self, key: &str) {
        tracing::debug!(key, "Request marked as failed");
        self.inner.failures.mark_failed(key);
    }

    pub fn is_rate_limited(&self) -> RateLimitStatus {
        self.inner.mirror.status()
    }

    pub fn set_rate_limited(&self, secs_until_reset: u64) {
        self.inner.mirror.set_rate_limited(secs_until_reset);
    }

    /// Run `task` through the bounded queue. See [`RequestQueue::run`].
    pub async fn enqueue<F, Fut, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<GovernorError>,
    {
        self.inner.queue.run(task).await
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Stop admitting queued work.
    pub fn close(&self) {
        self.inner.queue.close();
    }

    pub fn stats(&self) -> GovernorStats {
        GovernorStats {
            cached_entries: self.inner.cache.len(),
            failed_keys: self.inner.failures.len(),
            rate_limit: self.inner.mirror.status(),
            queue: self.inner.queue.stats(),
        }
    }
}

impl Default for Governor {
    fn default() -> Self {
        Self::new(GovernorConfig::default())
    }
}

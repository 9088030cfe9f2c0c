//! Local mirror of the server's throttle window.
//!
//! Populated from `X-Rate-Limit-Reset` headers and 429 bodies; nothing pushes
//! to it. Reads clear an elapsed window.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::{Duration, Instant};

/// Header the server uses to publish the reset hint.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Window assumed when a 429 carries no usable hint.
pub const DEFAULT_RESET_SECS: u64 = 3600;

/// Longest window mirrored; larger hints are clamped to this.
pub const MAX_RESET_SECS: u64 = 86_400;

/// Snapshot of the mirrored window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub limited: bool,
    /// Whole seconds left, rounded up; `0` when not limited.
    pub remaining_secs: u64,
}

#[derive(Debug, Default)]
pub struct ThrottleMirror {
    reset_at: RwLock<Option<Instant>>,
}

impl ThrottleMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror a window of `secs_until_reset`, clamped to [`MAX_RESET_SECS`].
    pub fn set_rate_limited(&self, secs_until_reset: u64) {
        let secs_until_reset = secs_until_reset.min(MAX_RESET_SECS);
        *self.reset_at.write() = Some(Instant::now() + Duration::from_secs(secs_until_reset));
        tracing::info!(secs_until_reset, "Rate limit mirrored from server");
    }

    pub fn status(&self) -> RateLimitStatus {
        let now = Instant::now();
        let reset_at = *self.reset_at.read();
        match reset_at {
            Some(at) if at > now => {
                let left = at - now;
                let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
                RateLimitStatus {
                    limited: true,
                    remaining_secs: secs,
                }
            }
            Some(_) => {
                self.clear_elapsed(now);
                RateLimitStatus {
                    limited: false,
                    remaining_secs: 0,
                }
            }
            None => RateLimitStatus {
                limited: false,
                remaining_secs: 0,
            },
        }
    }

    /// Clear only a window that has ended by `now`.
    fn clear_elapsed(&self, now: Instant) {
        let mut guard = self.reset_at.write();
        if matches!(*guard, Some(at) if at <= now) {
            *guard = None;
        }
    }

    pub fn clear(&self) {
        *self.reset_at.write() = None;
    }
}

/// Parse a reset hint header value into whole seconds, clamped to
/// [`MAX_RESET_SECS`].
pub fn parse_reset_header(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.min(MAX_RESET_SECS))
}

//! Upstream throttle detection and the process-wide throttle window.
//!
//! Providers report bandwidth ceilings inconsistently: sometimes as a numeric
//! `time_limit`, sometimes only as message text. [`classify`] is the single
//! place that inspects raw [`UpstreamError`]s and maps them onto the error
//! taxonomy; nothing else in the crate matches on message substrings.
//!
//! [`ThrottleState`] is one logical flag per upstream account. Concurrent
//! requests may race to set it; the last write wins, which is fine because
//! every writer means the same thing ("limited until roughly then").

use mediarelay_common::{Error, UpstreamError};
use parking_lot::RwLock;
use tokio::time::{Duration, Instant};

/// Reset hint used when the upstream signals a throttle without a window.
pub const DEFAULT_RESET_SECS: u64 = 3600;

/// Response header carrying the reset hint in whole seconds.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Longest window honoured; larger upstream hints are clamped to this.
pub const MAX_RESET_SECS: u64 = 86_400;

const THROTTLE_MARKERS: &[&str] = &[
    "bandwidth limit",
    "transfer quota",
    "over quota",
    "rate limit",
];
const THROTTLE_CODES: &[&str] = &["429", "509", "EOVERQUOTA", "ETOOMANY"];

const TRANSIENT_MARKERS: &[&str] = &[
    "eagain",
    "temporary",
    "temporarily",
    "congestion",
    "timed out",
    "timeout",
    "connection reset",
    "try again",
];
const TRANSIENT_CODES: &[&str] = &[
    "EAGAIN",
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "500",
    "502",
    "503",
    "504",
];

const NOT_FOUND_CODES: &[&str] = &["404", "410", "ENOENT"];
const NOT_FOUND_MARKERS: &[&str] = &["not found", "no such file", "does not exist"];

const UNAUTHORIZED_CODES: &[&str] = &["401", "ESID", "EKEY"];
const FORBIDDEN_CODES: &[&str] = &["403", "EACCES", "EACCESS", "EBLOCKED"];

/// Translate a raw upstream failure into the error taxonomy.
///
/// Throttling wins over everything else: a typed `time_limit`, a throttle code,
/// or a bandwidth message all yield [`Error::Throttled`], with
/// `default_reset_secs` filling in a missing window. The window is clamped to
/// [`MAX_RESET_SECS`].
pub fn classify(err: &UpstreamError, default_reset_secs: u64) -> Error {
    let message = err.message.to_lowercase();
    let code = err.code.as_deref().unwrap_or("");

    if err.time_limit.is_some()
        || THROTTLE_CODES.contains(&code)
        || THROTTLE_MARKERS.iter().any(|m| message.contains(m))
    {
        let reset_secs = err.time_limit.unwrap_or(default_reset_secs);
        return Error::throttled(reset_secs.min(MAX_RESET_SECS));
    }

    if NOT_FOUND_CODES.contains(&code) || NOT_FOUND_MARKERS.iter().any(|m| message.contains(m)) {
        return Error::not_found(err.message.clone());
    }

    if UNAUTHORIZED_CODES.contains(&code) {
        return Error::Unauthorized(err.message.clone());
    }

    if FORBIDDEN_CODES.contains(&code) {
        return Error::Forbidden(err.message.clone());
    }

    if TRANSIENT_CODES.contains(&code) || TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
        return Error::transient(err.message.clone());
    }

    Error::upstream(err.message.clone())
}

/// Snapshot of the throttle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStatus {
    pub limited: bool,
    /// Whole seconds until the window resets (rounded up), `0` when not limited.
    pub remaining_secs: u64,
}

impl ThrottleStatus {
    const CLEAR: ThrottleStatus = ThrottleStatus {
        limited: false,
        remaining_secs: 0,
    };
}

/// Process-wide throttle flag for the upstream account.
#[derive(Debug, Default)]
pub struct ThrottleState {
    reset_at: RwLock<Option<Instant>>,
}

impl ThrottleState {
    /// Create an unthrottled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the upstream is limited for the next `reset_secs` seconds.
    pub fn mark_limited(&self, reset_secs: u64) {
        let reset_secs = reset_secs.min(MAX_RESET_SECS);
        let reset_at = Instant::now() + Duration::from_secs(reset_secs);
        *self.reset_at.write() = Some(reset_at);
        tracing::warn!(reset_secs, "Upstream throttle window recorded");
    }

    /// Record the window if `err` is a throttle condition.
    pub fn observe(&self, err: &Error) {
        if let Some(reset_secs) = err.reset_secs() {
            self.mark_limited(reset_secs);
        }
    }

    /// Current status; an elapsed window is cleared on read.
    pub fn status(&self) -> ThrottleStatus {
        let now = Instant::now();
        let reset_at = *self.reset_at.read();

        match reset_at {
            Some(at) if at > now => {
                let remaining = at - now;
                let mut secs = remaining.as_secs();
                if remaining.subsec_nanos() > 0 {
                    secs += 1;
                }
                ThrottleStatus {
                    limited: true,
                    remaining_secs: secs,
                }
            }
            Some(_) => {
                self.clear_elapsed(now);
                ThrottleStatus::CLEAR
            }
            None => ThrottleStatus::CLEAR,
        }
    }

    /// Clear the window only if it still ends at or before `now`; a newer
    /// window recorded since the read is kept.
    fn clear_elapsed(&self, now: Instant) {
        let mut guard = self.reset_at.write();
        if matches!(*guard, Some(at) if at <= now) {
            *guard = None;
            tracing::info!("Upstream throttle window cleared");
        }
    }

    /// Forget any recorded window.
    pub fn clear(&self) {
        let mut guard = self.reset_at.write();
        if guard.is_some() {
            *guard = None;
            tracing::info!("Upstream throttle window cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_limit_attribute_is_throttle() {
        let err = UpstreamError::new("download failed").with_time_limit(120);
        assert_eq!(classify(&err, DEFAULT_RESET_SECS), Error::throttled(120));
    }

    #[test]
    fn test_bandwidth_message_uses_default_reset() {
        let err = UpstreamError::new("Bandwidth limit reached: 3 GB");
        assert_eq!(classify(&err, DEFAULT_RESET_SECS), Error::throttled(3600));
        assert_eq!(classify(&err, 60), Error::throttled(60));
    }

    #[test]
    fn test_throttle_codes() {
        let err = UpstreamError::new("Too Many Requests").with_code("429");
        assert_eq!(classify(&err, 10), Error::throttled(10));

        let err = UpstreamError::new("quota").with_code("509");
        assert_eq!(classify(&err, 10), Error::throttled(10));
    }

    #[test]
    fn test_transient_markers() {
        for message in ["EAGAIN (-3)", "temporary failure", "network congestion"] {
            let err = UpstreamError::new(message);
            assert!(
                matches!(classify(&err, 1), Error::Transient(_)),
                "{message} should be transient"
            );
        }

        let err = UpstreamError::new("gateway").with_code("503");
        assert!(matches!(classify(&err, 1), Error::Transient(_)));
    }

    #[test]
    fn test_not_found_and_credentials() {
        let err = UpstreamError::new("gone").with_code("404");
        assert!(matches!(classify(&err, 1), Error::NotFound(_)));

        let err = UpstreamError::new("No such file or directory");
        assert!(matches!(classify(&err, 1), Error::NotFound(_)));

        let err = UpstreamError::new("bad session").with_code("401");
        assert!(matches!(classify(&err, 1), Error::Unauthorized(_)));

        let err = UpstreamError::new("blocked").with_code("403");
        assert!(matches!(classify(&err, 1), Error::Forbidden(_)));
    }

    #[test]
    fn test_unknown_is_hard_upstream_failure() {
        let err = UpstreamError::new("MAC verification failed");
        let classified = classify(&err, 1);
        assert!(matches!(classified, Error::Upstream(_)));
        assert!(!classified.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_expires_lazily() {
        let state = ThrottleState::new();
        assert!(!state.status().limited);

        state.mark_limited(30);
        let status = state.status();
        assert!(status.limited);
        assert_eq!(status.remaining_secs, 30);

        tokio::time::advance(Duration::from_millis(10_500)).await;
        assert_eq!(state.status().remaining_secs, 20);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(state.status(), ThrottleStatus::CLEAR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins() {
        let state = ThrottleState::new();
        state.mark_limited(600);
        state.mark_limited(5);
        assert_eq!(state.status().remaining_secs, 5);

        state.observe(&Error::transient("not a throttle"));
        assert_eq!(state.status().remaining_secs, 5);

        state.observe(&Error::throttled(90));
        assert_eq!(state.status().remaining_secs, 90);
    }

    #[test]
    fn test_huge_time_limit_is_clamped() {
        let err = UpstreamError::new("Too Many Requests")
            .with_code("429")
            .with_time_limit(u64::MAX);
        assert_eq!(
            classify(&err, DEFAULT_RESET_SECS),
            Error::throttled(MAX_RESET_SECS)
        );
        assert_eq!(
            classify(&UpstreamError::new("over quota"), u64::MAX),
            Error::throttled(MAX_RESET_SECS)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_window_does_not_overflow() {
        let state = ThrottleState::new();
        state.mark_limited(u64::MAX);
        assert_eq!(state.status().remaining_secs, MAX_RESET_SECS);

        state.observe(&Error::throttled(u64::MAX));
        assert!(state.status().limited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_clear_keeps_newer_window() {
        let state = ThrottleState::new();
        state.mark_limited(1);
        tokio::time::advance(Duration::from_secs(2)).await;

        let stale = Instant::now();
        state.mark_limited(60);
        state.clear_elapsed(stale);
        assert_eq!(state.status().remaining_secs, 60);

        tokio::time::advance(Duration::from_secs(61)).await;
        state.clear_elapsed(Instant::now());
        assert_eq!(state.status(), ThrottleStatus::CLEAR);
    }
}

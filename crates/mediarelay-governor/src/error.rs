//! Governor error type.

/// Why the governor refused or failed a fetch.
///
/// `Clone` so one in-flight result can be handed to every deduplicated waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernorError {
    /// The shared throttle mirror says the upstream is limited.
    #[error("Rate limited. Try again in {remaining_secs} seconds.")]
    RateLimited { remaining_secs: u64 },

    /// The same key failed within the suppression window.
    #[error("Request for {key} failed recently; not retrying yet")]
    RecentlyFailed { key: String },

    /// The server answered with a non-success status.
    #[error("Server responded with status {status}")]
    Status { status: u16 },

    /// Transport-level failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// The queue was shut down while the task waited for a slot.
    #[error("Request queue closed")]
    Closed,
}

impl GovernorError {
    /// Whether this failure should be remembered in the failure memo.
    ///
    /// Throttle refusals are tracked by the mirror instead, and a closed queue
    /// says nothing about the asset itself.
    pub fn is_memoised(&self) -> bool {
        !matches!(
            self,
            GovernorError::RateLimited { .. }
                | GovernorError::RecentlyFailed { .. }
                | GovernorError::Closed
        )
    }
}

impl From<reqwest::Error> for GovernorError {
    fn from(err: reqwest::Error) -> Self {
        GovernorError::Request(err.to_string())
    }
}

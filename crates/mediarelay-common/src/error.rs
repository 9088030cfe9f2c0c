//! Common error types used throughout mediarelay.
//!
//! [`Error`] is the taxonomy every layer funnels into. It carries enough context
//! for the HTTP layer to derive a status code via [`Error::http_status`], and for
//! the retry executor to decide whether another attempt is worthwhile via
//! [`Error::is_retryable`].
//!
//! [`UpstreamError`] is the raw, loosely-typed failure shape reported by asset
//! providers. It is translated into an [`Error`] in exactly one place (the
//! server's throttle module) so string sniffing never leaks into call sites.

/// Common error type for mediarelay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The catalog id or upstream locator does not resolve.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The upstream account is out of bandwidth quota until the reset elapses.
    #[error("Upstream bandwidth limit reached (resets in {reset_secs}s)")]
    Throttled {
        /// Seconds until the upstream window resets.
        reset_secs: u64,
    },

    /// Congestion or timeout class failure; may succeed if retried later.
    #[error("Transient upstream error: {0}")]
    Transient(String),

    /// Any other upstream failure; not retried, surfaced as "try later".
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The upstream rejected the configured credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The upstream refused access to the asset.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid configuration (credentials, provider settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested range starts at or beyond the asset size.
    #[error("Range not satisfiable for asset of {size} bytes")]
    RangeNotSatisfiable {
        /// Actual asset size in bytes.
        size: u64,
    },

    /// The requester went away mid-stream.
    #[error("Client aborted the request")]
    ClientAbort,

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Throttled error.
    pub fn throttled(reset_secs: u64) -> Self {
        Self::Throttled { reset_secs }
    }

    /// Create a new Transient error.
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a new Upstream error.
    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Self::Upstream(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Configuration error.
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Map this error to the status code used before response headers are sent.
    ///
    /// Credential problems surface as 500: they are server-side misconfiguration
    /// from the client's point of view and retrying will not fix them.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Throttled { .. } => 429,
            Error::Transient(_) | Error::Upstream(_) => 503,
            Error::Unauthorized(_) | Error::Forbidden(_) | Error::Configuration(_) => 500,
            Error::RangeNotSatisfiable { .. } => 416,
            Error::ClientAbort => 499,
            Error::InvalidInput(_) => 400,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Throttled { .. } => "rate_limited",
            Error::Transient(_) => "upstream_unavailable",
            Error::Upstream(_) => "upstream_error",
            Error::Unauthorized(_) => "upstream_unauthorized",
            Error::Forbidden(_) => "upstream_forbidden",
            Error::Configuration(_) => "configuration_error",
            Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Error::ClientAbort => "client_abort",
            Error::InvalidInput(_) => "invalid_input",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Whether the retry executor may try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// The reset hint, if this is a throttle condition.
    pub fn reset_secs(&self) -> Option<u64> {
        match self {
            Error::Throttled { reset_secs } => Some(*reset_secs),
            _ => None,
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure as reported by an upstream asset provider.
///
/// Providers are loosely typed: a bandwidth ceiling may show up as a numeric
/// `time_limit` attribute, as a message substring, or both. Keep the raw facts
/// here and let the translation function decide what they mean.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    /// Human-readable message from the provider.
    pub message: String,
    /// Seconds until the provider's quota window resets, if supplied.
    pub time_limit: Option<u64>,
    /// Provider or transport error code (`"EAGAIN"`, `"404"`, ...), if any.
    pub code: Option<String>,
}

impl UpstreamError {
    /// Create an upstream error carrying only a message.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            time_limit: None,
            code: None,
        }
    }

    /// Attach a quota reset hint in seconds.
    #[must_use]
    pub fn with_time_limit(mut self, secs: u64) -> Self {
        self.time_limit = Some(secs);
        self
    }

    /// Attach a provider error code.
    #[must_use]
    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }
}

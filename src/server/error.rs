//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<Response, AppError>`; this module owns the
//! JSON error shape and the rate-limit contract:
//!
//! ```text
//! HTTP/1.1 429 Too Many Requests
//! X-Rate-Limit-Reset: 3600
//! { "success": false, "message": "...", "timeLimit": 3600 }
//! ```

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use mediarelay_common::Error;
use serde_json::json;

use crate::relay::range::unsatisfiable_range;
use crate::throttle::RATE_LIMIT_RESET_HEADER;

pub const RATE_LIMIT_MESSAGE: &str = "Upstream bandwidth limit reached";

/// Wrapper so we can implement `IntoResponse` for the shared error type.
#[derive(Debug)]
pub struct AppError {
    inner: Error,
}

impl AppError {
    pub fn new(inner: Error) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Error {
        &self.inner
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.inner {
            Error::Throttled { reset_secs } => {
                return rate_limit_response(reset_secs, RATE_LIMIT_MESSAGE)
            }
            Error::ClientAbort => {
                tracing::debug!("Client aborted before response");
                return StatusCode::from_u16(499)
                    .unwrap_or(StatusCode::BAD_REQUEST)
                    .into_response();
            }
            _ => {}
        }

        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in asset handler"
            );
        }

        let body = json!({
            "success": false,
            "message": self.inner.to_string(),
            "code": self.inner.code(),
        });

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        if let Error::RangeNotSatisfiable { size } = self.inner {
            if let Ok(value) = HeaderValue::from_str(&unsatisfiable_range(size)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

/// The 429 contract shared by every endpoint that can observe throttling.
pub fn rate_limit_response(reset_secs: u64, message: &str) -> Response {
    tracing::info!(reset_secs, "Answering with rate-limit contract");

    let body = json!({
        "success": false,
        "message": message,
        "timeLimit": reset_secs,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(reset_secs));
    headers.insert(header::RETRY_AFTER, HeaderValue::from(reset_secs));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// Temporary redirect to a placeholder image. Used instead of JSON errors on
/// endpoints consumed by `<img src>`.
pub fn placeholder_redirect(url: &str, reset_secs: Option<u64>) -> Response {
    let Ok(location) = HeaderValue::from_str(url) else {
        tracing::error!(url, "Placeholder URL is not a valid header value");
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response = StatusCode::FOUND.into_response();
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, location);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if let Some(secs) = reset_secs {
        headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(secs));
    }
    response
}

//! Range-Aware Relay.
//!
//! One request walks `Idle -> MetadataProbe -> RangeCheck -> Streaming` and ends
//! in `Completed`, `Aborted` or `Failed`. Everything up to and including the
//! pre-flight probe happens before a [`Response`] exists, so any failure there
//! still maps to a clean status code. Once [`PreparedRelay::into_response`] has
//! run, errors can only terminate the body.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use mediarelay_common::{AssetHandle, AssetKind, ByteWindow, Error, Result};
use tokio_util::sync::CancellationToken;

use crate::config::{RelayConfig, MAX_PROBE_BYTES};
pub use crate::config::PreflightMode;
use crate::locator::AssetLocator;
use crate::provider::ByteStream;

pub mod body;
pub mod range;

pub use body::RelayBody;
pub use range::RangeRequest;

/// Lifecycle of a single relayed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    MetadataProbe,
    RangeCheck,
    Streaming,
    Completed,
    Aborted,
    Failed,
}

impl RelayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayPhase::Idle => "idle",
            RelayPhase::MetadataProbe => "metadata_probe",
            RelayPhase::RangeCheck => "range_check",
            RelayPhase::Streaming => "streaming",
            RelayPhase::Completed => "completed",
            RelayPhase::Aborted => "aborted",
            RelayPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub preflight: PreflightMode,
    pub probe_bytes: u64,
    pub probe_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl RelaySettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            preflight: config.preflight,
            probe_bytes: config.probe_bytes.clamp(1, MAX_PROBE_BYTES),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }
}

/// A relay that passed pre-flight and is ready to commit headers.
pub struct PreparedRelay {
    handle: AssetHandle,
    window: ByteWindow,
    partial: bool,
    body: RelayBody,
}

impl PreparedRelay {
    pub fn handle(&self) -> &AssetHandle {
        &self.handle
    }

    pub fn window(&self) -> ByteWindow {
        self.window
    }

    pub fn status(&self) -> StatusCode {
        if self.partial {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        }
    }

    /// Commit headers and hand the body to the server.
    ///
    /// No `Content-Length` is sent: upstream sizes are not reliable to the
    /// byte, and a wrong length breaks the client's stream parser.
    pub fn into_response(self, cache_control: Option<&str>) -> Response {
        let status = self.status();
        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, self.handle.content_type())
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");

        if self.handle.kind == AssetKind::Video {
            builder = builder.header(header::ACCEPT_RANGES, "bytes");
        }

        if self.partial {
            if let Some(size) = self.handle.resolved_size {
                builder = builder.header(
                    header::CONTENT_RANGE,
                    range::content_range(self.window, size),
                );
            }
        }

        if let Some(value) = cache_control.and_then(|v| HeaderValue::from_str(v).ok()) {
            builder = builder.header(header::CACHE_CONTROL, value);
        }

        builder
            .body(Body::from_stream(self.body))
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build relay response: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
    }
}

#[derive(Clone)]
pub struct Relay {
    locator: AssetLocator,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(locator: AssetLocator, settings: RelaySettings) -> Self {
        Self { locator, settings }
    }

    pub fn locator(&self) -> &AssetLocator {
        &self.locator
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Resolve `locator` and run pre-flight. Nothing is sent to the client yet.
    pub async fn prepare(
        &self,
        kind: AssetKind,
        locator: &str,
        range: Option<RangeRequest>,
    ) -> Result<PreparedRelay> {
        tracing::trace!(locator, phase = %RelayPhase::MetadataProbe, "Relay phase");
        let handle = self.locator.resolve_handle(kind, locator).await?;
        self.prepare_resolved(handle, range).await
    }

    /// Pre-flight an already probed handle.
    pub async fn prepare_resolved(
        &self,
        handle: AssetHandle,
        range: Option<RangeRequest>,
    ) -> Result<PreparedRelay> {
        tracing::trace!(locator = %handle.locator, phase = %RelayPhase::RangeCheck, "Relay phase");

        let (window, partial) = match (range, handle.resolved_size) {
            (Some(range), Some(size)) => (range.resolve(size)?, true),
            (Some(_), None) => {
                tracing::debug!(
                    locator = %handle.locator,
                    "Asset size unknown after probe, ignoring Range and serving full body"
                );
                (ByteWindow::FULL, false)
            }
            (None, _) => (ByteWindow::FULL, false),
        };

        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let preflight = match self.settings.preflight {
            PreflightMode::Peek => self.peek(&handle, window, cancel.clone()).await,
            PreflightMode::Prefix => self.prefix(&handle, window, cancel.clone()).await,
        };

        let (head, stream) = match preflight {
            Ok(ready) => ready,
            Err(err) => {
                cancel.cancel();
                let err = preflight_failure(err);
                tracing::warn!(
                    locator = %handle.locator,
                    mode = ?self.settings.preflight,
                    error = %err,
                    "Pre-flight probe failed"
                );
                return Err(err);
            }
        };

        tracing::debug!(
            locator = %handle.locator,
            start = window.start,
            end = ?window.end,
            size = ?handle.resolved_size,
            partial,
            probe_ms = started.elapsed().as_millis() as u64,
            phase = %RelayPhase::Streaming,
            "Relay committed"
        );

        let body = RelayBody::new(
            handle.locator.clone(),
            head,
            stream,
            window.len(),
            cancel,
        );

        Ok(PreparedRelay {
            handle,
            window,
            partial,
            body,
        })
    }

    async fn with_probe_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.settings.probe_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::transient(format!(
                "pre-flight probe timed out after {}ms",
                self.settings.probe_timeout.as_millis()
            ))),
        }
    }

    /// Open the real read and wait for its first chunk.
    async fn peek(
        &self,
        handle: &AssetHandle,
        window: ByteWindow,
        cancel: CancellationToken,
    ) -> Result<(Option<Bytes>, ByteStream)> {
        self.with_probe_timeout(async {
            let mut stream = self.locator.open(handle, window, cancel).await?;
            match stream.next().await {
                Some(Ok(chunk)) => Ok((Some(chunk), stream)),
                Some(Err(err)) => Err(self.locator.classify(&err)),
                None => Ok((None, stream)),
            }
        })
        .await
    }

    /// Read a short prefix through a throwaway read, then open the real one.
    async fn prefix(
        &self,
        handle: &AssetHandle,
        window: ByteWindow,
        cancel: CancellationToken,
    ) -> Result<(Option<Bytes>, ByteStream)> {
        let head_window = prefix_window(window, self.settings.probe_bytes);
        let probe_cancel = cancel.child_token();

        let probed = self
            .with_probe_timeout(async {
                let mut stream = self
                    .locator
                    .open(handle, head_window, probe_cancel.clone())
                    .await?;
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| self.locator.classify(&e))?;
                    buf.extend_from_slice(&chunk);
                    if buf.len() as u64 >= self.settings.probe_bytes {
                        break;
                    }
                }
                Ok(buf.len())
            })
            .await;
        probe_cancel.cancel();

        let probed = probed?;
        tracing::trace!(locator = %handle.locator, probed, "Prefix probe succeeded");

        let stream = self
            .with_probe_timeout(self.locator.open(handle, window, cancel))
            .await?;
        Ok((None, stream))
    }
}

/// Pre-flight failures answer 429 for throttling and 503 for anything that
/// may clear up; credential problems keep their 500.
/// The first `probe_bytes` of `window`, never past its end.
fn prefix_window(window: ByteWindow, probe_bytes: u64) -> ByteWindow {
    let probe_end = window.start.saturating_add(probe_bytes.max(1) - 1);
    ByteWindow::bounded(
        window.start,
        window.end.map_or(probe_end, |end| end.min(probe_end)),
    )
}

fn preflight_failure(err: Error) -> Error {
    match err {
        Error::Throttled { .. }
        | Error::Unauthorized(_)
        | Error::Forbidden(_)
        | Error::Configuration(_)
        | Error::Transient(_) => err,
        other => Error::transient(other.to_string()),
    }
}

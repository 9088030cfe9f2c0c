//! HTTP `Range` header parsing.
//!
//! Parsing and resolution are split: the header is parsed up front, but range
//! math waits until the metadata probe has produced a trusted size.
//!
//! Supported forms:
//! - `bytes=0-499`
//! - `bytes=500-`
//! - `bytes=-500` (last 500 bytes)
//!
//! Multi-range and malformed headers parse to `None`, which serves the full asset.

use mediarelay_common::{ByteWindow, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// `bytes=start-` or `bytes=start-end` (inclusive).
    Span { start: u64, end: Option<u64> },
    /// `bytes=-length`
    Suffix { length: u64 },
}

impl RangeRequest {
    /// Parse a `Range` header value.
    pub fn parse(header: &str) -> Option<Self> {
        let byte_range = header.trim().strip_prefix("bytes=")?;
        if byte_range.contains(',') {
            return None;
        }

        let (start, end) = byte_range.split_once('-')?;
        let start = start.trim();
        let end = end.trim();

        match (start.is_empty(), end.is_empty()) {
            (true, false) => Some(Self::Suffix {
                length: end.parse().ok()?,
            }),
            (false, true) => Some(Self::Span {
                start: start.parse().ok()?,
                end: None,
            }),
            (false, false) => {
                let start: u64 = start.parse().ok()?;
                let end: u64 = end.parse().ok()?;
                if start > end {
                    return None;
                }
                Some(Self::Span {
                    start,
                    end: Some(end),
                })
            }
            (true, true) => None,
        }
    }

    /// Resolve against the probed asset size.
    ///
    /// The end is clamped to the last byte; a start at or past the end of the
    /// asset is [`Error::RangeNotSatisfiable`].
    pub fn resolve(&self, size: u64) -> Result<ByteWindow> {
        if size == 0 {
            return Err(Error::RangeNotSatisfiable { size });
        }
        let last = size - 1;

        match *self {
            Self::Span { start, end } => {
                if start >= size {
                    return Err(Error::RangeNotSatisfiable { size });
                }
                let end = end.map_or(last, |end| end.min(last));
                Ok(ByteWindow::bounded(start, end))
            }
            Self::Suffix { length } => {
                if length == 0 {
                    return Err(Error::RangeNotSatisfiable { size });
                }
                Ok(ByteWindow::bounded(size.saturating_sub(length), last))
            }
        }
    }
}

/// `Content-Range` value for a served window.
pub fn content_range(window: ByteWindow, size: u64) -> String {
    let end = window.end.unwrap_or(size.saturating_sub(1));
    format!("bytes {}-{}/{}", window.start, end, size)
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfiable_range(size: u64) -> String {
    format!("bytes */{}", size)
}

//! Core asset types shared by the server and the client governor.

use serde::{Deserialize, Serialize};

use crate::paths::{image_content_type, video_content_type};

/// What a stored asset is used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// A playable video, served with range semantics.
    Video,
    /// A single still image (comic page, cover, thumbnail).
    Image,
    /// A folder whose image children are the pages of a series.
    ImageFolder,
}

impl AssetKind {
    /// Stable lowercase name, used in logs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Video => "video",
            AssetKind::Image => "image",
            AssetKind::ImageFolder => "image_folder",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolvable reference to stored bytes, created per request.
///
/// Handles are never cached across requests: upstream locators are not
/// guaranteed stable across processes. `resolved_size` and `resolved_name` are
/// only populated by an explicit metadata probe, never copied from catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHandle {
    pub kind: AssetKind,
    /// Provider URL or folder-scoped path.
    pub locator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_name: Option<String>,
}

impl AssetHandle {
    /// A handle that has not been probed yet.
    pub fn unresolved(kind: AssetKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
            resolved_size: None,
            resolved_name: None,
        }
    }

    /// Record the outcome of a metadata probe.
    #[must_use]
    pub fn with_metadata(mut self, name: Option<String>, size: Option<u64>) -> Self {
        self.resolved_name = name;
        self.resolved_size = size;
        self
    }

    /// Whether a metadata probe has populated this handle.
    pub fn is_resolved(&self) -> bool {
        self.resolved_size.is_some() || self.resolved_name.is_some()
    }

    /// Best available display name: the probed name, or the last locator segment.
    pub fn display_name(&self) -> &str {
        match &self.resolved_name {
            Some(name) => name,
            None => self
                .locator
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or(&self.locator),
        }
    }

    /// Content type inferred from the name, with per-kind fallbacks.
    pub fn content_type(&self) -> &'static str {
        match self.kind {
            AssetKind::Video => video_content_type(self.display_name()),
            AssetKind::Image | AssetKind::ImageFolder => image_content_type(self.display_name()),
        }
    }
}

/// An inclusive byte window `[start, end]` within an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteWindow {
    pub start: u64,
    /// Inclusive end offset; `None` reads to the end of the asset.
    pub end: Option<u64>,
}

impl ByteWindow {
    /// The whole asset.
    pub const FULL: ByteWindow = ByteWindow {
        start: 0,
        end: None,
    };

    /// A bounded inclusive window.
    pub fn bounded(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Number of bytes in the window, if bounded.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.start) + 1)
    }

    /// Whether the window is bounded and empty (never true for valid windows).
    pub fn is_empty(&self) -> bool {
        matches!(self.end, Some(end) if end < self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_handle() {
        let handle = AssetHandle::unresolved(AssetKind::Video, "https://store/f/abc");
        assert!(!handle.is_resolved());
        assert_eq!(handle.display_name(), "abc");
        assert_eq!(handle.content_type(), "video/mp4");
    }

    #[test]
    fn test_resolved_handle_content_type() {
        let handle = AssetHandle::unresolved(AssetKind::Video, "x")
            .with_metadata(Some("movie.webm".into()), Some(10));
        assert!(handle.is_resolved());
        assert_eq!(handle.content_type(), "video/webm");

        let page = AssetHandle::unresolved(AssetKind::Image, "series/p1.png")
            .with_metadata(Some("p1.png".into()), Some(3));
        assert_eq!(page.content_type(), "image/png");
    }

    #[test]
    fn test_display_name_trailing_slash() {
        let handle = AssetHandle::unresolved(AssetKind::ImageFolder, "comics/vol1/");
        assert_eq!(handle.display_name(), "vol1");
    }

    #[test]
    fn test_byte_window_len() {
        assert_eq!(ByteWindow::bounded(0, 99).len(), Some(100));
        assert_eq!(ByteWindow::bounded(5, 5).len(), Some(1));
        assert_eq!(ByteWindow::FULL.len(), None);
        assert!(!ByteWindow::bounded(5, 5).is_empty());
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&AssetKind::ImageFolder).unwrap();
        assert_eq!(json, "\"image_folder\"");
    }
}

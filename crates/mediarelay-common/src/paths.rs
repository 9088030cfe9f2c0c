//! Name utilities for recognising assets by extension.
//!
//! Upstream entries only expose a file name, so classification is purely
//! extension based. Unrecognised extensions are not an error; callers simply
//! skip the entry.

use std::path::Path;

/// Extensions treated as playable video.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "avi", "mov", "m4v"];

/// Extensions treated as comic pages / still images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Content type used when a video extension is not recognised.
pub const DEFAULT_VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Content type used when an image extension is not recognised.
pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Lowercased extension of a file name, without the dot.
///
/// # Examples
///
/// ```
/// use mediarelay_common::paths::extension_of;
///
/// assert_eq!(extension_of("Page_01.JPG").as_deref(), Some("jpg"));
/// assert_eq!(extension_of("README"), None);
/// ```
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if a name has a playable video extension.
///
/// # Examples
///
/// ```
/// use mediarelay_common::paths::is_video_name;
///
/// assert!(is_video_name("episode.mkv"));
/// assert!(is_video_name("clip.M4V"));
/// assert!(!is_video_name("cover.jpg"));
/// ```
pub fn is_video_name(name: &str) -> bool {
    extension_of(name)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Check if a name has a recognised image extension.
///
/// # Examples
///
/// ```
/// use mediarelay_common::paths::is_image_name;
///
/// assert!(is_image_name("page10.webp"));
/// assert!(!is_image_name("notes.txt"));
/// ```
pub fn is_image_name(name: &str) -> bool {
    extension_of(name)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Infer the video content type from a file name, falling back to `video/mp4`.
pub fn video_content_type(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        _ => DEFAULT_VIDEO_CONTENT_TYPE,
    }
}

/// Infer the image content type from a file name, falling back to `image/jpeg`.
pub fn image_content_type(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => DEFAULT_IMAGE_CONTENT_TYPE,
    }
}

/// Get the list of video extensions.
#[must_use]
pub fn video_extensions() -> &'static [&'static str] {
    VIDEO_EXTENSIONS
}

/// Get the list of image extensions.
#[must_use]
pub fn image_extensions() -> &'static [&'static str] {
    IMAGE_EXTENSIONS
}

//! Typed ID wrappers for catalog records.
//!
//! Catalog ids are opaque strings assigned by the document store. The newtypes
//! keep a video id from being passed where an image series id is expected.

use serde::{Deserialize, Serialize};

/// Identifier of a video record in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for VideoId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for VideoId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an image series (comic) record in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(String);

impl SeriesId {
    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SeriesId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SeriesId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_as_str() {
        let id = VideoId::from("65f0c0ffee");
        assert_eq!(id.to_string(), "65f0c0ffee");
        assert_eq!(id.as_str(), "65f0c0ffee");

        let id = SeriesId::from(String::from("abc"));
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn test_serde_transparent() {
        let id = SeriesId::from("series-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"series-1\"");

        let back: SeriesId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

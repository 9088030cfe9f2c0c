//! Catalog records and the lookup seam the relay consumes.
//!
//! The catalog itself is an external document store; the relay only needs
//! `find by id` and a storage locator. Records written by older importers use
//! `title`/`megaVideoLink`/`megaFolderLink`; both shapes deserialize into the
//! same struct and are normalized by the accessor methods.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use mediarelay_common::{Error, Result, SeriesId, VideoId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    #[serde(alias = "_id")]
    pub id: VideoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mega_video_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: f64,
}

impl VideoRecord {
    pub fn new(id: impl Into<VideoId>, name: &str, link: &str) -> Self {
        Self {
            id: id.into(),
            name: Some(name.to_string()),
            title: None,
            link: Some(link.to_string()),
            mega_video_link: None,
            thumbnail: None,
            duration: 0.0,
        }
    }

    /// The upstream locator, preferring the current field over the legacy one.
    pub fn storage_locator(&self) -> Result<&str> {
        non_empty(&self.link)
            .or_else(|| non_empty(&self.mega_video_link))
            .ok_or_else(|| Error::invalid_input(format!("video {} has no storage link", self.id)))
    }

    pub fn display_name(&self) -> &str {
        non_empty(&self.name)
            .or_else(|| non_empty(&self.title))
            .unwrap_or_else(|| self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRecord {
    #[serde(alias = "_id")]
    pub id: SeriesId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mega_folder_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SeriesRecord {
    pub fn new(id: impl Into<SeriesId>, name: &str, folder_link: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            folder_link: Some(folder_link.to_string()),
            mega_folder_link: None,
            description: None,
        }
    }

    /// The upstream folder locator, preferring the current field over the legacy one.
    pub fn storage_locator(&self) -> Result<&str> {
        non_empty(&self.folder_link)
            .or_else(|| non_empty(&self.mega_folder_link))
            .ok_or_else(|| Error::invalid_input(format!("series {} has no folder link", self.id)))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Read-only catalog lookups.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn find_video(&self, id: &VideoId) -> Result<Option<VideoRecord>>;

    async fn find_series(&self, id: &SeriesId) -> Result<Option<SeriesRecord>>;
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    videos: Vec<VideoRecord>,
    #[serde(default, alias = "comics")]
    series: Vec<SeriesRecord>,
}

/// In-memory catalog, optionally loaded from a JSON export.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    videos: RwLock<HashMap<VideoId, VideoRecord>>,
    series: RwLock<HashMap<SeriesId, SeriesRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(videos: Vec<VideoRecord>, series: Vec<SeriesRecord>) -> Self {
        let catalog = Self::new();
        for video in videos {
            catalog.insert_video(video);
        }
        for record in series {
            catalog.insert_series(record);
        }
        catalog
    }

    /// Load `{ "videos": [...], "series": [...] }` from disk.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {:?}", path))?;
        let file: CatalogFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file: {:?}", path))?;

        tracing::info!(
            videos = file.videos.len(),
            series = file.series.len(),
            "Loaded catalog from {:?}",
            path
        );
        Ok(Self::from_records(file.videos, file.series))
    }

    pub fn insert_video(&self, record: VideoRecord) {
        self.videos.write().insert(record.id.clone(), record);
    }

    pub fn insert_series(&self, record: SeriesRecord) {
        self.series.write().insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.videos.read().len() + self.series.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn find_video(&self, id: &VideoId) -> Result<Option<VideoRecord>> {
        Ok(self.videos.read().get(id).cloned())
    }

    async fn find_series(&self, id: &SeriesId) -> Result<Option<SeriesRecord>> {
        Ok(self.series.read().get(id).cloned())
    }
}

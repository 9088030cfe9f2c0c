//! Filesystem-backed provider.
//!
//! Locators are `/`-separated paths relative to a root directory, e.g.
//! `videos/trailer.mp4` or `comics/vol1`. Mostly useful for local development
//! and for mirroring a drive export onto disk.

use std::io::{self, SeekFrom};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::TryStreamExt;
use mediarelay_common::{ByteWindow, UpstreamError};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::{cancellable, AssetProvider, ByteStream, RemoteNode};

const READ_CHUNK: usize = 64 * 1024;

pub struct FsProvider {
    root: PathBuf,
}

impl FsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, locator: &str) -> Result<PathBuf, UpstreamError> {
        let relative = Path::new(locator.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(UpstreamError::new(format!(
                        "locator escapes provider root: {locator}"
                    ))
                    .with_code("EACCES"))
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(err: io::Error, locator: &str) -> UpstreamError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => Some("ENOENT"),
        io::ErrorKind::PermissionDenied => Some("EACCES"),
        io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Some("EAGAIN"),
        _ => None,
    };
    let upstream = UpstreamError::new(format!("{locator}: {err}"));
    match code {
        Some(code) => upstream.with_code(code),
        None => upstream,
    }
}

fn child_locator(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn file_name(locator: &str) -> String {
    locator
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(locator)
        .to_string()
}

#[async_trait]
impl AssetProvider for FsProvider {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn resolve(&self, locator: &str) -> Result<RemoteNode, UpstreamError> {
        let path = self.full_path(locator)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(e, locator))?;

        Ok(RemoteNode {
            locator: locator.to_string(),
            name: file_name(locator),
            size: metadata.is_file().then(|| metadata.len()),
            is_directory: metadata.is_dir(),
        })
    }

    async fn children(&self, folder: &RemoteNode) -> Result<Vec<RemoteNode>, UpstreamError> {
        let path = self.full_path(&folder.locator)?;
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| io_error(e, &folder.locator))?;

        let mut nodes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(e, &folder.locator))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::debug!(entry = %name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            nodes.push(RemoteNode {
                locator: child_locator(&folder.locator, &name),
                size: metadata.is_file().then(|| metadata.len()),
                is_directory: metadata.is_dir(),
                name,
            });
        }

        Ok(nodes)
    }

    async fn open_range(
        &self,
        node: &RemoteNode,
        window: ByteWindow,
        cancel: CancellationToken,
    ) -> Result<ByteStream, UpstreamError> {
        let path = self.full_path(&node.locator)?;
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| io_error(e, &node.locator))?;

        if window.start > 0 {
            file.seek(SeekFrom::Start(window.start))
                .await
                .map_err(|e| io_error(e, &node.locator))?;
        }

        let limit = window.len().unwrap_or(u64::MAX);
        let locator = node.locator.clone();
        let stream = ReaderStream::with_capacity(file.take(limit), READ_CHUNK)
            .map_err(move |e| io_error(e, &locator));

        Ok(cancellable(stream, cancel))
    }
}

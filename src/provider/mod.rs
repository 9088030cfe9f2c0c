//! Upstream asset providers.
//!
//! A provider is the only component that talks to the storage backend. It
//! reports failures as raw [`UpstreamError`]s; callers run them through
//! [`crate::throttle::classify`] before acting on them.

use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use mediarelay_common::{AssetHandle, ByteWindow, UpstreamError};
use tokio_util::sync::CancellationToken;

use crate::config::{ProviderConfig, ProviderKind};

pub mod fs;
pub mod http;

pub use fs::FsProvider;
pub use http::HttpProvider;

/// Upstream byte stream. Dropping it releases the upstream read.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Metadata for one upstream file or folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub locator: String,
    pub name: String,
    pub size: Option<u64>,
    pub is_directory: bool,
}

impl RemoteNode {
    /// Rebuild a node from a probed handle without another metadata call.
    pub fn from_handle(handle: &AssetHandle) -> Self {
        Self {
            locator: handle.locator.clone(),
            name: handle.display_name().to_string(),
            size: handle.resolved_size,
            is_directory: false,
        }
    }
}

/// Storage backend holding the catalog's bytes.
#[async_trait]
pub trait AssetProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch metadata for a locator. Must not download asset bytes.
    async fn resolve(&self, locator: &str) -> Result<RemoteNode, UpstreamError>;

    /// List the direct children of a folder node, in provider order.
    async fn children(&self, folder: &RemoteNode) -> Result<Vec<RemoteNode>, UpstreamError>;

    /// Open a read over `window`. The stream ends as soon as `cancel` fires.
    async fn open_range(
        &self,
        node: &RemoteNode,
        window: ByteWindow,
        cancel: CancellationToken,
    ) -> Result<ByteStream, UpstreamError>;
}

/// Stop `stream` when `cancel` fires, dropping the inner upstream read.
pub fn cancellable<S>(stream: S, cancel: CancellationToken) -> ByteStream
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Send + 'static,
{
    Box::pin(stream.take_until(cancel.cancelled_owned()))
}

/// Build the provider named in the configuration.
pub fn build_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn AssetProvider>> {
    match config.kind {
        ProviderKind::Fs => {
            let root = config
                .root
                .as_ref()
                .context("provider.root is required for the fs provider")?;
            let root = shellexpand::tilde(&root.to_string_lossy()).into_owned();
            tracing::info!(root = %root, "Using filesystem provider");
            Ok(Arc::new(FsProvider::new(root)))
        }
        ProviderKind::Http => {
            let base_url = config
                .base_url
                .as_deref()
                .context("provider.base_url is required for the http provider")?;
            tracing::info!(base_url, "Using HTTP provider");
            Ok(Arc::new(HttpProvider::from_config(base_url, config)?))
        }
    }
}

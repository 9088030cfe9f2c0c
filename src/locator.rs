//! Asset Locator: turns a stored reference into a readable handle.
//!
//! Metadata calls (resolve, list) are cheap and idempotent, so they run under
//! the retry policy. Opening a byte read is not retried. Every upstream failure
//! passes through [`crate::throttle::classify`], and throttle outcomes are
//! recorded on the shared [`ThrottleState`] before being returned.

use std::sync::Arc;

use mediarelay_common::natural::natural_cmp;
use mediarelay_common::paths::is_image_name;
use mediarelay_common::{AssetHandle, AssetKind, ByteWindow, Error, Result, UpstreamError};
use tokio_util::sync::CancellationToken;

use crate::provider::{AssetProvider, ByteStream, RemoteNode};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::throttle::{self, ThrottleState};

#[derive(Clone)]
pub struct AssetLocator {
    provider: Arc<dyn AssetProvider>,
    retry: RetryPolicy,
    default_reset_secs: u64,
    throttle: Arc<ThrottleState>,
}

impl AssetLocator {
    pub fn new(
        provider: Arc<dyn AssetProvider>,
        retry: RetryPolicy,
        default_reset_secs: u64,
        throttle: Arc<ThrottleState>,
    ) -> Self {
        Self {
            provider,
            retry,
            default_reset_secs,
            throttle,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn throttle(&self) -> &Arc<ThrottleState> {
        &self.throttle
    }

    /// Translate a raw upstream failure, recording any throttle window.
    pub fn classify(&self, err: &UpstreamError) -> Error {
        let classified = throttle::classify(err, self.default_reset_secs);
        self.throttle.observe(&classified);
        classified
    }

    async fn resolve_node(&self, locator: &str) -> Result<RemoteNode> {
        retry_with_backoff(&self.retry, "resolve", move || async move {
            self.provider
                .resolve(locator)
                .await
                .map_err(|e| self.classify(&e))
        })
        .await
    }

    /// Probe metadata for `locator` without downloading its bytes.
    pub async fn resolve_handle(&self, kind: AssetKind, locator: &str) -> Result<AssetHandle> {
        let node = self.resolve_node(locator).await?;

        let wants_folder = kind == AssetKind::ImageFolder;
        if node.is_directory != wants_folder {
            return Err(Error::not_found(format!(
                "{locator} does not resolve to a {kind} asset"
            )));
        }

        tracing::debug!(
            locator,
            kind = %kind,
            name = %node.name,
            size = ?node.size,
            "Resolved asset handle"
        );

        Ok(AssetHandle::unresolved(kind, node.locator).with_metadata(Some(node.name), node.size))
    }

    /// Image pages of a folder, in reading order.
    ///
    /// Sub-folders and unrecognised extensions are skipped; the rest are sorted
    /// by numeric-aware name so `page2` precedes `page10`.
    pub async fn list_children(&self, folder_locator: &str) -> Result<Vec<AssetHandle>> {
        let folder = self
            .resolve_handle(AssetKind::ImageFolder, folder_locator)
            .await?;
        let folder_node = RemoteNode {
            is_directory: true,
            ..RemoteNode::from_handle(&folder)
        };

        let folder_node = &folder_node;
        let children = retry_with_backoff(&self.retry, "list_children", move || async move {
            self.provider
                .children(folder_node)
                .await
                .map_err(|e| self.classify(&e))
        })
        .await?;

        let total = children.len();
        let mut pages: Vec<RemoteNode> = children
            .into_iter()
            .filter(|node| !node.is_directory && is_image_name(&node.name))
            .collect();
        pages.sort_by(|a, b| natural_cmp(&a.name, &b.name));

        tracing::debug!(
            folder = folder_locator,
            entries = total,
            pages = pages.len(),
            "Listed image folder"
        );

        Ok(pages
            .into_iter()
            .map(|node| {
                AssetHandle::unresolved(AssetKind::Image, node.locator)
                    .with_metadata(Some(node.name), node.size)
            })
            .collect())
    }

    /// The 1-based page `n` of an image folder.
    pub async fn page(&self, folder_locator: &str, n: usize) -> Result<AssetHandle> {
        let pages = self.list_children(folder_locator).await?;
        let count = pages.len();
        n.checked_sub(1)
            .and_then(|index| pages.into_iter().nth(index))
            .ok_or_else(|| {
                Error::not_found(format!("page {n} of {folder_locator} ({count} pages)"))
            })
    }

    /// Open a read over `window`. Not retried.
    pub async fn open(
        &self,
        handle: &AssetHandle,
        window: ByteWindow,
        cancel: CancellationToken,
    ) -> Result<ByteStream> {
        self.provider
            .open_range(&RemoteNode::from_handle(handle), window, cancel)
            .await
            .map_err(|e| self.classify(&e))
    }
}

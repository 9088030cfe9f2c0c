//! Shared test harness for integration tests.
//!
//! Provides [`ScriptedProvider`], an in-process upstream whose failures,
//! stalls, and open readers can be scripted and observed, and [`TestHarness`],
//! which wires it into a full [`AppContext`] around a [`MemoryCatalog`].

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use bytes::Bytes;
use futures::{stream, StreamExt};
use http_body_util::BodyExt;
use mediarelay::catalog::{MemoryCatalog, SeriesRecord, VideoRecord};
use mediarelay::config::Config;
use mediarelay::provider::{cancellable, AssetProvider, ByteStream, RemoteNode};
use mediarelay::server::{create_router, AppContext};
use mediarelay_common::{ByteWindow, UpstreamError};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Where a scripted failure is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Children,
    Open,
    /// The read opens, then its first item is the error.
    FirstChunk,
}

enum Entry {
    File(Bytes),
    Folder(Vec<String>),
}

/// Upstream double. Locators are plain keys; folder children are `folder/name`.
pub struct ScriptedProvider {
    entries: Mutex<HashMap<String, Entry>>,
    failures: Mutex<HashMap<(Stage, String), UpstreamError>>,
    stall_open: Mutex<HashSet<String>>,
    stall_after_first_chunk: Mutex<HashSet<String>>,
    chunk_size: usize,
    active_readers: Arc<AtomicUsize>,
    opens: AtomicUsize,
    resolves: AtomicUsize,
}

struct ReaderGuard(Arc<AtomicUsize>);

impl ReaderGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            stall_open: Mutex::new(HashSet::new()),
            stall_after_first_chunk: Mutex::new(HashSet::new()),
            chunk_size: 256,
            active_readers: Arc::new(AtomicUsize::new(0)),
            opens: AtomicUsize::new(0),
            resolves: AtomicUsize::new(0),
        }
    }

    pub fn add_file(&self, locator: &str, data: impl Into<Bytes>) {
        self.entries
            .lock()
            .insert(locator.to_string(), Entry::File(data.into()));
    }

    /// Add a folder. Names ending in `/` are listed as subdirectories.
    pub fn add_folder(&self, locator: &str, children: &[&str]) {
        self.entries.lock().insert(
            locator.to_string(),
            Entry::Folder(children.iter().map(|c| c.to_string()).collect()),
        );
    }

    /// Add a folder whose image children all exist with small bodies.
    pub fn add_series_folder(&self, locator: &str, pages: &[&str]) {
        self.add_folder(locator, pages);
        for page in pages {
            if !page.ends_with('/') {
                self.add_file(&format!("{locator}/{page}"), page.as_bytes().to_vec());
            }
        }
    }

    pub fn fail(&self, stage: Stage, locator: &str, err: UpstreamError) {
        self.failures
            .lock()
            .insert((stage, locator.to_string()), err);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// `open_range` for `locator` never completes.
    pub fn stall_open(&self, locator: &str) {
        self.stall_open.lock().insert(locator.to_string());
    }

    /// The read yields one chunk and then waits until cancelled.
    pub fn stall_after_first_chunk(&self, locator: &str) {
        self.stall_after_first_chunk
            .lock()
            .insert(locator.to_string());
    }

    pub fn active_readers(&self) -> usize {
        self.active_readers.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    fn failure(&self, stage: Stage, locator: &str) -> Option<UpstreamError> {
        self.failures
            .lock()
            .get(&(stage, locator.to_string()))
            .cloned()
    }

    fn node(&self, locator: &str) -> Option<RemoteNode> {
        let entries = self.entries.lock();
        let name = locator.rsplit('/').next().unwrap_or(locator).to_string();
        entries.get(locator).map(|entry| match entry {
            Entry::File(data) => RemoteNode {
                locator: locator.to_string(),
                name,
                size: Some(data.len() as u64),
                is_directory: false,
            },
            Entry::Folder(_) => RemoteNode {
                locator: locator.to_string(),
                name,
                size: None,
                is_directory: true,
            },
        })
    }
}

fn missing(locator: &str) -> UpstreamError {
    UpstreamError::new(format!("No such file: {locator}")).with_code("ENOENT")
}

#[async_trait]
impl AssetProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn resolve(&self, locator: &str) -> Result<RemoteNode, UpstreamError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure(Stage::Resolve, locator) {
            return Err(err);
        }
        self.node(locator).ok_or_else(|| missing(locator))
    }

    async fn children(&self, folder: &RemoteNode) -> Result<Vec<RemoteNode>, UpstreamError> {
        if let Some(err) = self.failure(Stage::Children, &folder.locator) {
            return Err(err);
        }
        let names = match self.entries.lock().get(&folder.locator) {
            Some(Entry::Folder(names)) => names.clone(),
            _ => return Err(missing(&folder.locator)),
        };

        Ok(names
            .into_iter()
            .map(|name| {
                if let Some(dir) = name.strip_suffix('/') {
                    RemoteNode {
                        locator: format!("{}/{dir}", folder.locator),
                        name: dir.to_string(),
                        size: None,
                        is_directory: true,
                    }
                } else {
                    let locator = format!("{}/{name}", folder.locator);
                    let size = self.node(&locator).and_then(|n| n.size);
                    RemoteNode {
                        locator,
                        name,
                        size,
                        is_directory: false,
                    }
                }
            })
            .collect())
    }

    async fn open_range(
        &self,
        node: &RemoteNode,
        window: ByteWindow,
        cancel: CancellationToken,
    ) -> Result<ByteStream, UpstreamError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure(Stage::Open, &node.locator) {
            return Err(err);
        }
        if self.stall_open.lock().contains(&node.locator) {
            cancel.cancelled().await;
            return Err(UpstreamError::new("read cancelled"));
        }

        let data = match self.entries.lock().get(&node.locator) {
            Some(Entry::File(data)) => data.clone(),
            _ => return Err(missing(&node.locator)),
        };

        let guard = ReaderGuard::new(&self.active_readers);

        if let Some(err) = self.failure(Stage::FirstChunk, &node.locator) {
            let items = stream::iter(vec![Err(err)]).map(move |item| {
                let _reader = &guard;
                item
            });
            return Ok(cancellable(items, cancel));
        }

        let len = data.len() as u64;
        let start = window.start.min(len) as usize;
        let end = window
            .end
            .map_or(len, |end| (end + 1).min(len)) as usize;
        let slice = data.slice(start..end);

        let chunks: Vec<Result<Bytes, UpstreamError>> = slice
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        if self.stall_after_first_chunk.lock().contains(&node.locator) {
            let first: Vec<_> = chunks.into_iter().take(1).collect();
            let items = stream::iter(first)
                .chain(stream::pending())
                .map(move |item| {
                    let _reader = &guard;
                    item
                });
            return Ok(cancellable(items, cancel));
        }

        let items = stream::iter(chunks).map(move |item| {
            let _reader = &guard;
            item
        });
        Ok(cancellable(items, cancel))
    }
}

/// Deterministic test payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Defaults with fast failure: one attempt, short probe timeout.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.max_attempts = 1;
    config.relay.probe_timeout_ms = 200;
    config
}

pub struct TestHarness {
    pub ctx: AppContext,
    pub provider: Arc<ScriptedProvider>,
    pub catalog: Arc<MemoryCatalog>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let provider = Arc::new(ScriptedProvider::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let ctx = AppContext::new(config, catalog.clone(), provider.clone());
        Self {
            ctx,
            provider,
            catalog,
        }
    }

    pub fn add_video(&self, id: &str, locator: &str, data: impl Into<Bytes>) {
        self.provider.add_file(locator, data);
        self.catalog
            .insert_video(VideoRecord::new(id, &format!("Video {id}"), locator));
    }

    pub fn add_series(&self, id: &str, folder: &str, pages: &[&str]) {
        self.provider.add_series_folder(folder, pages);
        self.catalog
            .insert_series(SeriesRecord::new(id, &format!("Series {id}"), folder));
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn get_range(&self, uri: &str, range: &str) -> Response<Body> {
        self.router()
            .oneshot(
                Request::get(uri)
                    .header(header::RANGE, range)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Serve the router on a random local port.
    pub async fn serve(&self) -> SocketAddr {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header_str<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

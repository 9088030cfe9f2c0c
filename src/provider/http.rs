//! HTTP-backed provider.
//!
//! Talks to a drive gateway that exposes files over plain HTTP:
//!
//! - `HEAD {url}` answers metadata (`Content-Length`, `Content-Disposition`,
//!   `Content-Type`). A folder answers with `Content-Type: application/json`.
//! - `GET {folder}` returns a manifest:
//!   `{ "entries": [{ "name", "url", "size", "directory" }] }`.
//! - `GET {file}` with a `Range` header returns the requested window.
//!
//! Locators are either absolute URLs or paths relative to `base_url`.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mediarelay_common::{ByteWindow, UpstreamError};
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{cancellable, AssetProvider, ByteStream, RemoteNode};
use crate::config::ProviderConfig;

/// Connection timeout for gateway requests
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    url: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    directory: bool,
}

pub struct HttpProvider {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
    metadata_timeout: Duration,
}

impl HttpProvider {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::from_config(base_url, &ProviderConfig::default())
    }

    pub fn from_config(base_url: &str, config: &ProviderConfig) -> anyhow::Result<Self> {
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized)
            .map_err(|e| anyhow::anyhow!("Invalid provider base_url {base_url}: {e}"))?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
            metadata_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn url_for(&self, locator: &str) -> Result<Url, UpstreamError> {
        if let Ok(url) = Url::parse(locator) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url);
            }
        }
        self.base_url
            .join(locator.trim_start_matches('/'))
            .map_err(|e| UpstreamError::new(format!("invalid locator {locator}: {e}")))
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, locator: &str) -> Result<Response, UpstreamError> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(|e| transport_error(e, locator))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(status_error(status, response.headers(), locator))
        }
    }
}

fn transport_error(err: reqwest::Error, locator: &str) -> UpstreamError {
    let upstream = UpstreamError::new(format!("{locator}: {err}"));
    if err.is_timeout() {
        upstream.with_code("ETIMEDOUT")
    } else if err.is_connect() {
        upstream.with_code("ECONNREFUSED")
    } else {
        upstream
    }
}

fn header_secs(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn status_error(status: StatusCode, headers: &HeaderMap, locator: &str) -> UpstreamError {
    let code = status.as_u16().to_string();
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 509 {
        let err = UpstreamError::new(format!("Bandwidth limit reached for {locator}")).with_code(code);
        let reset = header_secs(headers, header::RETRY_AFTER.as_str())
            .or_else(|| header_secs(headers, crate::throttle::RATE_LIMIT_RESET_HEADER));
        return match reset {
            Some(secs) => err.with_time_limit(secs),
            None => err,
        };
    }
    UpstreamError::new(format!("{locator}: upstream responded {status}")).with_code(code)
}

/// Extract `filename="..."` from a `Content-Disposition` value.
fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|part| {
        let part = part.trim();
        let name = part.strip_prefix("filename=")?;
        let name = name.trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

fn url_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default()
        .to_string()
}

fn range_header(window: ByteWindow) -> Option<String> {
    match window.end {
        Some(end) => Some(format!("bytes={}-{}", window.start, end)),
        None if window.start > 0 => Some(format!("bytes={}-", window.start)),
        None => None,
    }
}

#[async_trait]
impl AssetProvider for HttpProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn resolve(&self, locator: &str) -> Result<RemoteNode, UpstreamError> {
        let url = self.url_for(locator)?;
        let response = self
            .send(
                self.client.head(url.clone()).timeout(self.metadata_timeout),
                locator,
            )
            .await?;
        let headers = response.headers();

        let is_directory = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        let name = headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| url_file_name(&url));
        let size = if is_directory {
            None
        } else {
            header_secs(headers, header::CONTENT_LENGTH.as_str())
        };

        Ok(RemoteNode {
            locator: locator.to_string(),
            name,
            size,
            is_directory,
        })
    }

    async fn children(&self, folder: &RemoteNode) -> Result<Vec<RemoteNode>, UpstreamError> {
        let url = self.url_for(&folder.locator)?;
        let response = self
            .send(
                self.client.get(url.clone()).timeout(self.metadata_timeout),
                &folder.locator,
            )
            .await?;
        let manifest: Manifest = response.json().await.map_err(|e| {
            UpstreamError::new(format!("{}: invalid folder manifest: {e}", folder.locator))
        })?;

        let nodes = manifest
            .entries
            .into_iter()
            .map(|entry| {
                let locator = url
                    .join(&entry.url)
                    .map(String::from)
                    .unwrap_or(entry.url);
                RemoteNode {
                    locator,
                    name: entry.name,
                    size: entry.size,
                    is_directory: entry.directory,
                }
            })
            .collect();

        Ok(nodes)
    }

    async fn open_range(
        &self,
        node: &RemoteNode,
        window: ByteWindow,
        cancel: CancellationToken,
    ) -> Result<ByteStream, UpstreamError> {
        let url = self.url_for(&node.locator)?;
        let mut builder = self.client.get(url);
        if let Some(range) = range_header(window) {
            builder = builder.header(header::RANGE, range);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(UpstreamError::new(format!("{}: read cancelled", node.locator)));
            }
            response = self.send(builder, &node.locator) => response?,
        };

        if window.start > 0 && response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(UpstreamError::new(format!(
                "{}: upstream ignored range request",
                node.locator
            )));
        }

        let locator = node.locator.clone();
        let stream = response
            .bytes_stream()
            .map_err(move |e| transport_error(e, &locator));

        Ok(cancellable(stream, cancel))
    }
}

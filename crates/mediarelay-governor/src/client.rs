//! `reqwest` client that routes every fetch through a [`Governor`].
//!
//! Order of checks for a URL: positive cache, failure memo, throttle mirror,
//! in-flight dedupe, then the bounded queue for provider-backed URLs only.
//! Redirects are not followed automatically: the relay answers image failures
//! with a redirect to a placeholder, and that redirect may carry the reset
//! hint the mirror needs.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{self, HeaderMap};
use reqwest::{redirect, Client, Response, StatusCode};
use serde::Deserialize;

use crate::error::GovernorError;
use crate::mirror::{
    parse_reset_header, DEFAULT_RESET_SECS, MAX_RESET_SECS, RATE_LIMIT_RESET_HEADER,
};
use crate::Governor;

/// URL fragments identifying relay endpoints backed by the upstream provider.
pub const DEFAULT_PROVIDER_MARKERS: &[&str] = &["/stream", "/cover"];

/// A successfully fetched body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub body: Bytes,
    /// The server redirected to a placeholder instead of serving the asset.
    pub fallback: bool,
    pub from_cache: bool,
}

type InFlight = Shared<BoxFuture<'static, Result<Fetched, GovernorError>>>;

#[derive(Clone)]
pub struct GovernedClient {
    http: Client,
    governor: Governor,
    provider_markers: Arc<Vec<String>>,
    in_flight: Arc<DashMap<String, InFlight>>,
}

impl GovernedClient {
    pub fn new(governor: Governor) -> Result<Self, GovernorError> {
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(concat!("mediarelay-governor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http(governor, http))
    }

    /// Use a preconfigured client. It must not follow redirects itself.
    pub fn with_http(governor: Governor, http: Client) -> Self {
        Self {
            http,
            governor,
            provider_markers: Arc::new(
                DEFAULT_PROVIDER_MARKERS
                    .iter()
                    .map(|m| m.to_string())
                    .collect(),
            ),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn with_provider_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provider_markers = Arc::new(markers.into_iter().map(Into::into).collect());
        self
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// Whether `url` goes through the bounded queue.
    pub fn is_provider_url(&self, url: &str) -> bool {
        self.provider_markers.iter().any(|m| url.contains(m.as_str()))
    }

    /// Fetch `url`, honouring cache, failure memo, and the rate-limit mirror.
    pub async fn fetch(&self, url: &str) -> Result<Fetched, GovernorError> {
        if let Some(body) = self.governor.get(url) {
            tracing::trace!(url, "Served from cache");
            return Ok(Fetched {
                body,
                fallback: false,
                from_cache: true,
            });
        }

        if self.governor.is_recently_failed(url) {
            return Err(GovernorError::RecentlyFailed {
                key: url.to_string(),
            });
        }

        let limit = self.governor.is_rate_limited();
        if limit.limited {
            return Err(GovernorError::RateLimited {
                remaining_secs: limit.remaining_secs,
            });
        }

        let shared = match self.in_flight.entry(url.to_string()) {
            Entry::Occupied(entry) => {
                tracing::trace!(url, "Joining in-flight request");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let fut = self.clone().dispatch(url.to_string()).boxed().shared();
                entry.insert(fut.clone());
                fut
            }
        };

        shared.await
    }

    async fn dispatch(self, url: String) -> Result<Fetched, GovernorError> {
        let result = if self.is_provider_url(&url) {
            self.governor.enqueue(|| self.request(&url)).await
        } else {
            self.request(&url).await
        };

        match &result {
            Ok(fetched) if !fetched.fallback => {
                self.governor.set(&url, fetched.body.clone());
            }
            Ok(_) => {}
            Err(err) if err.is_memoised() => {
                tracing::debug!(url, error = %err, "Fetch failed");
                self.governor.mark_request_failed(&url);
            }
            Err(_) => {}
        }

        self.in_flight.remove(&url);
        result
    }

    async fn request(&self, url: &str) -> Result<Fetched, GovernorError> {
        let response = self.http.get(url).send().await?;

        let (response, fallback) = if response.status().is_redirection() {
            (self.follow_fallback(response).await?, true)
        } else {
            (response, false)
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let secs = rate_limit_hint(response).await;
            self.governor.set_rate_limited(secs);
            return Err(GovernorError::RateLimited {
                remaining_secs: secs,
            });
        }
        if !status.is_success() {
            return Err(GovernorError::Status {
                status: status.as_u16(),
            });
        }

        Ok(Fetched {
            body: response.bytes().await?,
            fallback,
            from_cache: false,
        })
    }

    /// Learn any reset hint from a placeholder redirect, then follow it once.
    async fn follow_fallback(&self, response: Response) -> Result<Response, GovernorError> {
        if let Some(secs) = reset_hint(response.headers()) {
            self.governor.set_rate_limited(secs);
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(GovernorError::Status {
                status: response.status().as_u16(),
            })?;
        let target = response
            .url()
            .join(location)
            .map_err(|e| GovernorError::Request(e.to_string()))?;

        tracing::debug!(%target, "Following placeholder redirect");
        Ok(self.http.get(target).send().await?)
    }
}

fn reset_hint(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RATE_LIMIT_RESET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_reset_header)
}

/// Reset window from a 429: header first, then the JSON `timeLimit`.
async fn rate_limit_hint(response: Response) -> u64 {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RateLimitBody {
        time_limit: Option<u64>,
    }

    if let Some(secs) = reset_hint(response.headers()) {
        return secs;
    }
    match response.json::<RateLimitBody>().await {
        Ok(RateLimitBody {
            time_limit: Some(secs),
        }) => secs.min(MAX_RESET_SECS),
        _ => DEFAULT_RESET_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_markers() {
        let client = GovernedClient::new(Governor::default()).unwrap();
        assert!(client.is_provider_url("http://h/assets/video/1/stream"));
        assert!(client.is_provider_url("http://h/assets/image-series/1/cover"));
        assert!(!client.is_provider_url("http://h/assets/image-series/1/pages"));

        let client = client.with_provider_markers(["/pages"]);
        assert!(client.is_provider_url("http://h/assets/image-series/1/pages"));
        assert!(!client.is_provider_url("http://h/assets/image-series/1/cover"));
    }

    #[test]
    fn test_reset_hint() {
        let mut headers = HeaderMap::new();
        assert_eq!(reset_hint(&headers), None);
        headers.insert(RATE_LIMIT_RESET_HEADER, "75".parse().unwrap());
        assert_eq!(reset_hint(&headers), Some(75));
    }
}

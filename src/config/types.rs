use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which storage backend holds the catalog's bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Locators are paths under `root`.
    #[default]
    Fs,
    /// Locators are URLs (or paths under `base_url`) on a drive gateway.
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Root directory for the `fs` provider (`~` is expanded).
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Gateway base URL for the `http` provider.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token sent to the gateway, if it requires one.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Timeout for metadata and folder listing calls (not byte reads).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_request_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("mediarelay/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            root: None,
            base_url: None,
            api_token: None,
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// JSON file with `videos` and `series` arrays. Empty catalog when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// How the relay confirms the upstream is readable before committing headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreflightMode {
    /// Open the real read and wait for its first chunk; the chunk is replayed.
    #[default]
    Peek,
    /// Read `probe_bytes` through a separate short read, then open the real one.
    Prefix,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub preflight: PreflightMode,

    #[serde(default = "default_probe_bytes")]
    pub probe_bytes: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Redirect target for a failed comic page; `{seed}` is `{id}-{index}`.
    #[serde(default = "default_page_placeholder")]
    pub page_placeholder: String,

    /// Redirect target for a failed cover; `{seed}` is the series id.
    #[serde(default = "default_cover_placeholder")]
    pub cover_placeholder: String,

    /// Number of placeholder pages listed when the folder cannot be read.
    #[serde(default = "default_page_placeholder_count")]
    pub page_placeholder_count: usize,

    #[serde(default = "default_image_max_age")]
    pub image_max_age_secs: u64,
}

/// Upper bound accepted for `relay.probe_bytes`.
pub const MAX_PROBE_BYTES: u64 = 1024 * 1024;

fn default_probe_bytes() -> u64 {
    1024
}
fn default_probe_timeout_ms() -> u64 {
    5000
}
fn default_page_placeholder() -> String {
    "https://picsum.photos/seed/{seed}/800/1200".to_string()
}
fn default_cover_placeholder() -> String {
    "https://picsum.photos/seed/{seed}/400/600".to_string()
}
fn default_page_placeholder_count() -> usize {
    15
}
fn default_image_max_age() -> u64 {
    86400
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            preflight: PreflightMode::default(),
            probe_bytes: default_probe_bytes(),
            probe_timeout_ms: default_probe_timeout_ms(),
            page_placeholder: default_page_placeholder(),
            cover_placeholder: default_cover_placeholder(),
            page_placeholder_count: default_page_placeholder_count(),
            image_max_age_secs: default_image_max_age(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_max_jitter_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThrottleConfig {
    /// Reset hint used when the upstream reports a throttle without a window.
    #[serde(default = "default_reset_secs")]
    pub default_reset_secs: u64,

    /// Answer 429 from the recorded window without contacting the upstream.
    #[serde(default = "default_short_circuit")]
    pub short_circuit: bool,
}

fn default_reset_secs() -> u64 {
    3600
}
fn default_short_circuit() -> bool {
    true
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default_reset_secs: default_reset_secs(),
            short_circuit: default_short_circuit(),
        }
    }
}

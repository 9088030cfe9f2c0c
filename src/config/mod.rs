mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./mediarelay.toml",
        "./config.toml",
        "~/.config/mediarelay/config.toml",
        "/etc/mediarelay/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    match config.provider.kind {
        ProviderKind::Fs => {
            let Some(root) = &config.provider.root else {
                anyhow::bail!("provider.root is required when provider.kind = \"fs\"");
            };
            let expanded = shellexpand::tilde(&root.to_string_lossy()).into_owned();
            if !Path::new(&expanded).exists() {
                tracing::warn!("Provider root does not exist: {}", expanded);
            }
        }
        ProviderKind::Http => match config.provider.base_url.as_deref() {
            None | Some("") => {
                anyhow::bail!("provider.base_url is required when provider.kind = \"http\"")
            }
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                anyhow::bail!("provider.base_url must be an http(s) URL: {}", url)
            }
            Some(_) => {}
        },
    }

    if config.relay.probe_bytes == 0 {
        anyhow::bail!("relay.probe_bytes must be greater than 0");
    }

    if config.relay.probe_bytes > MAX_PROBE_BYTES {
        anyhow::bail!(
            "relay.probe_bytes must be at most {} (got {})",
            MAX_PROBE_BYTES,
            config.relay.probe_bytes
        );
    }

    if config.relay.probe_timeout_ms == 0 {
        anyhow::bail!("relay.probe_timeout_ms must be greater than 0");
    }

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be at least 1");
    }

    for (name, template) in [
        ("relay.page_placeholder", &config.relay.page_placeholder),
        ("relay.cover_placeholder", &config.relay.cover_placeholder),
    ] {
        if !template.contains("{seed}") {
            tracing::warn!("{} has no {{seed}} placeholder: {}", name, template);
        }
    }

    if let Some(path) = &config.catalog.path {
        if !path.exists() {
            tracing::warn!("Catalog file does not exist: {:?}", path);
        }
    }

    Ok(())
}

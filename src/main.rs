mod cli;

use mediarelay::{
    config,
    server::{self, AppContext},
};
use mediarelay_common::AssetKind;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

async fn serve(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting mediarelay");
    tracing::info!(
        provider = ?config.provider.kind,
        preflight = ?config.relay.preflight,
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let ctx = AppContext::from_config(config)?;
    server::start_server(ctx).await
}

async fn probe(
    locator: &str,
    folder: bool,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let ctx = AppContext::from_config(config)?;

    if folder {
        let pages = ctx.locator().list_children(locator).await?;
        println!("{} pages in {}", pages.len(), locator);
        for (i, page) in pages.iter().enumerate() {
            println!(
                "  {:>4}  {}  ({})",
                i + 1,
                page.display_name(),
                page.resolved_size
                    .map(|s| format!("{} bytes", s))
                    .unwrap_or_else(|| "size unknown".to_string())
            );
        }
    } else {
        let handle = ctx
            .locator()
            .resolve_handle(AssetKind::Video, locator)
            .await?;
        println!("{}", serde_json::to_string_pretty(&handle)?);
        println!("content-type: {}", handle.content_type());
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Provider: {:?}", config.provider.kind);
            println!("  Catalog: {:?}", config.catalog.path);
            println!(
                "  Pre-flight: {:?} ({} bytes, {}ms)",
                config.relay.preflight, config.relay.probe_bytes, config.relay.probe_timeout_ms
            );
            println!(
                "  Retry: {} attempts, {}ms base delay",
                config.retry.max_attempts, config.retry.base_delay_ms
            );
            println!(
                "  Throttle default reset: {}s",
                config.throttle.default_reset_secs
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediarelay=trace,mediarelay_common=debug,tower_http=debug".to_string()
        } else {
            "mediarelay=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, cli.config.as_deref()))
        }
        Commands::Probe { locator, folder } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe(&locator, folder, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediarelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

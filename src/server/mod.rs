use crate::catalog::{Catalog, MemoryCatalog};
use crate::config::Config;
use crate::locator::AssetLocator;
use crate::provider::{build_provider, AssetProvider};
use crate::relay::{Relay, RelaySettings};
use crate::retry::RetryPolicy;
use crate::throttle::ThrottleState;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod routes_images;
pub mod routes_video;

pub use error::{placeholder_redirect, rate_limit_response, AppError};

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn Catalog>,
    pub relay: Relay,
    /// Upstream throttle window shared by every request
    pub throttle: Arc<ThrottleState>,
}

impl AppContext {
    /// Wire a context around an explicit provider and catalog.
    pub fn new(config: Config, catalog: Arc<dyn Catalog>, provider: Arc<dyn AssetProvider>) -> Self {
        let throttle = Arc::new(ThrottleState::new());
        let locator = AssetLocator::new(
            provider,
            RetryPolicy::from_config(&config.retry),
            config.throttle.default_reset_secs,
            throttle.clone(),
        );
        let relay = Relay::new(locator, RelaySettings::from_config(&config.relay));

        Self {
            config: Arc::new(config),
            catalog,
            relay,
            throttle,
        }
    }

    /// Build the provider and catalog named in the configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let provider = build_provider(&config.provider)?;
        let catalog: Arc<dyn Catalog> = match &config.catalog.path {
            Some(path) => Arc::new(MemoryCatalog::from_json_file(path)?),
            None => {
                tracing::warn!("No catalog configured, every lookup will be a 404");
                Arc::new(MemoryCatalog::new())
            }
        };
        Ok(Self::new(config, catalog, provider))
    }

    pub fn locator(&self) -> &AssetLocator {
        self.relay.locator()
    }

    /// The 429 contract, if the shared window is open and short-circuiting is on.
    pub fn throttle_gate(&self) -> Option<u64> {
        if !self.config.throttle.short_circuit {
            return None;
        }
        let status = self.throttle.status();
        status.limited.then_some(status.remaining_secs)
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::RANGE, header::CONTENT_TYPE])
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::HeaderName::from_static(crate::throttle::RATE_LIMIT_RESET_HEADER),
        ]);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest(
            "/assets",
            routes_video::video_routes().merge(routes_images::image_routes()),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check(
    axum::extract::State(ctx): axum::extract::State<AppContext>,
) -> Response {
    let throttle = ctx.throttle.status();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": ctx.locator().provider_name(),
        "rateLimited": throttle.limited,
        "resetIn": throttle.remaining_secs,
    }))
    .into_response()
}

/// Start the HTTP server
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

//! Rido API Gateway
//!
//! Entry point: authenticates every inbound request before it is forwarded
//! to backend services.

use gateway_service::auth::{JwksClient, KeyCache, KeySource, RedisRevocationStore};
use gateway_service::config::Config;
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::routes::{self, AppState};
use gateway_service::tasks::start_jwks_refresher;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting API Gateway");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        jwks_url = %config.jwks_url,
        refresh_interval_secs = config.jwks_refresh_interval.as_secs(),
        public_paths = config.public_path_prefixes.len(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    info!("Connecting to revocation store...");
    let revocation_store = RedisRevocationStore::connect(&config.redis_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to revocation store: {}", e);
            e
        })?;
    info!("Revocation store connection established");

    let key_cache = Arc::new(KeyCache::new());
    let jwks_client = JwksClient::new(config.jwks_url.clone(), config.jwks_fetch_timeout);
    let key_source = Arc::new(KeySource::new(key_cache, jwks_client));

    // Until this succeeds every authenticated request is a cache miss.
    if !key_source.refresh_now().await.is_refreshed() {
        warn!("Initial key-set fetch failed; requests will be rejected until a refresh succeeds");
    }

    let cancel_token = CancellationToken::new();
    let refresher_handle = tokio::spawn(start_jwks_refresher(
        key_source.clone(),
        config.jwks_refresh_interval,
        cancel_token.clone(),
    ));

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState::new(
        config,
        key_source,
        Arc::new(revocation_store),
    ));
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("API Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    cancel_token.cancel();
    if let Err(e) = refresher_handle.await {
        warn!("Key-set refresher ended abnormally: {}", e);
    }

    info!("API Gateway shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (GATEWAY_DRAIN_SECONDS=0)");
    }
}

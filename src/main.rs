use std::sync::Arc;

use axum::routing::any;
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subsoxy::config::{Cli, Config};
use subsoxy::db::spawn_health_check;
use subsoxy::error::ProxyError;
use subsoxy::proxy::proxy_handler;
use subsoxy::state::AppState;
use subsoxy::sync::spawn_sync_loop;

#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;
    tracing::info!(port = config.proxy_port, upstream = %config.upstream_url, "starting");

    let state = AppState::new(&config)?;
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    if config.pool.health_check {
        let pool = Arc::new(state.db_pool.clone());
        tokio::spawn(spawn_health_check(pool, std::time::Duration::from_secs(30), shutdown_tx.subscribe()));
    }
    tokio::spawn(spawn_sync_loop(state.clone(), config.sync_interval, shutdown_tx.subscribe()));

    let app = Router::new()
        .route("/rest/{*path}", any(proxy_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.proxy_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ProxyError::server("bind_failed", e.to_string()).with_context("addr", addr.clone()))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .map_err(|e| ProxyError::server("serve_failed", e.to_string()))?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("subsoxy=info,tower_http=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(());
}

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use cnc_monitor_server::{cli, config, db, openapi, routes, state, store};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind cnc-monitor-server listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => Err(err)
            .with_context(|| format!("failed to bind cnc-monitor-server listener on {addr}")),
    }
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::MonitorConfig::from_env()?;
    let pool = db::connect_lazy(&config.database_url, config.db_pool_size)?;
    let sample_store = store::PgSampleStore::new(
        pool,
        config.measurements.state.clone(),
        config.machine_lookback(),
    );
    if let Err(err) = sample_store.ensure_schema().await {
        tracing::warn!("failed to ensure sample schema exists: {err:#}");
    }

    let shutdown = CancellationToken::new();
    let state = state::AppState {
        config: config.clone(),
        store: Arc::new(sample_store),
        shutdown: shutdown.clone(),
    };

    let app = routes::router(state).layer(cors_layer(&config.cors_origins)?);
    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(addr = %addr, "cnc-monitor-server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received");
            signal.cancel();
        })
        .await?;
    shutdown.cancel();
    Ok(())
}

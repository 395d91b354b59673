use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pricewatch_client::default_registry;
use pricewatch_db::{Database, DatabaseConfig};
use pricewatch_server::routes;
use pricewatch_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pricewatch=info".parse()?))
        .with_target(false)
        .init();

    let admin_token = std::env::var("PRICEWATCH_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    if admin_token.is_none() {
        tracing::warn!("PRICEWATCH_ADMIN_TOKEN not set, crawl endpoints are disabled");
    }

    let port: u16 = match std::env::var("PRICEWATCH_SERVER_PORT") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid PRICEWATCH_SERVER_PORT '{raw}'"))?,
        Err(_) => 3000,
    };
    let addr = format!("0.0.0.0:{port}");

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let state = Arc::new(AppState {
        db,
        admin_token,
        registry: default_registry(),
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

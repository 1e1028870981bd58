mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use huddle_api::AppStateInner;
use huddle_core::lookup::{HttpLookup, LookupRegistry};
use huddle_db::Database;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,huddle_core=debug,huddle_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = Database::open(&config.db_path)?;

    let mut lookups = LookupRegistry::new();
    match &config.lookup_url {
        Some(url) => {
            lookups.register_all(Arc::new(HttpLookup::new(url.clone(), config.chat.lookup_deadline)?));
            info!("Record lookups via {}", url);
        }
        None => warn!("HUDDLE_LOOKUP_URL not set; inline commands will degrade to text"),
    }

    let state = AppStateInner::new(db, config.jwt_secret.clone(), config.chat.clone(), lookups, config.stream);
    let dispatcher = state.dispatcher.clone();

    let app = huddle_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Huddle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Live streams never finish on their own; end them so shutdown can complete.
            dispatcher.shutdown();
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

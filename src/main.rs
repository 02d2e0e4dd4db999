use std::sync::Arc;

use mandi::ai::gemini::GeminiClient;
use mandi::api::{self, AppState};
use mandi::bus::EventBus;
use mandi::config::Config;
use mandi::store::Store;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Mandi server starting...");

    let config = Config::from_env();

    let bus = Arc::new(EventBus::new());

    info!("Initializing store at {}", config.storage_path.display());
    let store = Arc::new(Store::new(&config, bus.clone())?);

    let gemini = GeminiClient::from_config(&config);
    if gemini.is_none() {
        info!("No Gemini API key found, AI endpoints will serve mock responses.");
    }

    let state = Arc::new(AppState {
        store,
        bus,
        gemini,
        config: config.clone(),
    });
    let app = api::router(state);

    info!("Starting HTTP server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                error!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}

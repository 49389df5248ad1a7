use std::net::SocketAddr;
use std::sync::Arc;
use wellness_common::config::AppConfig;
use wellness_core::ReminderWorker;
use wellness_server::{build_router, AppState, Providers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::info!("Loaded .env from: {:?}", path),
        Err(e) => tracing::warn!("Failed to load .env file: {}. Using system environment variables.", e),
    }

    let config = AppConfig::load()?;
    if config.auth.jwt_secret.is_empty() {
        anyhow::bail!("JWT secret is required (set JWT_SECRET or WELLNESS__AUTH__JWT_SECRET)");
    }
    let key = config.get_active_key().unwrap_or_default();
    tracing::info!("AI API key loaded: {} (len={})", !key.is_empty(), key.len());

    let providers = Providers::from_config(&config);
    let state = Arc::new(AppState::new(config.clone(), providers)?);

    if config.worker.enabled {
        let worker = ReminderWorker::new(state.store.clone(), state.dispatcher.clone(), &config.worker);
        tokio::spawn(async move { worker.run().await });
    } else {
        tracing::info!("Reminder worker disabled by configuration");
    }

    let app = build_router(state);
    let addr: SocketAddr = config.bind_addr().parse()?;
    tracing::info!("HTTP API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install CTRL+C handler: {}", e);
            }
            tracing::info!("Shutdown signal received.");
        })
        .await?;

    tracing::info!("Wellness server stopped.");
    Ok(())
}

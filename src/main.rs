use std::env;

use anyhow::Context;
use tracing::info;

use ragweb_backend::core::config::{AppConfig, AppPaths};
use ragweb_backend::logging;
use ragweb_backend::server;
use ragweb_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    let _log_guard = logging::init(&paths);

    let config = AppConfig::load().context("failed to load configuration")?;
    let state = AppState::new(&config).context("failed to initialize application state")?;

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8000);
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", addr);

    axum::serve(listener, server::router(state))
        .await
        .context("server error")?;

    Ok(())
}

use std::net::SocketAddr;

use anyhow::Context;
use llmgate_app::{AppState, build_router, config::AppConfig};
use llmgate_observability::init_observability;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_observability("llmgate-app");

    let config = AppConfig::from_env().context("configuration must be valid")?;
    let state = AppState::from_config(&config);
    let app = build_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("socket address must be valid")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("listener must bind to {addr}"))?;
    info!(event = "app.listening", %addr);
    axum::serve(listener, app).await.context("server must run")?;
    Ok(())
}

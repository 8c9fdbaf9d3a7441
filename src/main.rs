use anyhow::Context;
use tokio::net::TcpListener;

use concierge_backend::config::{AppConfig, AppPaths};
use concierge_backend::{logging, server, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    logging::init(&paths);

    let config = AppConfig::load(&paths.config_path)
        .with_context(|| format!("loading {}", paths.config_path.display()))?;
    let state = AppState::initialize(config, paths).await?;

    let bind_addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    );
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    tracing::info!("listening on {}", bind_addr);

    axum::serve(listener, server::router(state))
        .await
        .context("server error")?;

    Ok(())
}

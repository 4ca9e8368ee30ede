//! Chat relay server
//!
//! Usage: `chat-server [CONFIG_FILE]`. Without an argument the usual config
//! search applies (environment, `./config.toml`, XDG and system directories).

use anyhow::{Context, Result};
use chat_relay::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("loading configuration from {}", path.to_string_lossy()))?,
        None => Config::load().context("loading configuration")?,
    };

    init_tracing(&config)?;

    let state = AppState::builder()
        .config(config.clone())
        .build()
        .await
        .context("starting pub/sub backend")?;

    tracing::info!(
        backend = %state.bus().backend(),
        topic = %config.pubsub.topic,
        "Chat relay ready"
    );

    let shutdown = state.shutdown().clone();
    Server::new(config)
        .serve(router::build(state), shutdown)
        .await?;

    Ok(())
}

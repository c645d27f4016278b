use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use brain_dump_bot::bot;
use brain_dump_bot::bridge::{self, EventLoopBridge};
use brain_dump_bot::config::BotConfig;
use brain_dump_bot::gate::{GateStatus, InitializationGate};
use brain_dump_bot::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Brain Dump Telegram Bot");

    let config = Arc::new(BotConfig::from_env()?);

    // The worker thread owns the bot, storage connection and session store;
    // start() blocks until its context is built.
    let bridge = Arc::new(EventLoopBridge::new());
    {
        let config = Arc::clone(&config);
        bridge.start(move || bot::build_context(config))?;
    }

    let gate = Arc::new(InitializationGate::new(Arc::clone(&bridge), || {
        bridge::unit(bot::initialize)
    }));

    // Preflight: try setup now so the first real update does not pay for it.
    // Failure is logged, not fatal; the gate retries on the next request.
    if let GateStatus::Failed(msg) = gate.ensure().await {
        warn!(error = %msg, "initialization preflight failed, will retry on first request");
    }

    server::run(AppState {
        bridge,
        gate,
        config,
    })
    .await
}

//! # HTTP Server Module
//!
//! Webhook front door for Telegram. Every inbound update is funnelled through
//! the initialization gate, decoded, submitted to the background worker, and
//! answered within a fixed reply budget: finished in time means `ok`, still
//! running means `accepted` (Telegram must not retry an update the worker is
//! already processing).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use teloxide::types::Update;
use tracing::{error, info, warn};

use crate::bot::{self, BotContext};
use crate::bridge::{self, EventLoopBridge, TaskOutcome};
use crate::config::BotConfig;
use crate::errors::BotError;
use crate::gate::{GateStatus, InitializationGate};

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<EventLoopBridge<BotContext>>,
    pub gate: Arc<InitializationGate<BotContext>>,
    pub config: Arc<BotConfig>,
}

/// Build the router and serve until the process exits.
pub async fn run(state: AppState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    // The bot token contains characters the router treats specially, so the
    // ingress path is matched as a parameter and compared in the handler.
    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/webhook/:token", post(webhook))
        .with_state(state);

    info!(%addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn index() -> Json<Value> {
    Json(json!({ "service": "brain-dump-bot", "status": "running" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Webhook dispatcher: gate, decode, submit, wait within the reply budget.
async fn webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: String,
) -> (StatusCode, Json<Value>) {
    if token != state.config.bot_token {
        warn!("webhook called with wrong token path");
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": "not found" })),
        );
    }

    if let GateStatus::Failed(msg) = state.gate.ensure().await {
        error!(error = %msg, "rejecting update, bot not initialized");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "error", "message": "bot not initialized" })),
        );
    }

    let update: Update = match serde_json::from_str(&body) {
        Ok(update) => update,
        Err(e) => {
            error!(error = %e, "failed to decode update payload");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": "invalid update payload" })),
            );
        }
    };

    let correlation = update.id.0.to_string();
    let unit = bridge::unit(move |ctx| bot::process_update(ctx, update));
    let handle = match state.bridge.submit(correlation.clone(), unit) {
        Ok(handle) => handle,
        Err(e) => {
            error!(correlation = %correlation, error = %e, "failed to schedule update");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": "failed to schedule update" })),
            );
        }
    };

    match handle.wait_for(state.config.reply_budget).await {
        Some(TaskOutcome::Done) => {
            let elapsed = handle.elapsed();
            if elapsed >= state.config.slow_threshold {
                warn!(correlation = %correlation, ?elapsed, "update processed slowly");
            }
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "processing_time": elapsed.as_secs_f64(),
                })),
            )
        }
        Some(TaskOutcome::Failed(msg)) => {
            let err = BotError::Processing(msg);
            error!(correlation = %correlation, error = %err, "update processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": "update processing failed" })),
            )
        }
        Some(TaskOutcome::Cancelled) => {
            let err = BotError::Cancelled;
            warn!(correlation = %correlation, error = %err, "update processing cancelled");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": "update processing cancelled" })),
            )
        }
        None => {
            // Acknowledge now so Telegram does not redeliver; the unit keeps
            // running and reports its fate through the log.
            let slow_threshold = state.config.slow_threshold;
            let logging_handle = handle.clone();
            handle.on_complete(move |outcome| {
                let elapsed = logging_handle.elapsed();
                match outcome {
                    TaskOutcome::Done if elapsed >= slow_threshold => {
                        warn!(correlation = %logging_handle.correlation(), ?elapsed, "late completion after accepted reply");
                    }
                    TaskOutcome::Done => {
                        info!(correlation = %logging_handle.correlation(), ?elapsed, "completed after accepted reply");
                    }
                    TaskOutcome::Failed(msg) => {
                        error!(correlation = %logging_handle.correlation(), error = %msg, "failed after accepted reply");
                    }
                    TaskOutcome::Cancelled => {
                        warn!(correlation = %logging_handle.correlation(), "cancelled after accepted reply");
                    }
                }
            });
            (StatusCode::OK, Json(json!({ "status": "accepted" })))
        }
    }
}

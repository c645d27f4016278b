//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules for better organization:
//! - `message_handler`: Handles commands and free-text thought capture
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards and formats messages
//!
//! Everything here runs on the background worker thread. Handlers receive the
//! worker-local [`BotContext`] and are the only code that touches the session
//! store.

pub mod callback_handler;
pub mod message_handler;
pub mod ui_builder;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, UpdateKind};
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::review_scheduler;
use crate::sessions::SessionStore;
use crate::storage::{SqliteStorage, Storage};

// Re-export main handler functions
pub use callback_handler::handle_callback;
pub use message_handler::handle_message;

/// Worker-local state shared by all handlers.
///
/// Lives behind an `Rc` on the worker thread only. The `RefCell` around the
/// session store is sound because units interleave cooperatively and no
/// handler holds a borrow across an await point.
pub struct BotContext {
    pub bot: Bot,
    pub storage: Box<dyn Storage>,
    pub sessions: RefCell<SessionStore>,
    pub config: Arc<BotConfig>,
}

/// Build the worker context. Runs on the worker thread during bridge start;
/// the storage connection opened here never leaves that thread.
pub fn build_context(config: Arc<BotConfig>) -> Result<BotContext> {
    let storage = SqliteStorage::open(&config.database_path)?;
    let bot = Bot::new(config.bot_token.clone());
    Ok(BotContext {
        bot,
        storage: Box::new(storage),
        sessions: RefCell::new(SessionStore::new()),
        config,
    })
}

/// One-time bot setup, executed through the initialization gate: register the
/// Telegram webhook and start the weekly review scheduler.
pub async fn initialize(ctx: Rc<BotContext>) -> Result<()> {
    match ctx.config.webhook_url() {
        Some(url) => {
            let url = reqwest::Url::parse(&url).context("invalid webhook URL")?;
            ctx.bot
                .delete_webhook()
                .drop_pending_updates(true)
                .await
                .context("failed to delete existing webhook")?;
            ctx.bot
                .set_webhook(url.clone())
                .drop_pending_updates(true)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                .await
                .context("failed to register webhook")?;
            info!(%url, "webhook registered");
        }
        None => {
            warn!("PUBLIC_URL not set - skipping webhook registration");
        }
    }

    if ctx.config.review.enabled {
        tokio::task::spawn_local(review_scheduler::run(Rc::clone(&ctx)));
    } else {
        info!("weekly review prompts disabled via config");
    }

    info!("bot initialized and ready");
    Ok(())
}

/// Route one inbound update to its handler. Handler failures still propagate
/// (the worker logs them with the correlation id), but the user gets a
/// generic transient-failure message first.
pub async fn process_update(ctx: Rc<BotContext>, update: Update) -> Result<()> {
    let (chat_id, result) = match update.kind {
        UpdateKind::Message(msg) => {
            let chat_id = msg.chat.id;
            (Some(chat_id), handle_message(&ctx, msg).await)
        }
        UpdateKind::CallbackQuery(q) => {
            let chat_id = q.message.as_ref().map(|m| m.chat().id);
            (chat_id, handle_callback(&ctx, q).await)
        }
        other => {
            debug!(kind = ?other, "ignoring unsupported update kind");
            return Ok(());
        }
    };
    if result.is_err() {
        if let Some(chat_id) = chat_id {
            notify_failure(&ctx, chat_id).await;
        }
    }
    result
}

async fn notify_failure(ctx: &BotContext, chat_id: teloxide::types::ChatId) {
    let text = "😵 Something went wrong on my end. Please try that again.";
    if let Err(e) = ctx.bot.send_message(chat_id, text).await {
        warn!(error = %e, "could not notify user about a processing failure");
    }
}

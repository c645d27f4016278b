//! Callback Handler module for processing inline keyboard interactions
//!
//! Callback data is a small hand-rolled token protocol (`bulk_tog_42`,
//! `review_keep_42`, ...). Tokens are parsed up front into a typed action;
//! unknown or stale tokens degrade to a polite callback answer instead of an
//! error, since buttons can outlive the session they were rendered for.

use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MessageId};
use tracing::{error, info, warn};

use crate::errors::SessionError;
use crate::sessions::{Candidate, ReviewAction, ReviewItem, ReviewStep, SelectionMode};
use crate::storage::ThoughtStatus;

use super::ui_builder;
use super::BotContext;

/// Typed form of the callback-data tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    ShowAll,
    Similar(i64),
    BulkStart { days: i64, mode: SelectionMode },
    BulkToggle(i64),
    /// Both `bulk_apply` and `bulk_delete_apply` land here; the session's own
    /// mode decides what actually happens.
    BulkApply,
    BulkCancel,
    ReviewStart,
    ReviewLater,
    ReviewDecision {
        action: ReviewAction,
        expected: Option<i64>,
    },
    ConfirmClear,
    CancelClear,
}

/// Parse one callback-data token. Unknown tokens return `None`.
pub fn parse_callback(data: &str) -> Option<CallbackAction> {
    if let Some(id) = data.strip_prefix("similar_") {
        return id.parse().ok().map(CallbackAction::Similar);
    }
    if let Some(id) = data.strip_prefix("bulk_tog_") {
        return id.parse().ok().map(CallbackAction::BulkToggle);
    }
    if let Some(id) = data.strip_prefix("review_keep_") {
        return id.parse().ok().map(|id| CallbackAction::ReviewDecision {
            action: ReviewAction::Keep,
            expected: Some(id),
        });
    }
    if let Some(id) = data.strip_prefix("review_archive_") {
        return id.parse().ok().map(|id| CallbackAction::ReviewDecision {
            action: ReviewAction::Archive,
            expected: Some(id),
        });
    }
    match data {
        "show_all" => Some(CallbackAction::ShowAll),
        "bulk_archive_today" => Some(CallbackAction::BulkStart {
            days: 1,
            mode: SelectionMode::Archive,
        }),
        "bulk_archive_week" => Some(CallbackAction::BulkStart {
            days: 7,
            mode: SelectionMode::Archive,
        }),
        "bulk_delete_today" => Some(CallbackAction::BulkStart {
            days: 1,
            mode: SelectionMode::Delete,
        }),
        "bulk_delete_week" => Some(CallbackAction::BulkStart {
            days: 7,
            mode: SelectionMode::Delete,
        }),
        "bulk_apply" | "bulk_delete_apply" => Some(CallbackAction::BulkApply),
        "bulk_cancel" => Some(CallbackAction::BulkCancel),
        "review_start" => Some(CallbackAction::ReviewStart),
        "review_later" => Some(CallbackAction::ReviewLater),
        "review_skip" => Some(CallbackAction::ReviewDecision {
            action: ReviewAction::Skip,
            expected: None,
        }),
        "review_finish" => Some(CallbackAction::ReviewDecision {
            action: ReviewAction::Finish,
            expected: None,
        }),
        "confirm_clear" => Some(CallbackAction::ConfirmClear),
        "cancel_clear" => Some(CallbackAction::CancelClear),
        _ => None,
    }
}

/// Entry point for callback query updates.
pub async fn handle_callback(ctx: &BotContext, q: CallbackQuery) -> Result<()> {
    let action = q.data.as_deref().and_then(parse_callback);
    let target = q.message.as_ref().map(|m| (m.chat().id, m.id()));

    let notice = match (action, target) {
        (Some(action), Some((chat_id, message_id))) => {
            dispatch(ctx, chat_id, message_id, action).await?
        }
        (None, _) => {
            warn!(data = ?q.data, "unparseable callback data");
            Some("That button has expired.".to_string())
        }
        // Telegram no longer hands back very old messages; nothing to edit.
        (_, None) => Some("That message is too old to update.".to_string()),
    };

    let mut answer = ctx.bot.answer_callback_query(q.id.clone());
    if let Some(text) = notice {
        answer = answer.text(text);
    }
    answer.await?;
    Ok(())
}

/// Run one action; returns an optional toast shown via the callback answer.
async fn dispatch(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
    action: CallbackAction,
) -> Result<Option<String>> {
    let user = chat_id.0;
    match action {
        CallbackAction::ShowAll => {
            let thoughts = ctx.storage.thoughts_by_status(
                user,
                ThoughtStatus::Active,
                ctx.config.list_limit * 5,
            )?;
            let text = ui_builder::thoughts_by_category(
                "📋 Recent thoughts",
                &thoughts,
                ctx.config.list_limit,
            );
            ctx.bot.edit_message_text(chat_id, message_id, text).await?;
            Ok(None)
        }
        CallbackAction::Similar(_) => {
            // TODO: surface same-category neighbours once ranking is decided
            Ok(Some("🚧 Similar search is not ready yet.".to_string()))
        }
        CallbackAction::BulkStart { days, mode } => {
            start_bulk(ctx, chat_id, message_id, days, mode).await
        }
        CallbackAction::BulkToggle(id) => toggle_bulk(ctx, chat_id, message_id, id).await,
        CallbackAction::BulkApply => apply_bulk(ctx, chat_id, message_id).await,
        CallbackAction::BulkCancel => {
            ctx.sessions.borrow_mut().cancel_bulk(user);
            ctx.bot
                .edit_message_text(chat_id, message_id, "✖ Selection cancelled.")
                .await?;
            Ok(None)
        }
        CallbackAction::ReviewStart => start_review(ctx, chat_id, message_id).await,
        CallbackAction::ReviewLater => {
            ctx.bot
                .edit_message_text(
                    chat_id,
                    message_id,
                    "👍 No rush. /weekly_review whenever you're ready.",
                )
                .await?;
            Ok(None)
        }
        CallbackAction::ReviewDecision { action, expected } => {
            decide_review(ctx, chat_id, message_id, action, expected).await
        }
        CallbackAction::ConfirmClear => {
            let count = ctx.storage.delete_all(user)?;
            {
                let mut sessions = ctx.sessions.borrow_mut();
                sessions.cancel_bulk(user);
                let _ = sessions.close_capture(user);
            }
            info!(user_id = user, count, "all thoughts cleared");
            ctx.bot
                .edit_message_text(
                    chat_id,
                    message_id,
                    format!("🗑 Deleted {count} thoughts. Fresh start."),
                )
                .await?;
            Ok(None)
        }
        CallbackAction::CancelClear => {
            ctx.bot
                .edit_message_text(chat_id, message_id, "Phew. Nothing was deleted.")
                .await?;
            Ok(None)
        }
    }
}

fn bulk_title(mode: SelectionMode) -> &'static str {
    match mode {
        SelectionMode::Archive => "📦 Archive thoughts",
        SelectionMode::Delete => "🗑 Delete thoughts",
    }
}

async fn start_bulk(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
    days: i64,
    mode: SelectionMode,
) -> Result<Option<String>> {
    let user = chat_id.0;
    let mut thoughts = ctx
        .storage
        .recent_thoughts(user, days, ThoughtStatus::Active)?;
    thoughts.truncate(ctx.config.bulk_candidate_limit);
    if thoughts.is_empty() {
        ctx.bot
            .edit_message_text(chat_id, message_id, "Nothing in that window to select.")
            .await?;
        return Ok(None);
    }
    let candidates: Vec<Candidate> = thoughts
        .into_iter()
        .map(|t| Candidate {
            id: t.id,
            text: t.text,
            category: t.category,
        })
        .collect();

    let default_category = ctx.config.default_selected_category.clone();
    let (text, keyboard) = {
        let mut sessions = ctx.sessions.borrow_mut();
        let session =
            sessions.start_bulk(user, candidates, mode, |c| c.category == default_category);
        (
            ui_builder::bulk_message(bulk_title(mode), session),
            ui_builder::bulk_keyboard(session),
        )
    };
    ctx.bot
        .edit_message_text(chat_id, message_id, text)
        .reply_markup(keyboard)
        .await?;
    Ok(None)
}

async fn toggle_bulk(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
    id: i64,
) -> Result<Option<String>> {
    let user = chat_id.0;
    let render = {
        let mut sessions = ctx.sessions.borrow_mut();
        match sessions.toggle_bulk(user, id) {
            Ok(session) => Some((
                ui_builder::bulk_message(bulk_title(session.mode), session),
                ui_builder::bulk_keyboard(session),
            )),
            Err(_) => None,
        }
    };
    match render {
        Some((text, keyboard)) => {
            ctx.bot
                .edit_message_text(chat_id, message_id, text)
                .reply_markup(keyboard)
                .await?;
            Ok(None)
        }
        None => Ok(Some("No active selection. Try /week again.".to_string())),
    }
}

async fn apply_bulk(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<Option<String>> {
    let user = chat_id.0;
    let result = ctx
        .sessions
        .borrow_mut()
        .apply_bulk(user, |mode, ids| match mode {
            SelectionMode::Archive => ctx.storage.archive_many(user, ids),
            SelectionMode::Delete => ctx.storage.delete_many(user, ids),
        });
    match result {
        Ok((count, mode)) => {
            info!(user_id = user, count, ?mode, "bulk action applied");
            ctx.bot
                .edit_message_text(
                    chat_id,
                    message_id,
                    ui_builder::bulk_applied_text(count, mode),
                )
                .await?;
            Ok(None)
        }
        Err(e) => match e.downcast_ref::<SessionError>() {
            Some(SessionError::NothingSelected) => {
                Ok(Some("Nothing selected yet. Tap a thought first.".to_string()))
            }
            Some(_) => Ok(Some("No active selection. Try /week again.".to_string())),
            None => {
                // Storage failure: session stays in place so the user can retry
                error!(user_id = user, error = %e, "bulk apply failed");
                Ok(Some("Something went wrong, please try again.".to_string()))
            }
        },
    }
}

async fn start_review(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<Option<String>> {
    let user = chat_id.0;
    if !ctx.sessions.borrow().review_active(user) {
        let thoughts = ctx.storage.recent_thoughts(user, 7, ThoughtStatus::Active)?;
        if thoughts.is_empty() {
            ctx.bot
                .edit_message_text(chat_id, message_id, "Nothing from the last 7 days to review.")
                .await?;
            return Ok(None);
        }
        let items: Vec<ReviewItem> = thoughts
            .into_iter()
            .map(|t| ReviewItem {
                id: t.id,
                text: t.text,
                category: t.category,
                created_at: t.created_at,
            })
            .collect();
        let count = ctx.sessions.borrow_mut().start_review(user, items)?;
        info!(user_id = user, count, "review walkthrough started");
    }
    let step = ctx.sessions.borrow_mut().review_current(user)?;
    render_review_step(ctx, chat_id, message_id, step).await?;
    Ok(None)
}

async fn decide_review(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
    action: ReviewAction,
    expected: Option<i64>,
) -> Result<Option<String>> {
    let user = chat_id.0;
    let result = ctx
        .sessions
        .borrow_mut()
        .review_decide(user, action, expected, |id| {
            ctx.storage
                .update_status(user, id, ThoughtStatus::Archived)
                .map(|_| ())
        });
    match result {
        Ok(step) => {
            render_review_step(ctx, chat_id, message_id, step).await?;
            Ok(None)
        }
        Err(e) => match e.downcast_ref::<SessionError>() {
            Some(_) => Ok(Some(
                "No review in progress. /weekly_review to start one.".to_string(),
            )),
            None => {
                error!(user_id = user, error = %e, "review decision failed");
                Ok(Some("Something went wrong, please try again.".to_string()))
            }
        },
    }
}

async fn render_review_step(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
    step: ReviewStep,
) -> Result<()> {
    match step {
        ReviewStep::Current(item) => {
            let (position, total) = ctx
                .sessions
                .borrow()
                .review_progress(chat_id.0)
                .unwrap_or((1, 1));
            let text = ui_builder::review_card(&item, position, total, Utc::now());
            ctx.bot
                .edit_message_text(chat_id, message_id, text)
                .reply_markup(ui_builder::review_keyboard(item.id))
                .await?;
        }
        ReviewStep::Finished(summary) => {
            ctx.bot
                .edit_message_text(chat_id, message_id, ui_builder::review_summary_text(&summary))
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bulk_tokens() {
        assert_eq!(
            parse_callback("bulk_archive_week"),
            Some(CallbackAction::BulkStart {
                days: 7,
                mode: SelectionMode::Archive
            })
        );
        assert_eq!(
            parse_callback("bulk_tog_42"),
            Some(CallbackAction::BulkToggle(42))
        );
        assert_eq!(parse_callback("bulk_apply"), Some(CallbackAction::BulkApply));
        assert_eq!(
            parse_callback("bulk_delete_apply"),
            Some(CallbackAction::BulkApply)
        );
    }

    #[test]
    fn test_parse_review_tokens() {
        assert_eq!(
            parse_callback("review_keep_7"),
            Some(CallbackAction::ReviewDecision {
                action: ReviewAction::Keep,
                expected: Some(7)
            })
        );
        assert_eq!(
            parse_callback("review_finish"),
            Some(CallbackAction::ReviewDecision {
                action: ReviewAction::Finish,
                expected: None
            })
        );
    }

    #[test]
    fn test_unknown_and_malformed_tokens() {
        assert_eq!(parse_callback("nope"), None);
        assert_eq!(parse_callback("bulk_tog_abc"), None);
        assert_eq!(parse_callback("review_keep_"), None);
    }
}

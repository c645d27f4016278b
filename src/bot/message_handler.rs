//! Message Handler module for processing incoming Telegram messages
//!
//! Commands are parsed by hand (including the `/cmd@BotName` group form) and
//! anything that is not a command is treated as a thought: appended raw while
//! a capture session is open, classified and saved otherwise.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::Message;
use tracing::{info, warn};

use crate::classifier::classify;
use crate::storage::ThoughtStatus;

use super::ui_builder;
use super::BotContext;

/// Supported slash commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Dump,
    Done,
    List,
    Topics,
    Today,
    Week,
    Archive,
    Search(String),
    WeeklyReview,
    Stats,
    Export,
    Clear,
    Unknown(String),
}

/// Parse a leading slash command, tolerating the `@BotName` suffix Telegram
/// appends in group chats. Returns `None` for plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let raw_name = parts.next().unwrap_or_default();
    let name = raw_name
        .split('@')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let args = parts.next().unwrap_or("").trim().to_string();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "dump" => Command::Dump,
        "done" => Command::Done,
        "list" => Command::List,
        "topics" => Command::Topics,
        "today" => Command::Today,
        "week" => Command::Week,
        "archive" => Command::Archive,
        "search" => Command::Search(args),
        "weekly_review" | "review" => Command::WeeklyReview,
        "stats" => Command::Stats,
        "export" => Command::Export,
        "clear" => Command::Clear,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

/// Entry point for message updates.
pub async fn handle_message(ctx: &BotContext, msg: Message) -> Result<()> {
    let Some(text) = msg.text().map(str::to_owned) else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let user = chat_id.0;
    ctx.storage.ensure_user(user, msg.chat.username())?;

    match parse_command(&text) {
        Some(Command::Start) => {
            info!(user_id = user, "new /start");
            ctx.bot.send_message(chat_id, ui_builder::WELCOME_TEXT).await?;
        }
        Some(Command::Help) => {
            ctx.bot.send_message(chat_id, ui_builder::HELP_TEXT).await?;
        }
        Some(Command::Dump) => {
            ctx.sessions.borrow_mut().start_capture(user);
            ctx.bot
                .send_message(
                    chat_id,
                    "🧺 Capture mode on. Send everything on your mind, one message at a time. /done when you're empty.",
                )
                .await?;
        }
        Some(Command::Done) => handle_done(ctx, chat_id, user).await?,
        Some(Command::List) => {
            let thoughts = ctx
                .storage
                .thoughts_by_status(user, ThoughtStatus::Active, ctx.config.list_limit * 5)?;
            let text = ui_builder::thoughts_by_category(
                "📋 Recent thoughts",
                &thoughts,
                ctx.config.list_limit,
            );
            ctx.bot.send_message(chat_id, text).await?;
        }
        Some(Command::Topics) => {
            let summary = ctx.storage.topic_summary(user)?;
            let thoughts = ctx
                .storage
                .thoughts_by_status(user, ThoughtStatus::Active, ctx.config.list_limit * 5)?;
            let text = ui_builder::topic_overview(&summary, &thoughts, 3);
            ctx.bot.send_message(chat_id, text).await?;
        }
        Some(Command::Today) => {
            let thoughts = ctx.storage.recent_thoughts(user, 1, ThoughtStatus::Active)?;
            let text =
                ui_builder::thoughts_by_category("📅 Today", &thoughts, ctx.config.list_limit);
            let keyboard = bulk_entry_keyboard("today");
            ctx.bot
                .send_message(chat_id, text)
                .reply_markup(keyboard)
                .await?;
        }
        Some(Command::Week) => {
            let thoughts = ctx.storage.recent_thoughts(user, 7, ThoughtStatus::Active)?;
            let text =
                ui_builder::thoughts_by_category("🗓 This week", &thoughts, ctx.config.list_limit);
            let keyboard = bulk_entry_keyboard("week");
            ctx.bot
                .send_message(chat_id, text)
                .reply_markup(keyboard)
                .await?;
        }
        Some(Command::Archive) => {
            let thoughts = ctx.storage.thoughts_by_status(
                user,
                ThoughtStatus::Archived,
                ctx.config.list_limit * 5,
            )?;
            let text = if thoughts.is_empty() {
                "📦 The archive is empty.".to_string()
            } else {
                ui_builder::thoughts_by_category("📦 Archived", &thoughts, ctx.config.list_limit)
            };
            ctx.bot.send_message(chat_id, text).await?;
        }
        Some(Command::Search(term)) => handle_search(ctx, chat_id, user, &term).await?,
        Some(Command::WeeklyReview) => handle_weekly_review(ctx, chat_id, user).await?,
        Some(Command::Stats) => {
            match ctx.storage.user_stats(user)? {
                Some(stats) => {
                    ctx.bot
                        .send_message(chat_id, ui_builder::stats_text(&stats))
                        .await?;
                }
                None => {
                    ctx.bot
                        .send_message(chat_id, "No stats yet. Send me a thought first!")
                        .await?;
                }
            }
        }
        Some(Command::Export) => {
            // TODO: stream thoughts as a document once sendDocument is wired up
            ctx.bot
                .send_message(chat_id, "🚧 Export is not ready yet.")
                .await?;
        }
        Some(Command::Clear) => {
            ctx.bot
                .send_message(
                    chat_id,
                    "⚠️ This deletes ALL your thoughts permanently. Are you sure?",
                )
                .reply_markup(ui_builder::clear_confirm_keyboard())
                .await?;
        }
        Some(Command::Unknown(name)) => {
            warn!(user_id = user, command = %name, "unknown command");
            ctx.bot
                .send_message(chat_id, "🤔 I don't know that command. Try /help.")
                .await?;
        }
        None => handle_free_text(ctx, chat_id, user, &text).await?,
    }
    Ok(())
}

fn bulk_entry_keyboard(scope: &str) -> teloxide::types::InlineKeyboardMarkup {
    teloxide::types::InlineKeyboardMarkup::new(vec![vec![
        teloxide::types::InlineKeyboardButton::callback(
            "📦 Bulk archive",
            format!("bulk_archive_{scope}"),
        ),
        teloxide::types::InlineKeyboardButton::callback(
            "🗑 Bulk delete",
            format!("bulk_delete_{scope}"),
        ),
    ]])
}

/// Free text: either a capture-mode entry or a thought to classify and save.
async fn handle_free_text(ctx: &BotContext, chat_id: ChatId, user: i64, text: &str) -> Result<()> {
    let capture_count = {
        let mut sessions = ctx.sessions.borrow_mut();
        if sessions.capture_active(user) {
            Some(sessions.append_capture(user, text)?)
        } else {
            None
        }
    };
    if let Some(count) = capture_count {
        // Quiet ack so the user keeps dumping without ceremony
        ctx.bot.send_message(chat_id, format!("✅ ({count})")).await?;
        return Ok(());
    }

    let classification = classify(text);
    let thought_id =
        ctx.storage
            .save_thought(user, text, &classification.category, &classification.topics)?;
    info!(
        user_id = user,
        thought_id,
        category = %classification.category,
        "thought saved"
    );
    ctx.bot
        .send_message(chat_id, ui_builder::saved_thought_text(&classification))
        .reply_markup(ui_builder::saved_thought_keyboard(thought_id))
        .await?;
    Ok(())
}

/// Close capture mode: classify and persist every entry, then summarize.
async fn handle_done(ctx: &BotContext, chat_id: ChatId, user: i64) -> Result<()> {
    // Bind before matching so the store borrow ends before any await
    let closed = ctx.sessions.borrow_mut().close_capture(user);
    let entries = match closed {
        Ok(entries) => entries,
        Err(_) => {
            ctx.bot
                .send_message(chat_id, "No capture in progress. /dump to start one.")
                .await?;
            return Ok(());
        }
    };
    if entries.is_empty() {
        ctx.bot
            .send_message(chat_id, "🧺 Capture closed, nothing to file.")
            .await?;
        return Ok(());
    }

    let mut categories: Vec<(String, usize)> = Vec::new();
    for entry in &entries {
        let classification = classify(entry);
        ctx.storage
            .save_thought(user, entry, &classification.category, &classification.topics)?;
        match categories.iter_mut().find(|(c, _)| *c == classification.category) {
            Some((_, count)) => *count += 1,
            None => categories.push((classification.category, 1)),
        }
    }
    info!(user_id = user, count = entries.len(), "capture session filed");
    ctx.bot
        .send_message(chat_id, ui_builder::dump_summary(entries.len(), &categories))
        .await?;
    Ok(())
}

async fn handle_search(ctx: &BotContext, chat_id: ChatId, user: i64, term: &str) -> Result<()> {
    if term.is_empty() {
        ctx.bot
            .send_message(chat_id, "Usage: /search <word>")
            .await?;
        return Ok(());
    }
    let matches = ctx.storage.search_thoughts(user, term)?;
    let text = if matches.is_empty() {
        format!("🔍 Nothing found for \"{term}\".")
    } else {
        ui_builder::thoughts_by_category(
            &format!("🔍 Matches for \"{term}\""),
            &matches,
            ctx.config.list_limit,
        )
    };
    ctx.bot.send_message(chat_id, text).await?;
    Ok(())
}

/// Start (or offer) a review of the last 7 days of active thoughts.
async fn handle_weekly_review(ctx: &BotContext, chat_id: ChatId, user: i64) -> Result<()> {
    let thoughts = ctx.storage.recent_thoughts(user, 7, ThoughtStatus::Active)?;
    if thoughts.is_empty() {
        ctx.bot
            .send_message(chat_id, "🗓 Nothing from the last 7 days to review. Enjoy the quiet!")
            .await?;
        return Ok(());
    }
    // The session itself starts when the user taps Start; the command only
    // invites, so the snapshot stays fresh.
    ctx.bot
        .send_message(chat_id, ui_builder::review_invite_text(thoughts.len()))
        .reply_markup(ui_builder::review_invite_keyboard())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_commands() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/dump"), Some(Command::Dump));
        assert_eq!(parse_command("  /done  "), Some(Command::Done));
    }

    #[test]
    fn test_parse_command_with_bot_suffix() {
        assert_eq!(parse_command("/help@BrainDumpBot"), Some(Command::Help));
    }

    #[test]
    fn test_parse_search_arguments() {
        assert_eq!(
            parse_command("/search rent money"),
            Some(Command::Search("rent money".to_string()))
        );
        assert_eq!(parse_command("/search"), Some(Command::Search(String::new())));
    }

    #[test]
    fn test_review_alias() {
        assert_eq!(parse_command("/review"), Some(Command::WeeklyReview));
        assert_eq!(parse_command("/weekly_review"), Some(Command::WeeklyReview));
    }

    #[test]
    fn test_free_text_is_not_a_command() {
        assert_eq!(parse_command("need to pay rent"), None);
        assert_eq!(
            parse_command("/unknowncmd"),
            Some(Command::Unknown("unknowncmd".to_string()))
        );
    }
}

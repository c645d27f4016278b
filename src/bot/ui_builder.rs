//! UI Builder module for creating keyboards and formatting messages
//!
//! All user-facing text and inline keyboards live here so the handlers stay
//! focused on flow. Messages are plain text (no parse mode), which keeps
//! user-provided content safe to echo back verbatim.

use chrono::{DateTime, Utc};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::classifier::{category_emoji, topic_emoji, Classification};
use crate::config::{PREVIEW_LEN, REVIEW_PREVIEW_LEN};
use crate::sessions::{BulkSelectionSession, ReviewItem, ReviewSummary, SelectionMode};
use crate::storage::Thought;

pub const WELCOME_TEXT: &str = "\
🧠 Hi! I'm your brain dump bot.

Send me any thought and I'll file it away so your head doesn't have to.

• Just write - I classify and save it
• /dump - pour out everything, /done when finished
• /list - what's on your mind lately
• /weekly_review - walk through the week's thoughts
• /help - the full command list";

pub const HELP_TEXT: &str = "\
📖 Commands:

/dump - capture mode: every message is saved raw until /done
/done - close capture mode and file everything
/list - recent thoughts by category
/topics - recent thoughts by topic
/today - today's thoughts, with bulk actions
/week - this week's thoughts, with bulk actions
/archive - what you've archived
/search <word> - full-text search your thoughts
/weekly_review - review the week one thought at a time
/stats - your numbers
/clear - wipe everything (asks first)

Anything else you send is saved as a thought.";

/// Truncate on a character boundary, appending an ellipsis when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

/// Human label for how long ago a thought was recorded.
pub fn recorded_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now.date_naive() - created_at.date_naive()).num_days();
    match days {
        d if d <= 0 => "recorded today".to_string(),
        1 => "recorded yesterday".to_string(),
        d => format!("recorded {d} days ago"),
    }
}

/// Confirmation shown right after a free-text thought is saved.
pub fn saved_thought_text(classification: &Classification) -> String {
    let mut text = format!(
        "{} Saved under \"{}\"",
        category_emoji(&classification.category),
        classification.category
    );
    if !classification.topics.is_empty() {
        let tags: Vec<String> = classification
            .topics
            .iter()
            .map(|t| format!("{} {t}", topic_emoji(t)))
            .collect();
        text.push_str(&format!("\nTopics: {}", tags.join(", ")));
    }
    text
}

pub fn saved_thought_keyboard(thought_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🔍 Similar", format!("similar_{thought_id}")),
        InlineKeyboardButton::callback("📋 Show all", "show_all".to_string()),
    ]])
}

/// Summary sent after a capture session closes.
pub fn dump_summary(total: usize, categories: &[(String, usize)]) -> String {
    let mut text = format!("🧺 Filed {total} thought{}:\n", plural(total));
    for (category, count) in categories {
        text.push_str(&format!(
            "{} {category}: {count}\n",
            category_emoji(category)
        ));
    }
    text.push_str("\nYour head is lighter now.");
    text
}

/// Thoughts grouped by category, newest first within each group.
pub fn thoughts_by_category(title: &str, thoughts: &[Thought], limit: usize) -> String {
    if thoughts.is_empty() {
        return format!("{title}\n\nNothing here yet. Send me a thought!");
    }
    let mut text = format!("{title}\n");
    let mut categories: Vec<&str> = Vec::new();
    for t in thoughts {
        if !categories.contains(&t.category.as_str()) {
            categories.push(&t.category);
        }
    }
    for category in categories {
        text.push_str(&format!("\n{} {}:\n", category_emoji(category), category));
        for t in thoughts.iter().filter(|t| t.category == category).take(limit) {
            text.push_str(&format!("  • {}\n", truncate(&t.text, PREVIEW_LEN)));
        }
    }
    text
}

/// Topic counts (highest first) with a few recent examples under each.
pub fn topic_overview(summary: &[(String, i64)], thoughts: &[Thought], limit: usize) -> String {
    if summary.is_empty() {
        return "🏷 By topic\n\nNo tagged thoughts yet.".to_string();
    }
    let mut text = String::from("🏷 By topic\n");
    for (topic, count) in summary {
        text.push_str(&format!("\n{} {topic} ({count}):\n", topic_emoji(topic)));
        for t in thoughts
            .iter()
            .filter(|t| t.topics.iter().any(|x| x == topic))
            .take(limit)
        {
            text.push_str(&format!("  • {}\n", truncate(&t.text, PREVIEW_LEN)));
        }
    }
    text
}

fn mode_verb(mode: SelectionMode) -> &'static str {
    match mode {
        SelectionMode::Archive => "Archive",
        SelectionMode::Delete => "Delete",
    }
}

/// Checkbox-style message body for a bulk selection session.
pub fn bulk_message(title: &str, session: &BulkSelectionSession) -> String {
    let mut text = format!("{title}\nTap to select, then apply:\n\n");
    for candidate in &session.candidates {
        let mark = if session.selected.contains(&candidate.id) {
            "☑"
        } else {
            "☐"
        };
        text.push_str(&format!(
            "{mark} {} {}\n",
            category_emoji(&candidate.category),
            truncate(&candidate.text, PREVIEW_LEN)
        ));
    }
    text
}

/// One toggle button per candidate plus apply/cancel on the bottom row.
pub fn bulk_keyboard(session: &BulkSelectionSession) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    for candidate in &session.candidates {
        let mark = if session.selected.contains(&candidate.id) {
            "☑"
        } else {
            "☐"
        };
        rows.push(vec![InlineKeyboardButton::callback(
            format!("{mark} {}", truncate(&candidate.text, 30)),
            format!("bulk_tog_{}", candidate.id),
        )]);
    }
    let apply_token = match session.mode {
        SelectionMode::Archive => "bulk_apply",
        SelectionMode::Delete => "bulk_delete_apply",
    };
    rows.push(vec![
        InlineKeyboardButton::callback(
            format!("{} {} selected", mode_verb(session.mode), session.selected.len()),
            apply_token.to_string(),
        ),
        InlineKeyboardButton::callback("✖ Cancel", "bulk_cancel".to_string()),
    ]);
    InlineKeyboardMarkup::new(rows)
}

pub fn bulk_applied_text(count: usize, mode: SelectionMode) -> String {
    match mode {
        SelectionMode::Archive => format!("📦 Archived {count} thought{}.", plural(count)),
        SelectionMode::Delete => format!("🗑 Deleted {count} thought{} for good.", plural(count)),
    }
}

/// Invitation sent by the scheduler and the /weekly_review command.
pub fn review_invite_text(count: usize) -> String {
    format!(
        "🗓 Weekly review time! You have {count} thought{} from the last 7 days.\nReady to go through them?",
        plural(count)
    )
}

pub fn review_invite_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("▶ Start", "review_start".to_string()),
        InlineKeyboardButton::callback("⏸ Later", "review_later".to_string()),
    ]])
}

/// Card for the thought currently under the review cursor.
pub fn review_card(item: &ReviewItem, position: usize, total: usize, now: DateTime<Utc>) -> String {
    format!(
        "Thought {position} of {total}\n\n{} {}\n\n({})",
        category_emoji(&item.category),
        truncate(&item.text, REVIEW_PREVIEW_LEN),
        recorded_ago(item.created_at, now)
    )
}

pub fn review_keyboard(item_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("👍 Keep", format!("review_keep_{item_id}")),
            InlineKeyboardButton::callback("📦 Archive", format!("review_archive_{item_id}")),
        ],
        vec![
            InlineKeyboardButton::callback("⏭ Skip", "review_skip".to_string()),
            InlineKeyboardButton::callback("🏁 Finish", "review_finish".to_string()),
        ],
    ])
}

pub fn review_summary_text(summary: &ReviewSummary) -> String {
    let mut text = format!(
        "🏁 Review done!\n👍 Kept: {}\n📦 Archived: {}",
        summary.kept, summary.archived
    );
    if summary.remaining > 0 {
        text.push_str(&format!("\n⏭ Left for later: {}", summary.remaining));
    }
    text.push_str("\n\nSee you next week.");
    text
}

pub fn stats_text(stats: &crate::storage::UserStats) -> String {
    let mut text = format!(
        "📊 Your stats\n\nThoughts captured: {}\nWith me since: {}\n",
        stats.total_thoughts,
        stats.joined_at.format("%Y-%m-%d")
    );
    if !stats.categories.is_empty() {
        text.push_str("\nBy category:\n");
        for (category, count) in &stats.categories {
            text.push_str(&format!(
                "{} {category}: {count}\n",
                category_emoji(category)
            ));
        }
    }
    text
}

pub fn clear_confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("⚠️ Yes, delete everything", "confirm_clear".to_string()),
        InlineKeyboardButton::callback("✖ Cancel", "cancel_clear".to_string()),
    ]])
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

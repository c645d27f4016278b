//! # Weekly Review Scheduler Module
//!
//! Long-lived task on the worker that wakes at the configured weekly firing
//! points and invites every known user to a review walkthrough. Users
//! prompted recently (within the cooldown window) are skipped, so the two
//! default firing points never double-prompt the same weekend.
//!
//! All times are UTC.

use std::rc::Rc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, error, info};

use crate::bot::{ui_builder, BotContext};
use crate::config::ReviewTrigger;
use crate::storage::ThoughtStatus;

/// Earliest firing point strictly after `after`, across all triggers.
/// Returns `None` only for an empty trigger list.
pub fn next_fire(after: DateTime<Utc>, triggers: &[ReviewTrigger]) -> Option<DateTime<Utc>> {
    let mut best: Option<DateTime<Utc>> = None;
    for trigger in triggers {
        // Walk up to a full week of dates; one of them carries the weekday.
        for day_offset in 0..=7 {
            let date = after.date_naive() + ChronoDuration::days(day_offset);
            if date.weekday() != trigger.weekday {
                continue;
            }
            let Some(naive) = date.and_hms_opt(trigger.hour, trigger.minute, 0) else {
                continue;
            };
            let candidate = naive.and_utc();
            if candidate > after {
                if best.map_or(true, |b| candidate < b) {
                    best = Some(candidate);
                }
                break;
            }
        }
    }
    best
}

/// Scheduler loop; runs until the worker shuts down.
pub async fn run(ctx: Rc<BotContext>) {
    let triggers = ctx.config.review.triggers.clone();
    info!(triggers = triggers.len(), "weekly review scheduler running");
    loop {
        let Some(fire_at) = next_fire(Utc::now(), &triggers) else {
            info!("no review triggers configured, scheduler stopping");
            return;
        };
        debug!(%fire_at, "next review prompt scheduled");
        let wait = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(wait).await;
        send_prompts(&ctx).await;
    }
}

/// Invite every eligible user to a review. Per-user failures are logged and
/// never abort the sweep.
async fn send_prompts(ctx: &BotContext) {
    let users = match ctx.storage.all_user_ids() {
        Ok(users) => users,
        Err(e) => {
            error!(error = %e, "failed to list users for review prompts");
            return;
        }
    };
    let now = Utc::now();
    let cooldown = ChronoDuration::hours(ctx.config.review.cooldown_hours);
    let mut sent = 0usize;
    for user in users {
        match prompt_user(ctx, user, now, cooldown).await {
            Ok(true) => sent += 1,
            Ok(false) => {}
            Err(e) => error!(user_id = user, error = %e, "review prompt failed"),
        }
    }
    info!(sent, "weekly review sweep complete");
}

async fn prompt_user(
    ctx: &BotContext,
    user: i64,
    now: DateTime<Utc>,
    cooldown: ChronoDuration,
) -> anyhow::Result<bool> {
    if let Some(last) = ctx.storage.last_review_prompt(user)? {
        if now - last < cooldown {
            debug!(user_id = user, "skipping review prompt, inside cooldown");
            return Ok(false);
        }
    }
    let thoughts = ctx.storage.recent_thoughts(user, 7, ThoughtStatus::Active)?;
    if thoughts.is_empty() {
        return Ok(false);
    }
    ctx.bot
        .send_message(ChatId(user), ui_builder::review_invite_text(thoughts.len()))
        .reply_markup(ui_builder::review_invite_keyboard())
        .await?;
    ctx.storage.mark_review_prompted(user, now)?;
    Ok(true)
}

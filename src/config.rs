//! # Configuration Module
//!
//! Runtime configuration loaded from environment variables (with `.env`
//! support) plus defaults for everything that is tunable: webhook ingress,
//! dispatcher timing, list rendering limits, and the weekly review schedule.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Weekday;

// Defaults for dispatcher timing
pub const DEFAULT_REPLY_BUDGET_SECS: u64 = 8;
pub const DEFAULT_SLOW_THRESHOLD_SECS: u64 = 5;

// Defaults for list rendering
pub const DEFAULT_LIST_LIMIT: usize = 10;
pub const DEFAULT_BULK_CANDIDATE_LIMIT: usize = 20;
pub const PREVIEW_LEN: usize = 60;
pub const REVIEW_PREVIEW_LEN: usize = 140;

/// One weekly firing point for the scheduled review prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewTrigger {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

/// Weekly review prompt settings
#[derive(Debug, Clone)]
pub struct ReviewScheduleConfig {
    pub enabled: bool,
    /// Firing points, checked weekly (default: Friday 16:00 and Sunday 08:00 UTC)
    pub triggers: Vec<ReviewTrigger>,
    /// Users prompted within this window are skipped
    pub cooldown_hours: i64,
}

impl Default for ReviewScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            triggers: vec![
                ReviewTrigger {
                    weekday: Weekday::Fri,
                    hour: 16,
                    minute: 0,
                },
                ReviewTrigger {
                    weekday: Weekday::Sun,
                    hour: 8,
                    minute: 0,
                },
            ],
            cooldown_hours: 36,
        }
    }
}

/// Full bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub database_path: String,
    /// Externally reachable base URL; when unset the webhook is not registered
    pub public_url: Option<String>,
    pub port: u16,
    /// Effectively-secret ingress path, derived from the bot token
    pub webhook_path: String,
    /// How long the dispatcher waits before answering "accepted"
    pub reply_budget: Duration,
    /// Completions slower than this are logged as slow (informational only)
    pub slow_threshold: Duration,
    pub review: ReviewScheduleConfig,
    /// Category whose candidates are pre-selected in bulk sessions
    pub default_selected_category: String,
    pub list_limit: usize,
    pub bulk_candidate_limit: usize,
}

impl BotConfig {
    /// Load configuration from the environment. Only the bot token and
    /// database path are required.
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN must be set")?;
        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "brain_dump.db".to_string());
        let public_url = std::env::var("PUBLIC_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        let port = env_parse("PORT", 10000u16)?;

        let review = ReviewScheduleConfig {
            enabled: env_parse("WEEKLY_REVIEW_ENABLED", true)?,
            triggers: vec![
                ReviewTrigger {
                    weekday: env_weekday("WEEKLY_REVIEW_DAY_1", Weekday::Fri)?,
                    hour: env_parse("WEEKLY_REVIEW_HOUR_1", 16u32)?,
                    minute: env_parse("WEEKLY_REVIEW_MINUTE_1", 0u32)?,
                },
                ReviewTrigger {
                    weekday: env_weekday("WEEKLY_REVIEW_DAY_2", Weekday::Sun)?,
                    hour: env_parse("WEEKLY_REVIEW_HOUR_2", 8u32)?,
                    minute: env_parse("WEEKLY_REVIEW_MINUTE_2", 0u32)?,
                },
            ],
            cooldown_hours: env_parse("WEEKLY_REVIEW_COOLDOWN_HOURS", 36i64)?,
        };

        Ok(Self {
            webhook_path: format!("/webhook/{bot_token}"),
            bot_token,
            database_path,
            public_url,
            port,
            reply_budget: Duration::from_secs(env_parse(
                "REPLY_BUDGET_SECS",
                DEFAULT_REPLY_BUDGET_SECS,
            )?),
            slow_threshold: Duration::from_secs(env_parse(
                "SLOW_THRESHOLD_SECS",
                DEFAULT_SLOW_THRESHOLD_SECS,
            )?),
            review,
            default_selected_category: std::env::var("DEFAULT_SELECTED_CATEGORY")
                .unwrap_or_else(|_| "tasks".to_string()),
            list_limit: DEFAULT_LIST_LIMIT,
            bulk_candidate_limit: DEFAULT_BULK_CANDIDATE_LIMIT,
        })
    }

    /// Full webhook URL to register with Telegram, if a public URL is set.
    pub fn webhook_url(&self) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{base}{}", self.webhook_path))
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {name}")),
        Err(_) => Ok(default),
    }
}

fn env_weekday(name: &str, default: Weekday) -> Result<Weekday> {
    match std::env::var(name) {
        Ok(value) => parse_weekday(&value),
        Err(_) => Ok(default),
    }
}

/// Parse a weekday name like "fri" or "Friday".
pub fn parse_weekday(value: &str) -> Result<Weekday> {
    match value.trim().to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => bail!("unknown weekday: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("fri").unwrap(), Weekday::Fri);
        assert_eq!(parse_weekday(" Sunday ").unwrap(), Weekday::Sun);
        assert!(parse_weekday("someday").is_err());
    }

    #[test]
    fn test_default_schedule() {
        let schedule = ReviewScheduleConfig::default();
        assert!(schedule.enabled);
        assert_eq!(schedule.triggers.len(), 2);
        assert_eq!(schedule.cooldown_hours, 36);
    }
}

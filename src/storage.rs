//! # Storage Module
//!
//! SQLite persistence for users and thoughts, with an FTS5 index for free
//! search. The connection is owned by the background worker thread; handlers
//! reach it through the [`Storage`] trait so the session flows can be tested
//! against fakes.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

/// Lifecycle status of a stored thought
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThoughtStatus {
    Active,
    Archived,
}

impl ThoughtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtStatus::Active => "active",
            ThoughtStatus::Archived => "archived",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "archived" => ThoughtStatus::Archived,
            _ => ThoughtStatus::Active,
        }
    }
}

/// A persisted thought
#[derive(Debug, Clone, PartialEq)]
pub struct Thought {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub category: String,
    pub topics: Vec<String>,
    pub status: ThoughtStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-user aggregate counters for `/stats`
#[derive(Debug, Clone)]
pub struct UserStats {
    pub total_thoughts: i64,
    pub joined_at: DateTime<Utc>,
    pub categories: Vec<(String, i64)>,
}

/// Persistence operations consumed by the chat handlers and the scheduler
pub trait Storage {
    fn ensure_user(&self, user_id: i64, username: Option<&str>) -> Result<()>;
    fn all_user_ids(&self) -> Result<Vec<i64>>;

    fn save_thought(&self, user_id: i64, text: &str, category: &str, topics: &[String]) -> Result<i64>;
    /// Thoughts with the given status recorded in the last `days_back` days,
    /// newest first.
    fn recent_thoughts(&self, user_id: i64, days_back: i64, status: ThoughtStatus) -> Result<Vec<Thought>>;
    fn thoughts_by_status(&self, user_id: i64, status: ThoughtStatus, limit: usize) -> Result<Vec<Thought>>;
    fn search_thoughts(&self, user_id: i64, term: &str) -> Result<Vec<Thought>>;
    fn update_status(&self, user_id: i64, thought_id: i64, status: ThoughtStatus) -> Result<bool>;
    fn archive_many(&self, user_id: i64, ids: &[i64]) -> Result<usize>;
    fn delete_many(&self, user_id: i64, ids: &[i64]) -> Result<usize>;
    fn delete_all(&self, user_id: i64) -> Result<usize>;

    fn category_summary(&self, user_id: i64) -> Result<Vec<(String, i64)>>;
    fn topic_summary(&self, user_id: i64) -> Result<Vec<(String, i64)>>;
    fn user_stats(&self, user_id: i64) -> Result<Option<UserStats>>;

    fn last_review_prompt(&self, user_id: i64) -> Result<Option<DateTime<Utc>>>;
    fn mark_review_prompted(&self, user_id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// SQLite-backed [`Storage`]
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self> {
        info!(path, "opening database");
        let conn = Connection::open(path).context("Failed to open database")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn thought_rows(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Thought>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare query")?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .context("Failed to query thoughts")?;

        let mut thoughts = Vec::new();
        for row in rows {
            let (id, user_id, text, category, topics, status, created_at) = row?;
            thoughts.push(Thought {
                id,
                user_id,
                text,
                category,
                topics: serde_json::from_str(&topics).unwrap_or_default(),
                status: ThoughtStatus::parse(&status),
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(thoughts)
    }
}

const THOUGHT_COLUMNS: &str = "id, user_id, content, category, topics, status, created_at";

fn init_schema(conn: &Connection) -> Result<()> {
    info!("Initializing database schema...");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            username TEXT,
            joined_at TEXT NOT NULL,
            last_review_prompt TEXT
        )",
        [],
    )
    .context("Failed to create users table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS thoughts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            category TEXT NOT NULL,
            topics TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create thoughts table")?;

    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS thoughts_fts USING fts5(
            content,
            content='thoughts',
            content_rowid='id'
        )",
        [],
    )
    .context("Failed to create FTS table")?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS thoughts_insert AFTER INSERT ON thoughts
         BEGIN
             INSERT INTO thoughts_fts(rowid, content) VALUES (new.id, new.content);
         END",
        [],
    )
    .context("Failed to create insert trigger")?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS thoughts_delete AFTER DELETE ON thoughts
         BEGIN
             DELETE FROM thoughts_fts WHERE rowid = old.id;
         END",
        [],
    )
    .context("Failed to create delete trigger")?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS thoughts_update AFTER UPDATE ON thoughts
         BEGIN
             UPDATE thoughts_fts SET content = new.content WHERE rowid = new.id;
         END",
        [],
    )
    .context("Failed to create update trigger")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in database: {value}"))
}

impl Storage for SqliteStorage {
    fn ensure_user(&self, user_id: i64, username: Option<&str>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (user_id, username, joined_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET username = excluded.username",
                params![user_id, username, Utc::now().to_rfc3339()],
            )
            .context("Failed to upsert user")?;
        Ok(())
    }

    fn all_user_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM users ORDER BY user_id")
            .context("Failed to prepare user query")?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to query users")?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn save_thought(&self, user_id: i64, text: &str, category: &str, topics: &[String]) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO thoughts (user_id, content, category, topics, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', ?5)",
                params![
                    user_id,
                    text,
                    category,
                    serde_json::to_string(topics)?,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("Failed to insert thought")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn recent_thoughts(&self, user_id: i64, days_back: i64, status: ThoughtStatus) -> Result<Vec<Thought>> {
        let cutoff = (Utc::now() - Duration::days(days_back)).to_rfc3339();
        let sql = format!(
            "SELECT {THOUGHT_COLUMNS} FROM thoughts
             WHERE user_id = ?1 AND status = ?2 AND created_at >= ?3
             ORDER BY created_at DESC"
        );
        self.thought_rows(&sql, &[&user_id, &status.as_str(), &cutoff])
    }

    fn thoughts_by_status(&self, user_id: i64, status: ThoughtStatus, limit: usize) -> Result<Vec<Thought>> {
        let sql = format!(
            "SELECT {THOUGHT_COLUMNS} FROM thoughts
             WHERE user_id = ?1 AND status = ?2
             ORDER BY created_at DESC LIMIT ?3"
        );
        self.thought_rows(&sql, &[&user_id, &status.as_str(), &(limit as i64)])
    }

    fn search_thoughts(&self, user_id: i64, term: &str) -> Result<Vec<Thought>> {
        // FTS5 query syntax is not user input; quote the term to search it verbatim
        let match_term = format!("\"{}\"", term.replace('"', ""));
        let sql = format!(
            "SELECT {} FROM thoughts t
             JOIN thoughts_fts f ON f.rowid = t.id
             WHERE f.thoughts_fts MATCH ?1 AND t.user_id = ?2 AND t.status = 'active'
             ORDER BY t.created_at DESC",
            THOUGHT_COLUMNS
                .split(", ")
                .map(|c| format!("t.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.thought_rows(&sql, &[&match_term, &user_id])
    }

    fn update_status(&self, user_id: i64, thought_id: i64, status: ThoughtStatus) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE thoughts SET status = ?1 WHERE id = ?2 AND user_id = ?3",
                params![status.as_str(), thought_id, user_id],
            )
            .context("Failed to update thought status")?;
        Ok(changed > 0)
    }

    fn archive_many(&self, user_id: i64, ids: &[i64]) -> Result<usize> {
        let mut count = 0;
        for id in ids {
            if self.update_status(user_id, *id, ThoughtStatus::Archived)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn delete_many(&self, user_id: i64, ids: &[i64]) -> Result<usize> {
        let mut count = 0;
        for id in ids {
            count += self
                .conn
                .execute(
                    "DELETE FROM thoughts WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                )
                .context("Failed to delete thought")?;
        }
        Ok(count)
    }

    fn delete_all(&self, user_id: i64) -> Result<usize> {
        let count = self
            .conn
            .execute("DELETE FROM thoughts WHERE user_id = ?1", params![user_id])
            .context("Failed to delete thoughts")?;
        Ok(count)
    }

    fn category_summary(&self, user_id: i64) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT category, COUNT(*) FROM thoughts
                 WHERE user_id = ?1 AND status = 'active'
                 GROUP BY category ORDER BY COUNT(*) DESC",
            )
            .context("Failed to prepare category summary")?;
        let rows = stmt
            .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("Failed to query category summary")?
            .collect::<std::result::Result<Vec<(String, i64)>, _>>()?;
        Ok(rows)
    }

    fn topic_summary(&self, user_id: i64) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT topics FROM thoughts WHERE user_id = ?1 AND status = 'active'")
            .context("Failed to prepare topic summary")?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .context("Failed to query topics")?;

        let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        for row in rows {
            let topics: Vec<String> = serde_json::from_str(&row?).unwrap_or_default();
            for topic in topics {
                *counts.entry(topic).or_insert(0) += 1;
            }
        }
        let mut summary: Vec<(String, i64)> = counts.into_iter().collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(summary)
    }

    fn user_stats(&self, user_id: i64) -> Result<Option<UserStats>> {
        let joined: Option<String> = self
            .conn
            .query_row(
                "SELECT joined_at FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query user")?;
        let Some(joined) = joined else {
            return Ok(None);
        };

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM thoughts WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        Ok(Some(UserStats {
            total_thoughts: total,
            joined_at: parse_timestamp(&joined)?,
            categories: self.category_summary(user_id)?,
        }))
    }

    fn last_review_prompt(&self, user_id: i64) -> Result<Option<DateTime<Utc>>> {
        let value: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT last_review_prompt FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query last review prompt")?;
        match value.flatten() {
            Some(ts) => Ok(Some(parse_timestamp(&ts)?)),
            None => Ok(None),
        }
    }

    fn mark_review_prompted(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE users SET last_review_prompt = ?1 WHERE user_id = ?2",
                params![at.to_rfc3339(), user_id],
            )
            .context("Failed to record review prompt")?;
        Ok(())
    }
}

//! # Error Types Module
//!
//! This module defines the error taxonomy for the webhook pipeline and the
//! interactive session flows. Pipeline errors map to HTTP outcomes; session
//! errors are soft and always recovered with a user-facing message.

/// Errors raised by the webhook processing pipeline
#[derive(Debug, Clone)]
pub enum BotError {
    /// One-time bot setup failed; surfaced as 503 and retried on the next request
    Initialization(String),
    /// Work was submitted before the background worker was started; surfaced as 500
    Scheduling(String),
    /// A submitted unit failed while executing on the worker
    Processing(String),
    /// A task handle was cancelled before its unit completed
    Cancelled,
}

impl std::fmt::Display for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotError::Initialization(msg) => write!(f, "Initialization error: {msg}"),
            BotError::Scheduling(msg) => write!(f, "Scheduling error: {msg}"),
            BotError::Processing(msg) => write!(f, "Processing error: {msg}"),
            BotError::Cancelled => write!(f, "Task cancelled before completion"),
        }
    }
}

impl std::error::Error for BotError {}

/// Soft errors raised by the per-user session state machines.
///
/// These never propagate past the chat handlers: each variant has a matching
/// user-facing reply that re-prompts or informs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation requires an active session of the given kind and none exists
    NoActiveSession,
    /// A session was requested over an empty item set, so none was created
    EmptySession,
    /// Bulk apply was requested with nothing selected
    NothingSelected,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NoActiveSession => write!(f, "No active session"),
            SessionError::EmptySession => write!(f, "Nothing to work on"),
            SessionError::NothingSelected => write!(f, "No items selected"),
        }
    }
}

impl std::error::Error for SessionError {}

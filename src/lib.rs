//! # Brain Dump Telegram Bot
//!
//! A note-capture Telegram bot: send it any thought and it classifies, tags
//! and stores it, then helps you work the backlog down with bulk selection
//! and a weekly review walkthrough.
//!
//! Architecturally the crate is an HTTP webhook front door (`server`) feeding
//! a single background worker thread (`bridge`) that owns all mutable session
//! state (`sessions`) and the storage connection (`storage`). One-time bot
//! setup is funnelled through the `gate`.

pub mod bot;
pub mod bridge;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod gate;
pub mod review_scheduler;
pub mod server;
pub mod sessions;
pub mod storage;

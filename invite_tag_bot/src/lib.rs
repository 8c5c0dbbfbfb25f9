//! Source code for Invite Tag Bot: a Telegram bot that looks up server tags
//! and their invite links, and checks which of those invites still work.

/// Tag types used throughout.
pub mod types;

/// Settings from `config.json`.
mod config;

/// The JSON files everything is kept in.
mod database;

/// Finding tags by what people type.
pub mod search;

/// Paged results and confirmation buttons.
mod interactive;

/// Checking invite links, in bulk too.
pub mod invites;

/// Miscellaneous functions.
mod misc;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

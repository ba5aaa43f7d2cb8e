//! # QuizPulse Channels
//!
//! Outbound quiz delivery and inbound command polling over the
//! Telegram Bot API.

pub mod telegram;

pub use telegram::{ChatMessage, TelegramPoller, TelegramTransport};

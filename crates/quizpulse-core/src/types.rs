//! Domain types shared across QuizPulse crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram chat identifier.
pub type ChatId = i64;

/// Kind of chat a quiz is delivered to — determines the daily cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatKind {
    /// One-on-one conversation.
    Direct,
    /// Group or supergroup.
    Group,
}

impl ChatKind {
    /// Parse from the Telegram `chat.type` string.
    pub fn from_telegram(s: &str) -> Self {
        match s {
            "private" => ChatKind::Direct,
            _ => ChatKind::Group,
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatKind::Direct => write!(f, "direct"),
            ChatKind::Group => write!(f, "group"),
        }
    }
}

/// A single quiz question from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier used by the no-repeat tracking.
    /// Catalog files may omit it; the loader derives one from the
    /// category name and position.
    #[serde(default)]
    pub id: String,
    /// The question text.
    #[serde(alias = "question")]
    pub prompt: String,
    /// Answer options.
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    #[serde(alias = "correct_option_id")]
    pub correct_option: usize,
}

/// Per-chat quiz session state as persisted in the chat store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat_id: ChatId,
    /// Whether a quiz session is running for this chat.
    pub active: bool,
    /// Paused sessions stay registered but are not scheduled.
    pub paused: bool,
    pub kind: ChatKind,
    /// Question catalog category this chat draws from.
    pub category: String,
    /// Seconds between quizzes.
    pub interval_secs: u64,
    /// Last *scheduled* fire time — the phase anchor used to rebuild
    /// the queue after a restart without double-firing.
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl ChatRecord {
    pub fn new(chat_id: ChatId, kind: ChatKind, category: &str, interval_secs: u64) -> Self {
        Self {
            chat_id,
            active: false,
            paused: false,
            kind,
            category: category.to_string(),
            interval_secs,
            last_fired_at: None,
        }
    }
}

/// Reference to a message accepted by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// Transport failures, classified for the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Server asked us to slow down; retry after the given wait.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(std::time::Duration),

    /// Request timed out or the network dropped.
    #[error("request timed out")]
    Timeout,

    /// The destination can no longer receive messages (bot removed,
    /// blocked, or chat deleted). Never retried.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Anything unrecognized — treated as transient by callers.
    #[error("transport error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_kind_from_telegram() {
        assert_eq!(ChatKind::from_telegram("private"), ChatKind::Direct);
        assert_eq!(ChatKind::from_telegram("group"), ChatKind::Group);
        assert_eq!(ChatKind::from_telegram("supergroup"), ChatKind::Group);
        assert_eq!(ChatKind::from_telegram("channel"), ChatKind::Group);
    }

    #[test]
    fn question_deserializes_original_shape() {
        // Catalog files written for the original bot use these key names.
        let q: Question = serde_json::from_str(
            r#"{"question": "2+2?", "options": ["3", "4"], "correct_option_id": 1}"#,
        )
        .unwrap();
        assert_eq!(q.prompt, "2+2?");
        assert_eq!(q.correct_option, 1);
        assert!(q.id.is_empty());
    }
}

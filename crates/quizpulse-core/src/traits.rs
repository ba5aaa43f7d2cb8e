//! Trait seams between the scheduling core and its collaborators.
//!
//! The scheduler never talks to Telegram or SQLite directly — it goes
//! through these traits, so tests run against in-memory fakes and the
//! binary wires in the real backends.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::types::{ChatId, ChatRecord, MessageRef, Question, TransportError};

/// Persistent per-chat session state.
pub trait ChatStore: Send + Sync {
    fn get(&self, chat_id: ChatId) -> Result<Option<ChatRecord>>;
    fn put(&self, record: &ChatRecord) -> Result<()>;
    fn set_active(&self, chat_id: ChatId, active: bool) -> Result<()>;
    fn set_paused(&self, chat_id: ChatId, paused: bool) -> Result<()>;
    fn set_interval(&self, chat_id: ChatId, interval_secs: u64) -> Result<()>;
    /// Record the scheduled time of a successful fire. Used as the
    /// phase anchor when the queue is rebuilt after a restart.
    fn record_fire(&self, chat_id: ChatId, at: DateTime<Utc>) -> Result<()>;
    /// All chats with a running (active, not paused) session.
    fn list_active(&self) -> Result<Vec<ChatRecord>>;
}

/// Per-chat used-question tracking for the current cycle.
pub trait UsageStore: Send + Sync {
    fn used(&self, chat_id: ChatId) -> Result<Vec<String>>;
    fn record(&self, chat_id: ChatId, question_id: &str) -> Result<()>;
    fn reset(&self, chat_id: ChatId) -> Result<()>;
}

/// Per-(chat, day) send counters and the one-shot limit-notice flag.
pub trait CounterStore: Send + Sync {
    fn day_count(&self, chat_id: ChatId, day: NaiveDate) -> Result<u32>;
    fn increment(&self, chat_id: ChatId, day: NaiveDate) -> Result<()>;
    fn limit_notified(&self, chat_id: ChatId, day: NaiveDate) -> Result<bool>;
    fn mark_notified(&self, chat_id: ChatId, day: NaiveDate) -> Result<()>;
}

/// Read-only question catalog, loaded once per process.
pub trait QuestionCatalog: Send + Sync {
    /// Questions for a category. Empty slice if the category is unknown.
    fn load(&self, category: &str) -> &[Question];
    fn categories(&self) -> Vec<String>;
}

/// Outbound message delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_quiz(
        &self,
        chat_id: ChatId,
        question: &Question,
    ) -> std::result::Result<MessageRef, TransportError>;

    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
    ) -> std::result::Result<(), TransportError>;
}

//! In-memory store backend — implements all three storage traits over
//! plain HashMaps. Used by the scheduler's tests; no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use quizpulse_core::error::{QuizPulseError, Result};
use quizpulse_core::traits::{ChatStore, CounterStore, UsageStore};
use quizpulse_core::types::{ChatId, ChatRecord};

#[derive(Default)]
struct Inner {
    chats: HashMap<ChatId, ChatRecord>,
    used: HashMap<ChatId, Vec<String>>,
    counts: HashMap<(ChatId, NaiveDate), u32>,
    notified: HashSet<(ChatId, NaiveDate)>,
}

/// HashMap-backed implementation of ChatStore, UsageStore, CounterStore.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| QuizPulseError::Store(e.to_string()))
    }
}

impl ChatStore for MemoryStore {
    fn get(&self, chat_id: ChatId) -> Result<Option<ChatRecord>> {
        Ok(self.lock()?.chats.get(&chat_id).cloned())
    }

    fn put(&self, record: &ChatRecord) -> Result<()> {
        self.lock()?.chats.insert(record.chat_id, record.clone());
        Ok(())
    }

    fn set_active(&self, chat_id: ChatId, active: bool) -> Result<()> {
        if let Some(record) = self.lock()?.chats.get_mut(&chat_id) {
            record.active = active;
        }
        Ok(())
    }

    fn set_paused(&self, chat_id: ChatId, paused: bool) -> Result<()> {
        if let Some(record) = self.lock()?.chats.get_mut(&chat_id) {
            record.paused = paused;
        }
        Ok(())
    }

    fn set_interval(&self, chat_id: ChatId, interval_secs: u64) -> Result<()> {
        if let Some(record) = self.lock()?.chats.get_mut(&chat_id) {
            record.interval_secs = interval_secs;
        }
        Ok(())
    }

    fn record_fire(&self, chat_id: ChatId, at: DateTime<Utc>) -> Result<()> {
        if let Some(record) = self.lock()?.chats.get_mut(&chat_id) {
            record.last_fired_at = Some(at);
        }
        Ok(())
    }

    fn list_active(&self) -> Result<Vec<ChatRecord>> {
        Ok(self
            .lock()?
            .chats
            .values()
            .filter(|r| r.active && !r.paused)
            .cloned()
            .collect())
    }
}

impl UsageStore for MemoryStore {
    fn used(&self, chat_id: ChatId) -> Result<Vec<String>> {
        Ok(self.lock()?.used.get(&chat_id).cloned().unwrap_or_default())
    }

    fn record(&self, chat_id: ChatId, question_id: &str) -> Result<()> {
        self.lock()?
            .used
            .entry(chat_id)
            .or_default()
            .push(question_id.to_string());
        Ok(())
    }

    fn reset(&self, chat_id: ChatId) -> Result<()> {
        self.lock()?.used.remove(&chat_id);
        Ok(())
    }
}

impl CounterStore for MemoryStore {
    fn day_count(&self, chat_id: ChatId, day: NaiveDate) -> Result<u32> {
        Ok(self
            .lock()?
            .counts
            .get(&(chat_id, day))
            .copied()
            .unwrap_or(0))
    }

    fn increment(&self, chat_id: ChatId, day: NaiveDate) -> Result<()> {
        *self.lock()?.counts.entry((chat_id, day)).or_insert(0) += 1;
        Ok(())
    }

    fn limit_notified(&self, chat_id: ChatId, day: NaiveDate) -> Result<bool> {
        Ok(self.lock()?.notified.contains(&(chat_id, day)))
    }

    fn mark_notified(&self, chat_id: ChatId, day: NaiveDate) -> Result<()> {
        self.lock()?.notified.insert((chat_id, day));
        Ok(())
    }
}

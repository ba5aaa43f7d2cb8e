//! Scheduler Queue — maps active chats to their next due time.
//!
//! One entry per active chat, keyed by chat id. Every operation takes
//! `now` explicitly, so the queue is a pure data structure with no
//! hidden clock; the engine passes `Utc::now()` and tests pass fixed
//! timestamps.
//!
//! Cadence rule: a successful advance anchors to the *scheduled* fire
//! time, never the wall clock, so processing delay does not compound
//! into drift. `next_due_at == last_fired_at + interval` holds after
//! every successful advance.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use quizpulse_core::types::ChatId;

use crate::dispatcher::Outcome;

/// Schedule state for one chat.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub chat_id: ChatId,
    /// Seconds between fires. Floor enforced by the queue.
    pub interval_secs: u64,
    /// When the next quiz is due.
    pub next_due_at: DateTime<Utc>,
    /// The last *scheduled* fire time — the anchor for the next one.
    pub last_fired_at: DateTime<Utc>,
}

impl ScheduleEntry {
    fn interval(&self) -> Duration {
        Duration::seconds(self.interval_secs as i64)
    }
}

/// The central schedule: chat id → entry.
pub struct QuizQueue {
    entries: HashMap<ChatId, ScheduleEntry>,
    min_interval_secs: u64,
    retry_backoff: Duration,
}

impl QuizQueue {
    pub fn new(min_interval_secs: u64, retry_backoff_secs: u64) -> Self {
        Self {
            entries: HashMap::new(),
            min_interval_secs,
            retry_backoff: Duration::seconds(retry_backoff_secs as i64),
        }
    }

    /// Insert or replace a chat's schedule.
    ///
    /// With `reference` (a prior last-fire timestamp), the next due time
    /// preserves phase: it lands strictly within `(now, now + interval]`
    /// as if the chat had kept firing on its grid all along. A process
    /// restart therefore never resets a mid-cycle chat to "fire now".
    /// Without a reference the first fire is one full interval out.
    pub fn upsert(
        &mut self,
        chat_id: ChatId,
        interval_secs: u64,
        now: DateTime<Utc>,
        reference: Option<DateTime<Utc>>,
    ) {
        let interval_secs = interval_secs.max(self.min_interval_secs);
        let anchor = reference.unwrap_or(now);
        let next_due_at = phase_next_due(now, anchor, interval_secs);
        tracing::info!(
            chat_id,
            interval_secs,
            next_due = %next_due_at,
            "chat scheduled"
        );
        self.entries.insert(
            chat_id,
            ScheduleEntry {
                chat_id,
                interval_secs,
                next_due_at,
                last_fired_at: anchor,
            },
        );
    }

    /// Delete a chat's schedule. Idempotent.
    pub fn remove(&mut self, chat_id: ChatId) {
        if self.entries.remove(&chat_id).is_some() {
            tracing::info!(chat_id, "chat unscheduled");
        }
    }

    /// Apply the result of one dispatch attempt.
    ///
    /// Unknown chat ids are a no-op: the chat was removed while its
    /// dispatch was in flight.
    pub fn advance(&mut self, chat_id: ChatId, outcome: &Outcome, now: DateTime<Utc>) {
        match outcome {
            Outcome::Success => {
                if let Some(entry) = self.entries.get_mut(&chat_id) {
                    entry.last_fired_at = entry.next_due_at;
                    entry.next_due_at = entry.last_fired_at + entry.interval();
                    tracing::debug!(chat_id, next_due = %entry.next_due_at, "advanced");
                }
            }
            Outcome::Retryable { wait } => {
                if let Some(entry) = self.entries.get_mut(&chat_id) {
                    let backoff = wait
                        .map(|w| Duration::from_std(w).unwrap_or(self.retry_backoff))
                        .unwrap_or(self.retry_backoff);
                    entry.next_due_at = now + backoff;
                    tracing::warn!(
                        chat_id,
                        retry_at = %entry.next_due_at,
                        "delivery failed, rescheduled"
                    );
                }
            }
            Outcome::Permanent => {
                self.remove(chat_id);
            }
        }
    }

    /// Chats due at `now`, oldest due first, capped at `max_batch`.
    /// Ties break on chat id so the order is deterministic.
    pub fn due_chats(&self, now: DateTime<Utc>, max_batch: usize) -> Vec<ChatId> {
        let mut due: Vec<&ScheduleEntry> = self
            .entries
            .values()
            .filter(|e| e.next_due_at <= now)
            .collect();
        due.sort_by_key(|e| (e.next_due_at, e.chat_id));
        due.into_iter().take(max_batch).map(|e| e.chat_id).collect()
    }

    /// Change a chat's interval without resetting its phase: the next
    /// due time is re-derived from the last fire on the new grid, so it
    /// stays within `(now, now + new_interval]`. Use [`fire_now`] for an
    /// explicit immediate fire.
    ///
    /// [`fire_now`]: QuizQueue::fire_now
    pub fn update_interval(&mut self, chat_id: ChatId, interval_secs: u64, now: DateTime<Utc>) {
        let interval_secs = interval_secs.max(self.min_interval_secs);
        if let Some(entry) = self.entries.get_mut(&chat_id) {
            entry.interval_secs = interval_secs;
            entry.next_due_at = phase_next_due(now, entry.last_fired_at, interval_secs);
            tracing::info!(chat_id, interval_secs, next_due = %entry.next_due_at, "interval updated");
        }
    }

    /// Pull a chat's next fire down to `now`.
    pub fn fire_now(&mut self, chat_id: ChatId, now: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(&chat_id)
            && entry.next_due_at > now
        {
            entry.next_due_at = now;
        }
    }

    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.entries.contains_key(&chat_id)
    }

    pub fn get(&self, chat_id: ChatId) -> Option<&ScheduleEntry> {
        self.entries.get(&chat_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Next due time on the grid anchored at `reference`, strictly after
/// `now` and at most one interval out. A reference at or after `now`
/// falls back to one full interval.
fn phase_next_due(now: DateTime<Utc>, reference: DateTime<Utc>, interval_secs: u64) -> DateTime<Utc> {
    let interval = Duration::seconds(interval_secs as i64);
    if reference >= now {
        return now + interval;
    }
    let elapsed = (now - reference).num_seconds();
    let remainder = elapsed % interval_secs as i64;
    now + Duration::seconds(interval_secs as i64 - remainder)
}

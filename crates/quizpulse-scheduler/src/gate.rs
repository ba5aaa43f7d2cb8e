//! Delivery Gate — per-chat daily send limits.
//!
//! Counters are keyed by (chat, calendar day), so rollover needs no
//! cleanup: a new day simply reads as zero. The `limit_notified` flag
//! gates the "limit reached" message to exactly one send per day.

use std::sync::Arc;

use chrono::NaiveDate;
use quizpulse_core::Result;
use quizpulse_core::traits::CounterStore;
use quizpulse_core::types::{ChatId, ChatKind};

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Under the cap; the day's counter was incremented.
    Allowed,
    /// At or over the cap; nothing was incremented.
    LimitReached {
        /// Whether the one-time notice already went out today.
        already_notified: bool,
    },
}

/// Enforces daily quiz caps per chat kind.
pub struct DeliveryGate {
    counters: Arc<dyn CounterStore>,
    direct_cap: u32,
    group_cap: u32,
}

impl DeliveryGate {
    pub fn new(counters: Arc<dyn CounterStore>, direct_cap: u32, group_cap: u32) -> Self {
        Self {
            counters,
            direct_cap,
            group_cap,
        }
    }

    /// Daily cap for a chat kind.
    pub fn cap_for(&self, kind: ChatKind) -> u32 {
        match kind {
            ChatKind::Direct => self.direct_cap,
            ChatKind::Group => self.group_cap,
        }
    }

    /// Check the cap and, if allowed, count this send.
    pub fn check_and_increment(
        &self,
        chat_id: ChatId,
        kind: ChatKind,
        day: NaiveDate,
    ) -> Result<GateDecision> {
        let cap = self.cap_for(kind);
        let count = self.counters.day_count(chat_id, day)?;
        if count >= cap {
            let already_notified = self.counters.limit_notified(chat_id, day)?;
            return Ok(GateDecision::LimitReached { already_notified });
        }
        self.counters.increment(chat_id, day)?;
        Ok(GateDecision::Allowed)
    }

    /// Record that the limit notice went out today.
    pub fn mark_notified(&self, chat_id: ChatId, day: NaiveDate) -> Result<()> {
        self.counters.mark_notified(chat_id, day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizpulse_store::memory::MemoryStore;

    fn gate() -> DeliveryGate {
        DeliveryGate::new(Arc::new(MemoryStore::new()), 30, 50)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn direct_chat_capped_at_30_with_single_notice() {
        let gate = gate();
        for n in 1..=30 {
            let decision = gate.check_and_increment(1, ChatKind::Direct, day()).unwrap();
            assert_eq!(decision, GateDecision::Allowed, "send {n} should pass");
        }

        // Call 31 hits the cap, notice not yet sent.
        let decision = gate.check_and_increment(1, ChatKind::Direct, day()).unwrap();
        assert_eq!(
            decision,
            GateDecision::LimitReached {
                already_notified: false
            }
        );
        gate.mark_notified(1, day()).unwrap();

        // Every later attempt that day stays silent.
        for _ in 0..5 {
            let decision = gate.check_and_increment(1, ChatKind::Direct, day()).unwrap();
            assert_eq!(
                decision,
                GateDecision::LimitReached {
                    already_notified: true
                }
            );
        }
    }

    #[test]
    fn group_cap_is_distinct() {
        let gate = gate();
        for _ in 0..50 {
            assert_eq!(
                gate.check_and_increment(-100, ChatKind::Group, day()).unwrap(),
                GateDecision::Allowed
            );
        }
        assert!(matches!(
            gate.check_and_increment(-100, ChatKind::Group, day()).unwrap(),
            GateDecision::LimitReached { .. }
        ));
    }

    #[test]
    fn counters_reset_at_day_rollover() {
        let gate = gate();
        for _ in 0..30 {
            gate.check_and_increment(1, ChatKind::Direct, day()).unwrap();
        }
        assert!(matches!(
            gate.check_and_increment(1, ChatKind::Direct, day()).unwrap(),
            GateDecision::LimitReached { .. }
        ));
        gate.mark_notified(1, day()).unwrap();

        let tomorrow = day().succ_opt().unwrap();
        assert_eq!(
            gate.check_and_increment(1, ChatKind::Direct, tomorrow).unwrap(),
            GateDecision::Allowed
        );
        // The notice flag rolled over too.
        assert!(!gate.counters.limit_notified(1, tomorrow).unwrap());
    }

    #[test]
    fn chats_are_counted_independently() {
        let gate = gate();
        for _ in 0..30 {
            gate.check_and_increment(1, ChatKind::Direct, day()).unwrap();
        }
        assert_eq!(
            gate.check_and_increment(2, ChatKind::Direct, day()).unwrap(),
            GateDecision::Allowed
        );
    }
}

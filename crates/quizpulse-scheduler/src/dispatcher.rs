//! Dispatcher — one quiz delivery attempt for one chat.
//!
//! Checks the daily gate, resolves a question, and sends it through the
//! transport with a bounded in-call retry for transient errors. The
//! result is an explicit [`Outcome`] value; the caller decides how the
//! schedule moves. Nothing here ever blocks another chat: retry sleeps
//! happen inside this chat's own task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use quizpulse_core::traits::{ChatStore, Transport};
use quizpulse_core::types::{ChatId, ChatKind, TransportError};

use crate::gate::{DeliveryGate, GateDecision};
use crate::questions::QuestionSource;

/// Result of one dispatch attempt, as seen by the scheduler queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered, deliberately skipped (capped day, empty category), or
    /// failed in a way that must not stall the cadence. Advances the
    /// schedule to the next interval.
    Success,
    /// Transient delivery failure after bounded retries. Rescheduled
    /// after `wait`, or the configured backoff when `None`.
    Retryable { wait: Option<Duration> },
    /// The chat can no longer receive quizzes; drop its schedule entry.
    Permanent,
}

const MAX_SEND_ATTEMPTS: u32 = 3;
const TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Performs delivery attempts against the external collaborators.
pub struct Dispatcher {
    chats: Arc<dyn ChatStore>,
    transport: Arc<dyn Transport>,
    questions: QuestionSource,
    gate: DeliveryGate,
}

impl Dispatcher {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        transport: Arc<dyn Transport>,
        questions: QuestionSource,
        gate: DeliveryGate,
    ) -> Self {
        Self {
            chats,
            transport,
            questions,
            gate,
        }
    }

    /// Attempt one quiz delivery to `chat_id`.
    pub async fn dispatch(&self, chat_id: ChatId) -> Outcome {
        let record = match self.chats.get(chat_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(chat_id, "scheduled chat has no store record, dropping");
                return Outcome::Permanent;
            }
            Err(e) => {
                // Store outage: skip this cycle, keep the cadence.
                tracing::error!(chat_id, "chat store read failed: {e}");
                return Outcome::Success;
            }
        };

        // A chat stopped or paused after being claimed is not delivered.
        if !record.active || record.paused {
            tracing::debug!(chat_id, "chat no longer active, dropping from schedule");
            return Outcome::Permanent;
        }

        let day = Utc::now().date_naive();
        match self.gate.check_and_increment(chat_id, record.kind, day) {
            Ok(GateDecision::Allowed) => {}
            Ok(GateDecision::LimitReached { already_notified }) => {
                if !already_notified {
                    self.send_limit_notice(chat_id, record.kind, day).await;
                }
                // A capped day is a deliberate skip, not an error.
                return Outcome::Success;
            }
            Err(e) => {
                tracing::error!(chat_id, "counter store failed: {e}");
                return Outcome::Success;
            }
        }

        let pick = match self.questions.next_question(chat_id, &record.category) {
            Ok(Some(pick)) => pick,
            Ok(None) => {
                tracing::warn!(
                    chat_id,
                    category = %record.category,
                    "category has no questions, skipping this cycle"
                );
                return Outcome::Success;
            }
            Err(e) => {
                tracing::error!(chat_id, "question lookup failed: {e}");
                return Outcome::Success;
            }
        };

        if pick.cycle_reset {
            let notice = "All questions in this category have been used. Starting a fresh cycle.";
            if let Err(e) = self.transport.send_text(chat_id, notice).await {
                tracing::warn!(chat_id, "cycle-reset notice failed: {e}");
            }
        }

        self.send_with_retry(chat_id, &pick.question).await
    }

    /// The notice is recorded against the day the gate rejected, not the
    /// send-completion day: a send finishing past midnight must not mark
    /// the fresh day as already notified.
    async fn send_limit_notice(&self, chat_id: ChatId, kind: ChatKind, day: NaiveDate) {
        let cap = self.gate.cap_for(kind);
        let text = format!(
            "Daily limit of {cap} quizzes reached for this {kind} chat. Quizzes resume tomorrow."
        );
        match self.transport.send_text(chat_id, &text).await {
            Ok(()) => {
                if let Err(e) = self.gate.mark_notified(chat_id, day) {
                    tracing::error!(chat_id, "failed to record limit notice: {e}");
                }
            }
            Err(e) => tracing::warn!(chat_id, "limit notice failed: {e}"),
        }
    }

    /// Send the quiz with up to [`MAX_SEND_ATTEMPTS`] tries. Rate limits
    /// wait the server-suggested time, timeouts a fixed delay; anything
    /// unrecognized is surfaced as retryable so no chat is ever silently
    /// dropped on an unknown error.
    async fn send_with_retry(
        &self,
        chat_id: ChatId,
        question: &quizpulse_core::types::Question,
    ) -> Outcome {
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match self.transport.send_quiz(chat_id, question).await {
                Ok(msg) => {
                    tracing::info!(chat_id, message_id = msg.message_id, "quiz delivered");
                    return Outcome::Success;
                }
                Err(TransportError::RateLimited(wait)) => {
                    tracing::warn!(chat_id, attempt, wait = ?wait, "rate limited");
                    if attempt == MAX_SEND_ATTEMPTS {
                        return Outcome::Retryable { wait: Some(wait) };
                    }
                    tokio::time::sleep(wait).await;
                }
                Err(TransportError::Timeout) => {
                    tracing::warn!(chat_id, attempt, "send timed out");
                    if attempt == MAX_SEND_ATTEMPTS {
                        return Outcome::Retryable { wait: None };
                    }
                    tokio::time::sleep(TIMEOUT_RETRY_DELAY).await;
                }
                Err(TransportError::Forbidden(reason)) => {
                    tracing::warn!(chat_id, %reason, "chat unreachable, deactivating");
                    if let Err(e) = self.chats.set_active(chat_id, false) {
                        tracing::error!(chat_id, "failed to deactivate chat: {e}");
                    }
                    return Outcome::Permanent;
                }
                Err(TransportError::Other(e)) => {
                    tracing::error!(chat_id, "unclassified transport error: {e}");
                    return Outcome::Retryable { wait: None };
                }
            }
        }
        Outcome::Retryable { wait: None }
    }
}

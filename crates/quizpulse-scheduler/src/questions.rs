//! Question Source — no-repeat question cycling per chat.
//!
//! eligible = catalog − used. When a chat exhausts its category, the
//! used set resets and the full catalog becomes eligible inside the
//! same call — there is no observable state where a chat has an empty
//! eligible set against a non-empty catalog. Dispatches for a given
//! chat never overlap, so the read-reset-record sequence is safe.

use std::collections::HashSet;
use std::sync::Arc;

use quizpulse_core::Result;
use quizpulse_core::traits::{QuestionCatalog, UsageStore};
use quizpulse_core::types::{ChatId, Question};
use rand::seq::SliceRandom;

/// A question picked for delivery.
#[derive(Debug, Clone)]
pub struct Pick {
    pub question: Question,
    /// True when this pick started a fresh cycle (the chat had used
    /// every question in the category).
    pub cycle_reset: bool,
}

/// Selects the next unused question for a chat, uniformly at random.
pub struct QuestionSource {
    catalog: Arc<dyn QuestionCatalog>,
    usage: Arc<dyn UsageStore>,
}

impl QuestionSource {
    pub fn new(catalog: Arc<dyn QuestionCatalog>, usage: Arc<dyn UsageStore>) -> Self {
        Self { catalog, usage }
    }

    /// Pick the next question for `chat_id` from `category`.
    /// Returns `Ok(None)` when the category has no questions at all.
    pub fn next_question(&self, chat_id: ChatId, category: &str) -> Result<Option<Pick>> {
        let all = self.catalog.load(category);
        if all.is_empty() {
            return Ok(None);
        }

        let used = self.usage.used(chat_id)?;
        let used: HashSet<&str> = used.iter().map(String::as_str).collect();
        let mut eligible: Vec<&Question> =
            all.iter().filter(|q| !used.contains(q.id.as_str())).collect();

        let cycle_reset = eligible.is_empty();
        if cycle_reset {
            self.usage.reset(chat_id)?;
            eligible = all.iter().collect();
            tracing::info!(chat_id, category, "question cycle exhausted, restarting");
        }

        let question = match eligible.choose(&mut rand::thread_rng()) {
            Some(q) => (*q).clone(),
            None => return Ok(None),
        };
        self.usage.record(chat_id, &question.id)?;
        Ok(Some(Pick {
            question,
            cycle_reset,
        }))
    }
}

//! Quiz Engine — owns the schedule and runs the periodic process pass.
//!
//! An explicitly constructed instance (no global state): the driver
//! loop and the chat-control commands both hold an `Arc<QuizEngine>`
//! and every queue mutation goes through its single mutex.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use quizpulse_core::Result;
use quizpulse_core::config::SchedulerConfig;
use quizpulse_core::traits::ChatStore;
use quizpulse_core::types::{ChatId, ChatKind, ChatRecord};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::dispatcher::{Dispatcher, Outcome};
use crate::queue::QuizQueue;

/// The scheduling engine: queue + dispatcher + chat-control surface.
pub struct QuizEngine {
    queue: Mutex<QuizQueue>,
    /// Non-reentrant guard: a tick that arrives while a pass is still
    /// running is a no-op, so a slow transport can never stack up
    /// concurrent dispatch storms.
    processing: AtomicBool,
    dispatcher: Arc<Dispatcher>,
    chats: Arc<dyn ChatStore>,
    max_batch: usize,
    min_interval_secs: u64,
    default_interval_secs: u64,
}

impl QuizEngine {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        chats: Arc<dyn ChatStore>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            queue: Mutex::new(QuizQueue::new(
                config.min_interval_secs,
                config.retry_backoff_secs,
            )),
            processing: AtomicBool::new(false),
            dispatcher,
            chats,
            max_batch: config.max_batch,
            min_interval_secs: config.min_interval_secs,
            default_interval_secs: config.default_interval_secs,
        }
    }

    /// One process pass: dispatch every due chat, oldest due first,
    /// each as its own task so one chat's retry sleep never delays the
    /// others. Returns the number of chats processed; 0 when nothing
    /// was due or a pass was already running.
    pub async fn process(&self, now: DateTime<Utc>) -> usize {
        if self.processing.swap(true, Ordering::SeqCst) {
            tracing::debug!("tick skipped, previous pass still running");
            return 0;
        }
        let processed = self.process_inner(now).await;
        self.processing.store(false, Ordering::SeqCst);
        if processed > 0 {
            tracing::info!(processed, "process pass complete");
        }
        processed
    }

    async fn process_inner(&self, now: DateTime<Utc>) -> usize {
        let due = self.queue.lock().await.due_chats(now, self.max_batch);
        if due.is_empty() {
            return 0;
        }
        tracing::debug!(count = due.len(), "dispatching due chats");

        let mut tasks = JoinSet::new();
        for chat_id in due {
            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move { (chat_id, dispatcher.dispatch(chat_id).await) });
        }

        let mut processed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((chat_id, outcome)) => {
                    self.apply_outcome(chat_id, outcome, now).await;
                    processed += 1;
                }
                // One chat's failure never touches the others.
                Err(e) => tracing::error!("dispatch task failed: {e}"),
            }
        }
        processed
    }

    async fn apply_outcome(&self, chat_id: ChatId, outcome: Outcome, now: DateTime<Utc>) {
        let fired_at = {
            let mut queue = self.queue.lock().await;
            queue.advance(chat_id, &outcome, now);
            match (&outcome, queue.get(chat_id)) {
                (Outcome::Success, Some(entry)) => Some(entry.last_fired_at),
                _ => None,
            }
        };
        // Persist the scheduled fire time so a restart resumes in phase.
        if let Some(at) = fired_at
            && let Err(e) = self.chats.record_fire(chat_id, at)
        {
            tracing::warn!(chat_id, "failed to persist fire time: {e}");
        }
    }

    // ─── Chat control ──────────────────────────────────────────

    /// Start (or restart) a quiz session for a chat.
    pub async fn start_chat(
        &self,
        chat_id: ChatId,
        kind: ChatKind,
        category: &str,
        interval_secs: Option<u64>,
    ) -> Result<()> {
        let existing = self.chats.get(chat_id)?;
        let interval_secs = interval_secs
            .or(existing.as_ref().map(|r| r.interval_secs))
            .unwrap_or(self.default_interval_secs)
            .max(self.min_interval_secs);

        let mut record = existing
            .unwrap_or_else(|| ChatRecord::new(chat_id, kind, category, interval_secs));
        record.active = true;
        record.paused = false;
        record.kind = kind;
        record.category = category.to_string();
        record.interval_secs = interval_secs;
        self.chats.put(&record)?;

        self.queue
            .lock()
            .await
            .upsert(chat_id, interval_secs, Utc::now(), None);
        Ok(())
    }

    /// Stop a chat's session. Returns false if none was running.
    pub async fn stop_chat(&self, chat_id: ChatId) -> Result<bool> {
        let had_session = {
            let mut queue = self.queue.lock().await;
            let had = queue.contains(chat_id);
            queue.remove(chat_id);
            had
        };
        self.chats.set_active(chat_id, false)?;
        Ok(had_session)
    }

    /// Pause: the session stays registered but is unscheduled.
    pub async fn pause_chat(&self, chat_id: ChatId) -> Result<bool> {
        let Some(record) = self.chats.get(chat_id)? else {
            return Ok(false);
        };
        if !record.active || record.paused {
            return Ok(false);
        }
        self.chats.set_paused(chat_id, true)?;
        self.queue.lock().await.remove(chat_id);
        Ok(true)
    }

    /// Resume a paused session, preserving its original fire phase.
    pub async fn resume_chat(&self, chat_id: ChatId) -> Result<bool> {
        let Some(record) = self.chats.get(chat_id)? else {
            return Ok(false);
        };
        if !record.active || !record.paused {
            return Ok(false);
        }
        self.chats.set_paused(chat_id, false)?;
        self.queue.lock().await.upsert(
            chat_id,
            record.interval_secs,
            Utc::now(),
            record.last_fired_at,
        );
        Ok(true)
    }

    /// Change a chat's interval. The floor is applied here, before the
    /// store write, so the persisted value and the live schedule agree.
    pub async fn set_interval(&self, chat_id: ChatId, interval_secs: u64) -> Result<()> {
        let interval_secs = interval_secs.max(self.min_interval_secs);
        self.chats.set_interval(chat_id, interval_secs)?;
        self.queue
            .lock()
            .await
            .update_interval(chat_id, interval_secs, Utc::now());
        Ok(())
    }

    /// Make a chat due immediately (delivered on the next tick).
    pub async fn fire_now(&self, chat_id: ChatId) -> bool {
        let mut queue = self.queue.lock().await;
        let scheduled = queue.contains(chat_id);
        if scheduled {
            queue.fire_now(chat_id, Utc::now());
        }
        scheduled
    }

    /// Rebuild the queue from the chat store at startup. Each chat
    /// resumes on its own grid via the stored last fire time, so a
    /// restart never causes an immediate burst of deliveries.
    pub async fn rehydrate(&self) -> Result<usize> {
        let records = self.chats.list_active()?;
        let now = Utc::now();
        let mut queue = self.queue.lock().await;
        let mut restored = 0;
        for record in records {
            queue.upsert(
                record.chat_id,
                record.interval_secs,
                now,
                record.last_fired_at,
            );
            restored += 1;
        }
        tracing::info!(restored, "rehydrated active chats");
        Ok(restored)
    }

    /// Number of scheduled chats.
    pub async fn scheduled_count(&self) -> usize {
        self.queue.lock().await.len()
    }
}

/// Spawn the driver loop: a fixed-period tick calling [`QuizEngine::process`].
pub fn spawn_driver(engine: Arc<QuizEngine>, tick_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(tick_secs, "scheduler driver started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs.max(1)));
        loop {
            interval.tick().await;
            engine.process(Utc::now()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::DeliveryGate;
    use crate::questions::QuestionSource;
    use async_trait::async_trait;
    use quizpulse_core::types::{MessageRef, Question, TransportError};
    use quizpulse_core::traits::Transport;
    use quizpulse_store::catalog::StaticCatalog;
    use quizpulse_store::memory::MemoryStore;
    use std::sync::Mutex as StdMutex;

    struct CountingTransport {
        sends: StdMutex<Vec<ChatId>>,
        delay: Option<std::time::Duration>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send_quiz(
            &self,
            chat_id: ChatId,
            _question: &Question,
        ) -> std::result::Result<MessageRef, TransportError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.sends.lock().unwrap().push(chat_id);
            Ok(MessageRef {
                chat_id,
                message_id: 1,
            })
        }

        async fn send_text(
            &self,
            _chat_id: ChatId,
            _text: &str,
        ) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            options: vec!["a".into(), "b".into()],
            correct_option: 0,
        }
    }

    fn build_engine(
        delay: Option<std::time::Duration>,
    ) -> (Arc<QuizEngine>, Arc<MemoryStore>, Arc<CountingTransport>) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(CountingTransport {
            sends: StdMutex::new(Vec::new()),
            delay,
        });
        let catalog = Arc::new(StaticCatalog::new(vec![(
            "ssc".to_string(),
            (0..100).map(|i| question(&format!("q{i}"))).collect(),
        )]));
        let questions = QuestionSource::new(catalog, store.clone());
        let gate = DeliveryGate::new(store.clone(), 1000, 1000);
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            transport.clone(),
            questions,
            gate,
        ));
        let engine = Arc::new(QuizEngine::new(
            dispatcher,
            store.clone(),
            &SchedulerConfig::default(),
        ));
        (engine, store, transport)
    }

    #[tokio::test]
    async fn due_chat_is_dispatched_once() {
        let (engine, _store, transport) = build_engine(None);
        engine
            .start_chat(1, ChatKind::Direct, "ssc", Some(30))
            .await
            .unwrap();
        engine.fire_now(1).await;

        let processed = engine.process(Utc::now()).await;
        assert_eq!(processed, 1);
        assert_eq!(transport.sends.lock().unwrap().as_slice(), &[1]);

        // Not due again right away.
        assert_eq!(engine.process(Utc::now()).await, 0);
    }

    #[tokio::test]
    async fn success_records_fire_time_in_store() {
        let (engine, store, _transport) = build_engine(None);
        engine
            .start_chat(1, ChatKind::Direct, "ssc", Some(30))
            .await
            .unwrap();
        engine.fire_now(1).await;
        engine.process(Utc::now()).await;
        assert!(store.get(1).unwrap().unwrap().last_fired_at.is_some());
    }

    #[tokio::test]
    async fn overlapping_process_is_noop() {
        let (engine, _store, transport) = build_engine(Some(std::time::Duration::from_millis(200)));
        engine
            .start_chat(1, ChatKind::Direct, "ssc", Some(30))
            .await
            .unwrap();
        engine.fire_now(1).await;

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.process(Utc::now()).await })
        };
        // Give the first pass time to claim the chat and start sending.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let overlapped = engine.process(Utc::now()).await;
        assert_eq!(overlapped, 0);

        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(transport.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stopped_chat_is_not_dispatched() {
        let (engine, store, transport) = build_engine(None);
        engine
            .start_chat(1, ChatKind::Direct, "ssc", Some(30))
            .await
            .unwrap();
        engine.fire_now(1).await;
        assert!(engine.stop_chat(1).await.unwrap());

        assert_eq!(engine.process(Utc::now()).await, 0);
        assert!(transport.sends.lock().unwrap().is_empty());
        assert!(!store.get(1).unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn pause_and_resume_round_trip() {
        let (engine, _store, transport) = build_engine(None);
        engine
            .start_chat(1, ChatKind::Direct, "ssc", Some(30))
            .await
            .unwrap();
        assert!(engine.pause_chat(1).await.unwrap());
        assert_eq!(engine.scheduled_count().await, 0);

        // Pausing twice reports nothing to do.
        assert!(!engine.pause_chat(1).await.unwrap());

        assert!(engine.resume_chat(1).await.unwrap());
        assert_eq!(engine.scheduled_count().await, 1);

        engine.fire_now(1).await;
        assert_eq!(engine.process(Utc::now()).await, 1);
        assert_eq!(transport.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_interval_floor_reaches_the_store() {
        let (engine, store, _transport) = build_engine(None);
        engine
            .start_chat(1, ChatKind::Direct, "ssc", Some(30))
            .await
            .unwrap();
        engine.set_interval(1, 3).await.unwrap();
        // Persisted value matches what the queue schedules with.
        assert_eq!(store.get(1).unwrap().unwrap().interval_secs, 10);
    }

    #[tokio::test]
    async fn rehydrate_restores_only_running_sessions() {
        let (engine, store, _transport) = build_engine(None);

        let mut active = ChatRecord::new(1, ChatKind::Direct, "ssc", 30);
        active.active = true;
        store.put(&active).unwrap();

        let mut paused = ChatRecord::new(2, ChatKind::Direct, "ssc", 30);
        paused.active = true;
        paused.paused = true;
        store.put(&paused).unwrap();

        let stopped = ChatRecord::new(3, ChatKind::Group, "ssc", 30);
        store.put(&stopped).unwrap();

        assert_eq!(engine.rehydrate().await.unwrap(), 1);
        assert_eq!(engine.scheduled_count().await, 1);
    }

    #[tokio::test]
    async fn rehydrate_preserves_phase_no_immediate_fire() {
        let (engine, store, transport) = build_engine(None);
        let mut record = ChatRecord::new(1, ChatKind::Direct, "ssc", 3600);
        record.active = true;
        // Mid-cycle: last fired half an hour ago on a 1h interval.
        record.last_fired_at = Some(Utc::now() - chrono::Duration::seconds(1800));
        store.put(&record).unwrap();

        engine.rehydrate().await.unwrap();
        assert_eq!(engine.process(Utc::now()).await, 0);
        assert!(transport.sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn burst_of_due_chats_all_processed() {
        let (engine, _store, transport) = build_engine(None);
        for chat_id in 1..=20 {
            engine
                .start_chat(chat_id, ChatKind::Direct, "ssc", Some(30))
                .await
                .unwrap();
            engine.fire_now(chat_id).await;
        }
        assert_eq!(engine.process(Utc::now()).await, 20);
        let mut sends = transport.sends.lock().unwrap().clone();
        sends.sort_unstable();
        assert_eq!(sends, (1..=20).collect::<Vec<_>>());
    }
}

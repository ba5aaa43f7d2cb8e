//! # QuizPulse Scheduler
//!
//! The scheduling core: tracks every chat's next due time, dispatches
//! quizzes when they come due, and keeps per-chat cadence exact even
//! when ticks are late or deliveries fail.
//!
//! ## Architecture
//! ```text
//! Driver (tokio interval, 1-5s)
//!   └── Engine::process (non-reentrant)
//!         ├── QuizQueue::due_chats — oldest-due first, batch capped
//!         ├── Dispatcher::dispatch per chat (independent tasks)
//!         │     ├── DeliveryGate — daily cap, one-shot limit notice
//!         │     ├── QuestionSource — no-repeat cycling
//!         │     └── Transport — send with bounded retry
//!         └── QuizQueue::advance — anchor to scheduled time, not now
//! ```

pub mod dispatcher;
pub mod engine;
pub mod gate;
pub mod questions;
pub mod queue;

pub use dispatcher::{Dispatcher, Outcome};
pub use engine::{QuizEngine, spawn_driver};
pub use gate::{DeliveryGate, GateDecision};
pub use questions::{Pick, QuestionSource};
pub use queue::{QuizQueue, ScheduleEntry};

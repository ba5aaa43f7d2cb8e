//! Chat command handling — parses inbound `/commands` and drives the
//! engine's chat-control surface.

use std::sync::Arc;

use quizpulse_channels::ChatMessage;
use quizpulse_core::traits::{ChatStore, QuestionCatalog, Transport};
use quizpulse_scheduler::QuizEngine;

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { category: Option<String> },
    Stop,
    Pause,
    Resume,
    SetInterval(Option<u64>),
    Next,
    Help,
}

impl Command {
    /// Parse a message text. Returns None for plain chatter; commands
    /// may carry a `@botname` suffix in groups.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?;
        if !head.starts_with('/') {
            return None;
        }
        let name = head
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or_default();
        match name {
            "start" => Some(Command::Start {
                category: parts.next().map(|s| s.to_lowercase()),
            }),
            "stop" => Some(Command::Stop),
            "pause" => Some(Command::Pause),
            "resume" => Some(Command::Resume),
            "setinterval" => Some(Command::SetInterval(
                parts.next().and_then(|s| s.parse().ok()),
            )),
            "next" => Some(Command::Next),
            "help" => Some(Command::Help),
            _ => None,
        }
    }
}

/// Routes parsed commands to the engine and replies over the transport.
pub struct CommandRouter {
    engine: Arc<QuizEngine>,
    chats: Arc<dyn ChatStore>,
    catalog: Arc<dyn QuestionCatalog>,
    transport: Arc<dyn Transport>,
    min_interval_secs: u64,
}

impl CommandRouter {
    pub fn new(
        engine: Arc<QuizEngine>,
        chats: Arc<dyn ChatStore>,
        catalog: Arc<dyn QuestionCatalog>,
        transport: Arc<dyn Transport>,
        min_interval_secs: u64,
    ) -> Self {
        Self {
            engine,
            chats,
            catalog,
            transport,
            min_interval_secs,
        }
    }

    /// Handle one inbound message. Non-commands are ignored.
    pub async fn handle(&self, msg: ChatMessage) {
        let Some(command) = Command::parse(&msg.text) else {
            return;
        };
        tracing::debug!(chat_id = msg.chat_id, ?command, "handling command");
        let reply = match self.execute(&msg, command).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(chat_id = msg.chat_id, "command failed: {e}");
                "Something went wrong, please try again.".to_string()
            }
        };
        if let Err(e) = self.transport.send_text(msg.chat_id, &reply).await {
            tracing::warn!(chat_id = msg.chat_id, "command reply failed: {e}");
        }
    }

    async fn execute(
        &self,
        msg: &ChatMessage,
        command: Command,
    ) -> quizpulse_core::Result<String> {
        match command {
            Command::Start { category } => self.start(msg, category).await,
            Command::Stop => Ok(if self.engine.stop_chat(msg.chat_id).await? {
                "Quiz stopped successfully.".to_string()
            } else {
                "No active quiz to stop.".to_string()
            }),
            Command::Pause => Ok(if self.engine.pause_chat(msg.chat_id).await? {
                "Quiz paused successfully.".to_string()
            } else {
                "No active quiz to pause.".to_string()
            }),
            Command::Resume => Ok(if self.engine.resume_chat(msg.chat_id).await? {
                "Quiz resumed successfully.".to_string()
            } else {
                "No paused quiz to resume.".to_string()
            }),
            Command::SetInterval(value) => self.set_interval(msg, value).await,
            Command::Next => Ok(if self.engine.fire_now(msg.chat_id).await {
                "Next quiz is on its way.".to_string()
            } else {
                "No active quiz. Use /start to begin a quiz session.".to_string()
            }),
            Command::Help => Ok(help_text(&self.catalog.categories())),
        }
    }

    async fn start(
        &self,
        msg: &ChatMessage,
        category: Option<String>,
    ) -> quizpulse_core::Result<String> {
        let existing = self.chats.get(msg.chat_id)?;
        if let Some(record) = &existing
            && record.active
            && !record.paused
        {
            return Ok("A quiz is already running in this chat!".to_string());
        }

        let categories = self.catalog.categories();
        let category = match category {
            Some(name) if categories.contains(&name) => name,
            Some(name) => {
                return Ok(format!(
                    "Unknown category '{name}'. Available: {}",
                    categories.join(", ")
                ));
            }
            None => match existing
                .as_ref()
                .filter(|r| !r.category.is_empty())
                .map(|r| r.category.clone())
                .or_else(|| categories.first().cloned())
            {
                Some(name) => name,
                None => return Ok("No quiz categories are loaded.".to_string()),
            },
        };

        self.engine
            .start_chat(msg.chat_id, msg.kind, &category, None)
            .await?;
        // First quiz goes out on the next tick.
        self.engine.fire_now(msg.chat_id).await;

        Ok(format!(
            "Quiz started successfully!\nCategory: {category}\nUse /setinterval <seconds> to change the pace."
        ))
    }

    async fn set_interval(
        &self,
        msg: &ChatMessage,
        value: Option<u64>,
    ) -> quizpulse_core::Result<String> {
        let Some(interval) = value else {
            return Ok("Usage: /setinterval <seconds>".to_string());
        };
        if interval < self.min_interval_secs {
            return Ok(format!(
                "Interval must be at least {} seconds.",
                self.min_interval_secs
            ));
        }
        if self.chats.get(msg.chat_id)?.is_none() {
            return Ok("No quiz session here yet. Use /start first.".to_string());
        }
        self.engine.set_interval(msg.chat_id, interval).await?;
        Ok(format!("Quiz interval updated to {interval} seconds."))
    }
}

fn help_text(categories: &[String]) -> String {
    format!(
        "QuizPulse commands:\n\
         /start [category] - Start quizzes in this chat\n\
         /stop - Stop the quiz session\n\
         /pause - Pause without losing your place\n\
         /resume - Resume a paused session\n\
         /setinterval <seconds> - Set the interval for quizzes\n\
         /next - Send the next quiz now\n\
         Categories: {}",
        categories.join(", ")
    )
}

//! Telegram Bot API transport — quiz polls out, commands in via long
//! polling.
//!
//! Delivery failures are classified into the transport error taxonomy
//! the dispatcher retries on: 429 responses carry the server's
//! `retry_after`, network timeouts map to `Timeout`, and 403 (bot
//! blocked or kicked) maps to `Forbidden` so the chat gets deactivated.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use quizpulse_core::config::TelegramConfig;
use quizpulse_core::error::{QuizPulseError, Result};
use quizpulse_core::types::{ChatId, ChatKind, MessageRef, Question, TransportError};
use serde::Deserialize;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Request deadline for sends. A stalled connection must surface as
/// `TransportError::Timeout` rather than pending forever: the engine's
/// process pass joins every dispatch task, so one hung send would stop
/// all chats from firing.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram quiz transport backed by the Bot API.
pub struct TelegramTransport {
    config: TelegramConfig,
    client: reqwest::Client,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        Self::with_timeout(config, SEND_TIMEOUT)
    }

    fn with_timeout(config: TelegramConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuizPulseError::Transport(e.to_string()))?;
        Ok(Self {
            config,
            client,
            base_url: TELEGRAM_API.to_string(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.config.bot_token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<T, TransportError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let api: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Other(format!("invalid {method} response: {e}")))?;

        if api.ok {
            api.result
                .ok_or_else(|| TransportError::Other(format!("{method}: empty result")))
        } else {
            Err(classify_api_error(&api))
        }
    }
}

#[async_trait]
impl quizpulse_core::traits::Transport for TelegramTransport {
    async fn send_quiz(
        &self,
        chat_id: ChatId,
        question: &Question,
    ) -> std::result::Result<MessageRef, TransportError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "question": question.prompt,
            "options": question.options,
            "type": "quiz",
            "correct_option_id": question.correct_option,
            "is_anonymous": false,
        });
        let message: TelegramMessage = self.call("sendPoll", &body).await?;
        Ok(MessageRef {
            chat_id,
            message_id: message.message_id,
        })
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> std::result::Result<(), TransportError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let _: TelegramMessage = self.call("sendMessage", &body).await?;
        Ok(())
    }
}

fn classify_request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() || e.is_connect() {
        TransportError::Timeout
    } else {
        TransportError::Other(e.to_string())
    }
}

fn classify_api_error<T>(api: &ApiResponse<T>) -> TransportError {
    let description = api.description.clone().unwrap_or_default();
    match api.error_code {
        Some(429) => {
            let wait = api
                .parameters
                .as_ref()
                .and_then(|p| p.retry_after)
                .unwrap_or(30);
            TransportError::RateLimited(Duration::from_secs(wait))
        }
        Some(403) => TransportError::Forbidden(description),
        // "chat not found" means the chat was deleted; retrying is pointless.
        Some(400) if description.contains("chat not found") => {
            TransportError::Forbidden(description)
        }
        _ => TransportError::Other(description),
    }
}

/// Inbound command polling. Separate from the transport because
/// `getUpdates` tracks a cursor.
pub struct TelegramPoller {
    config: TelegramConfig,
    client: reqwest::Client,
    last_update_id: i64,
}

impl TelegramPoller {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            // No client-side deadline here: getUpdates long-polls and is
            // bounded by the 30s server-side timeout parameter.
            client: reqwest::Client::new(),
            last_update_id: 0,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// Get updates using long polling.
    pub async fn get_updates(&mut self) -> std::result::Result<Vec<TelegramUpdate>, TransportError> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", (self.last_update_id + 1).to_string()),
                ("timeout", "30".into()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .send()
            .await
            .map_err(classify_request_error)?;

        let api: ApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| TransportError::Other(format!("invalid getUpdates response: {e}")))?;

        if !api.ok {
            return Err(classify_api_error(&api));
        }

        let updates = api.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Verify the token and log the bot identity.
    pub async fn check_identity(&self) -> std::result::Result<(), TransportError> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(classify_request_error)?;
        let api: ApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| TransportError::Other(format!("invalid getMe response: {e}")))?;
        match api.result {
            Some(me) => {
                tracing::info!(
                    username = me.username.as_deref().unwrap_or("unknown"),
                    "Telegram bot connected"
                );
                Ok(())
            }
            None => Err(classify_api_error(&api)),
        }
    }

    /// Start the polling loop — returns a stream of inbound messages.
    pub fn start_polling(self) -> ChatMessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut poller = self;
            tracing::info!("Telegram polling loop started");

            loop {
                match poller.get_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(msg) = update.to_chat_message()
                                && tx.send(msg).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }

                tokio::time::sleep(Duration::from_secs(poller.config.poll_interval)).await;
            }
        });

        ChatMessageStream { rx }
    }
}

/// A text message received from a chat.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub kind: ChatKind,
    pub text: String,
}

/// Stream of inbound chat messages from polling.
pub struct ChatMessageStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<ChatMessage>,
}

impl Stream for ChatMessageStream {
    type Item = ChatMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Unpin for ChatMessageStream {}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl TelegramUpdate {
    /// Extract a command-bearing chat message, skipping bot echoes.
    pub fn to_chat_message(&self) -> Option<ChatMessage> {
        let msg = self.message.as_ref()?;
        let text = msg.text.as_ref()?;
        if let Some(from) = msg.from.as_ref()
            && from.is_bot
        {
            return None;
        }
        Some(ChatMessage {
            chat_id: msg.chat.id,
            kind: ChatKind::from_telegram(&msg.chat.chat_type),
            text: text.clone(),
        })
    }
}

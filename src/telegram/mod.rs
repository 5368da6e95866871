//! Minimal Telegram Bot API client: long polling and plain-text replies.

pub mod types;

pub use types::{Message, Update, User};

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use types::{ApiResponse, GetUpdatesRequest, SendMessageRequest};

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Slack on top of the long-poll timeout before the HTTP request is abandoned.
const POLL_GRACE: Duration = Duration::from_secs(10);
/// Bot API limit on message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;
const ALLOWED_UPDATES: &[&str] = &["message"];

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Telegram rejected the bot token. Check TELEGRAM_API_TOKEN.")]
    Unauthorized,

    #[error("Telegram rate limit exceeded (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Telegram API error ({code}): {description}")]
    Api { code: u16, description: String },

    #[error("Network error: {0}")]
    Network(reqwest::Error),
}

impl From<reqwest::Error> for TelegramError {
    // Request URLs embed the bot token.
    fn from(e: reqwest::Error) -> Self {
        TelegramError::Network(e.without_url())
    }
}

#[derive(Clone)]
struct BotToken(String);

impl std::fmt::Debug for BotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Clone, Debug)]
pub struct TelegramClient {
    http: Client,
    token: BotToken,
    base_url: String,
}

impl TelegramClient {
    pub fn new(http: Client, token: &str) -> Self {
        Self {
            http,
            token: BotToken(token.to_string()),
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            token: BotToken("test-token".to_string()),
            base_url: base_url.to_string(),
        }
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, TelegramError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        debug_assert!(
            self.base_url.starts_with("https://") || cfg!(test),
            "bot token must only be sent over HTTPS"
        );
        let url = format!("{}/bot{}/{method}", self.base_url, self.token.0);

        let response = self
            .http
            .post(&url)
            .header("User-Agent", crate::USER_AGENT)
            .json(body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TelegramError::Unauthorized);
        }

        let text = response.text().await?;
        let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) => {
                let snippet: String = text.chars().take(200).collect();
                warn!(status = %status, method, "Telegram API error (no structured body)");
                return Err(TelegramError::Api {
                    code: status.as_u16(),
                    description: format!("HTTP {status}: {snippet}"),
                });
            }
        };

        if !envelope.ok {
            let code = envelope.error_code.unwrap_or(status.as_u16());
            if code == 429 {
                return Err(TelegramError::RateLimited {
                    retry_after: envelope.parameters.and_then(|p| p.retry_after),
                });
            }
            return Err(TelegramError::Api {
                code,
                description: envelope
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        envelope.result.ok_or_else(|| TelegramError::Api {
            code: status.as_u16(),
            description: format!("{method} returned no result"),
        })
    }

    /// The bot's own account, used to recognise `/command@botname` addressing.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT)
            .await
    }

    /// Long-polls for message updates, waiting up to `timeout_secs` for new ones.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: ALLOWED_UPDATES,
        };
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &request,
                Duration::from_secs(timeout_secs) + POLL_GRACE,
            )
            .await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "updates received");
        }
        Ok(updates)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let text = truncate_message(text);
        let request = SendMessageRequest {
            chat_id,
            text: &text,
        };
        let _: Message = self.call("sendMessage", &request, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

/// Cuts text to the Bot API message limit, marking the cut with an ellipsis.
pub fn truncate_message(text: &str) -> std::borrow::Cow<'_, str> {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        None => std::borrow::Cow::Borrowed(text),
        Some(_) => {
            let mut out: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
            out.push('…');
            std::borrow::Cow::Owned(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_untouched() {
        assert_eq!(truncate_message("hello"), "hello");
        let exact = "a".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(truncate_message(&exact), exact);
    }

    #[test]
    fn long_message_is_cut_on_char_boundary() {
        let long = "ü".repeat(MAX_MESSAGE_CHARS + 10);
        let cut = truncate_message(&long);
        assert_eq!(cut.chars().count(), MAX_MESSAGE_CHARS);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let client = TelegramClient::new(Client::new(), "123:secret");
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"), "got: {debug}");
        assert!(debug.contains("[REDACTED]"));
    }
}

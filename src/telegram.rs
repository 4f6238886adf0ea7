//! Minimal Telegram Bot API client over `reqwest`.
//!
//! Only the calls the bot needs: `sendMessage`, `getUpdates` and
//! `getChatMemberCount`. Every call is a JSON POST to
//! `{api_base}/bot{token}/{method}` and every reply is the standard
//! `{"ok": .., "result": ..}` envelope.

use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

/// Default timeout for non-polling calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram API errors
#[derive(Debug, Error)]
pub enum TelegramError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Telegram API returned `ok: false`
    #[error("Telegram API error {code:?}: {description}")]
    Api {
        code: Option<i64>,
        description: String,
    },

    /// Reply body was not the expected envelope
    #[error("unexpected Telegram reply: {0}")]
    Decode(String),
}

/// A chat addressed either by numeric id or by `@username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        ChatId::Id(id)
    }
}

impl From<&str> for ChatId {
    /// Numeric strings (`-100123…`) become ids, anything else a username.
    fn from(s: &str) -> Self {
        match s.trim().parse::<i64>() {
            Ok(id) => ChatId::Id(id),
            Err(_) => ChatId::Username(s.trim().to_string()),
        }
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{id}"),
            ChatId::Username(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

/// Persistent reply keyboard shown under the input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyKeyboard {
    keyboard: Vec<Vec<KeyboardButton>>,
    resize_keyboard: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct KeyboardButton {
    text: String,
}

impl ReplyKeyboard {
    pub fn new(rows: &[&[&str]]) -> Self {
        let keyboard = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|text| KeyboardButton {
                        text: text.to_string(),
                    })
                    .collect()
            })
            .collect();
        Self {
            keyboard,
            resize_keyboard: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Telegram Bot API client
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self, TelegramError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
        })
    }

    /// Send an HTML message with link previews disabled.
    #[instrument(level = "info", skip(self, text, keyboard), fields(chat = %chat_id, len = text.len()))]
    pub async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<Message, TelegramError> {
        let mut params = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(keyboard) = keyboard {
            params["reply_markup"] = json!(keyboard);
        }
        self.call("sendMessage", &params, None).await
    }

    /// Long-poll for updates after `offset`, waiting up to `timeout`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let params = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        // The HTTP timeout must outlast the server-side wait.
        let http_timeout = timeout + Duration::from_secs(10);
        self.call("getUpdates", &params, Some(http_timeout)).await
    }

    #[instrument(level = "info", skip(self), fields(chat = %chat_id))]
    pub async fn get_chat_member_count(&self, chat_id: &ChatId) -> Result<u64, TelegramError> {
        self.call("getChatMemberCount", &json!({ "chat_id": chat_id }), None)
            .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/{}", self.base, method);
        let mut request = self.client.post(&url).json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            error!(
                method,
                status = status.as_u16(),
                body = %truncate_for_log(&body, 300),
                "Undecodable Telegram reply"
            );
            TelegramError::Decode(e.to_string())
        })?;

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(TelegramError::Api {
                code: envelope.error_code,
                description,
            });
        }
        debug!(method, "Telegram call succeeded");
        envelope
            .result
            .ok_or_else(|| TelegramError::Decode(format!("{method}: missing result")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(&server.base_url(), "123:abc").unwrap()
    }

    #[test]
    fn test_chat_id_from_str() {
        assert_eq!(ChatId::from("-100123"), ChatId::Id(-100123));
        assert_eq!(ChatId::from("@news"), ChatId::Username("@news".into()));
        assert_eq!(serde_json::to_value(ChatId::Id(5)).unwrap(), json!(5));
        assert_eq!(
            serde_json::to_value(ChatId::from("@news")).unwrap(),
            json!("@news")
        );
    }

    #[test]
    fn test_reply_keyboard_shape() {
        let kb = ReplyKeyboard::new(&[&["a", "b"], &["c"]]);
        assert_eq!(
            serde_json::to_value(&kb).unwrap(),
            json!({
                "keyboard": [[{"text": "a"}, {"text": "b"}], [{"text": "c"}]],
                "resize_keyboard": true
            })
        );
    }

    #[tokio::test]
    async fn test_send_message_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/bot123:abc/sendMessage")
                    .json_body(json!({
                        "chat_id": "@news",
                        "text": "<b>hi</b>",
                        "parse_mode": "HTML",
                        "disable_web_page_preview": true,
                    }));
                then.status(200).json_body(json!({
                    "ok": true,
                    "result": {"message_id": 7, "chat": {"id": -100}}
                }));
            })
            .await;

        let message = client(&server)
            .send_message(&ChatId::from("@news"), "<b>hi</b>", None)
            .await
            .unwrap();
        assert_eq!(message.message_id, 7);
        assert_eq!(message.chat.id, -100);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bot123:abc/sendMessage");
                then.status(403).json_body(json!({
                    "ok": false,
                    "error_code": 403,
                    "description": "Forbidden: bot is not a member of the channel chat"
                }));
            })
            .await;

        let err = client(&server)
            .send_message(&ChatId::Id(1), "x", None)
            .await
            .unwrap_err();
        match err {
            TelegramError::Api { code, description } => {
                assert_eq!(code, Some(403));
                assert!(description.starts_with("Forbidden"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_reply_is_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bot123:abc/getChatMemberCount");
                then.status(502).body("<html>Bad Gateway</html>");
            })
            .await;

        let err = client(&server)
            .get_chat_member_count(&ChatId::Id(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TelegramError::Decode(_)));
    }

    #[tokio::test]
    async fn test_get_chat_member_count() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bot123:abc/getChatMemberCount");
                then.status(200).json_body(json!({"ok": true, "result": 1234}));
            })
            .await;

        let count = client(&server)
            .get_chat_member_count(&ChatId::from("@news"))
            .await
            .unwrap();
        assert_eq!(count, 1234);
    }

    #[tokio::test]
    async fn test_get_updates_parses_messages() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bot123:abc/getUpdates");
                then.status(200).json_body(json!({
                    "ok": true,
                    "result": [
                        {"update_id": 10, "message": {
                            "message_id": 1,
                            "chat": {"id": 42, "type": "private"},
                            "from": {"id": 42, "is_bot": false, "first_name": "A"},
                            "text": "/start"
                        }},
                        {"update_id": 11}
                    ]
                }));
            })
            .await;

        let updates = client(&server)
            .get_updates(0, Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(updates.len(), 2);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("/start"));
        assert!(updates[1].message.is_none());
    }
}

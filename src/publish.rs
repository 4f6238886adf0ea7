//! Where a rendered digest goes.
//!
//! Both the command surface and the scheduler hand their output to a
//! [`PublicationTarget`] instead of talking to Telegram directly:
//!
//! | Target | Destination |
//! |--------|-------------|
//! | [`ChannelTarget`] | the configured channel, no keyboard |
//! | [`ChatTarget`] | the chat that issued a command, with the menu keyboard |

use crate::telegram::{ChatId, ReplyKeyboard, TelegramClient, TelegramError};
use std::future::Future;
use tracing::{error, info};

/// Capability to deliver a rendered HTML message somewhere.
pub trait PublicationTarget {
    /// Deliver `text`. A failure is reported, never retried.
    fn publish(&self, text: &str) -> impl Future<Output = Result<(), TelegramError>> + Send;

    /// Short human-readable destination for logs.
    fn destination(&self) -> String;
}

/// The broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelTarget {
    client: TelegramClient,
    channel: ChatId,
}

impl ChannelTarget {
    pub fn new(client: TelegramClient, channel: ChatId) -> Self {
        Self { client, channel }
    }
}

impl PublicationTarget for ChannelTarget {
    async fn publish(&self, text: &str) -> Result<(), TelegramError> {
        match self.client.send_message(&self.channel, text, None).await {
            Ok(message) => {
                info!(channel = %self.channel, message_id = message.message_id, "Published to channel");
                Ok(())
            }
            Err(e) => {
                error!(channel = %self.channel, error = %e, "Channel publication failed");
                Err(e)
            }
        }
    }

    fn destination(&self) -> String {
        format!("channel {}", self.channel)
    }
}

/// An interactive chat, answered with the menu keyboard attached.
#[derive(Debug, Clone)]
pub struct ChatTarget {
    client: TelegramClient,
    chat: ChatId,
    keyboard: Option<ReplyKeyboard>,
}

impl ChatTarget {
    pub fn new(client: TelegramClient, chat: ChatId, keyboard: Option<ReplyKeyboard>) -> Self {
        Self {
            client,
            chat,
            keyboard,
        }
    }
}

impl PublicationTarget for ChatTarget {
    async fn publish(&self, text: &str) -> Result<(), TelegramError> {
        self.client
            .send_message(&self.chat, text, self.keyboard.as_ref())
            .await
            .map(|_| ())
    }

    fn destination(&self) -> String {
        format!("chat {}", self.chat)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Keeps every published message in memory; optionally fails instead.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingTarget {
        sent: Arc<Mutex<Vec<String>>>,
        pub(crate) fail: bool,
        /// Fail only messages containing this text.
        reject_containing: Option<String>,
    }

    impl RecordingTarget {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub(crate) fn rejecting(pattern: &str) -> Self {
            Self {
                reject_containing: Some(pattern.to_string()),
                ..Default::default()
            }
        }

        pub(crate) fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl PublicationTarget for RecordingTarget {
        async fn publish(&self, text: &str) -> Result<(), TelegramError> {
            let rejected = self
                .reject_containing
                .as_deref()
                .is_some_and(|pattern| text.contains(pattern));
            if self.fail || rejected {
                return Err(TelegramError::Api {
                    code: Some(403),
                    description: "Forbidden: bot was kicked".to_string(),
                });
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn destination(&self) -> String {
            "recording".to_string()
        }
    }

    #[tokio::test]
    async fn test_channel_target_sends_to_channel() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/bot1:x/sendMessage").json_body(json!({
                    "chat_id": "@news",
                    "text": "digest",
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }));
                then.status(200).json_body(json!({
                    "ok": true,
                    "result": {"message_id": 1, "chat": {"id": -1}}
                }));
            })
            .await;

        let client = TelegramClient::new(&server.base_url(), "1:x").unwrap();
        let target = ChannelTarget::new(client, ChatId::from("@news"));
        target.publish("digest").await.unwrap();
        assert_eq!(target.destination(), "channel @news");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_target_attaches_keyboard() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/bot1:x/sendMessage").json_body(json!({
                    "chat_id": 42,
                    "text": "hello",
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                    "reply_markup": {"keyboard": [[{"text": "menu"}]], "resize_keyboard": true},
                }));
                then.status(200).json_body(json!({
                    "ok": true,
                    "result": {"message_id": 2, "chat": {"id": 42}}
                }));
            })
            .await;

        let client = TelegramClient::new(&server.base_url(), "1:x").unwrap();
        let target = ChatTarget::new(client, ChatId::Id(42), Some(ReplyKeyboard::new(&[&["menu"]])));
        target.publish("hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_channel_target_reports_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bot1:x/sendMessage");
                then.status(400).json_body(json!({
                    "ok": false, "error_code": 400, "description": "Bad Request: chat not found"
                }));
            })
            .await;

        let client = TelegramClient::new(&server.base_url(), "1:x").unwrap();
        let target = ChannelTarget::new(client, ChatId::from("@missing"));
        assert!(target.publish("digest").await.is_err());
    }
}

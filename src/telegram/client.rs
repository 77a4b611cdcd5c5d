//! Telegram Bot API 客户端

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::types::{ApiResponse, Message, ParseMode, Update, User};
use crate::config::config::TelegramConfig;
use crate::error::{AppError, Result};

/// Extra time over the long-polling timeout before a request is abandoned
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
    disable_web_page_preview: bool,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs) + POLL_GRACE)
            .build()?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
        })
    }

    async fn call<B: Serialize, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Telegram(format!("{} failed: {}", method, e.without_url())))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::Telegram(format!("{}: bad response: {}", method, e.without_url())))?;

        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(AppError::Telegram(format!(
                "{} rejected ({}): {}",
                method,
                envelope.error_code.unwrap_or_default(),
                envelope.description.unwrap_or_default()
            ))),
        }
    }

    /// Long-poll for updates with an id of at least `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &serde_json::json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message"],
                }),
            )
            .await?;
        if !updates.is_empty() {
            debug!("Received {} updates", updates.len());
        }
        Ok(updates)
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<Message> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id,
                text,
                parse_mode,
                disable_web_page_preview: true,
            },
        )
        .await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &EditMessageText {
                    chat_id,
                    message_id,
                    text,
                    parse_mode,
                    disable_web_page_preview: true,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool> {
        self.call(
            "deleteWebhook",
            &serde_json::json!({ "drop_pending_updates": drop_pending_updates }),
        )
        .await
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(&TelegramConfig {
            bot_token: "123:abc".into(),
            api_url: server.uri(),
            poll_timeout_secs: 1,
            ..TelegramConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_updates_sends_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .and(body_partial_json(serde_json::json!({ "offset": 42, "timeout": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [{"update_id": 42, "message": {
                    "message_id": 3, "chat": {"id": 9}, "text": "hi"
                }}]
            })))
            .mount(&server)
            .await;

        let updates = client(&server).get_updates(42, 1).await.unwrap();
        assert_eq!(updates[0].update_id, 42);
    }

    #[tokio::test]
    async fn test_send_message_with_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": 9,
                "text": "*hi*",
                "parse_mode": "MarkdownV2",
                "disable_web_page_preview": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 77, "chat": {"id": 9}, "text": "hi"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sent = client(&server)
            .send_message(9, "*hi*", Some(ParseMode::MarkdownV2))
            .await
            .unwrap();
        assert_eq!(sent.message_id, 77);
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/editMessageText"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message is not modified"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .edit_message_text(9, 1, "same", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Telegram(_)));
        assert!(err.to_string().contains("not modified"));
    }

    #[tokio::test]
    async fn test_delete_webhook_and_get_me() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/deleteWebhook"))
            .and(body_partial_json(serde_json::json!({ "drop_pending_updates": true })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": true})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"id": 1, "is_bot": true, "first_name": "Ragram", "username": "ragram_bot"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.delete_webhook(true).await.unwrap());
        let me = client.get_me().await.unwrap();
        assert_eq!(me.username.as_deref(), Some("ragram_bot"));
    }
}

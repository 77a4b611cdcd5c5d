//! 长轮询更新循环

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::client::TelegramClient;
use super::commands::CommandHandler;
use crate::error::Result;
use crate::observability::AppMetrics;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    client: TelegramClient,
    handler: Arc<CommandHandler>,
    metrics: Arc<AppMetrics>,
    poll_timeout_secs: u64,
}

impl Dispatcher {
    pub fn new(
        client: TelegramClient,
        handler: CommandHandler,
        metrics: Arc<AppMetrics>,
        poll_timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            handler: Arc::new(handler),
            metrics,
            poll_timeout_secs,
        }
    }

    /// Poll until `shutdown` resolves. Pending updates from before the start
    /// are dropped; every message is handled on its own task. Startup calls
    /// and polling both retry with the same backoff.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut backoff = INITIAL_BACKOFF;

        let username = loop {
            let started = tokio::select! {
                _ = &mut shutdown => return Ok(()),
                started = self.start() => started,
            };
            match started {
                Ok(username) => break username,
                Err(e) => {
                    warn!("Telegram startup failed, retrying in {:?}: {}", backoff, e);
                    tokio::select! {
                        _ = &mut shutdown => return Ok(()),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        };
        info!(
            "Telegram bot @{} is polling for updates",
            username.as_deref().unwrap_or("unknown")
        );

        let mut offset = 0i64;
        backoff = INITIAL_BACKOFF;

        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => break,
                polled = self.client.get_updates(offset, self.poll_timeout_secs) => polled,
            };

            match polled {
                Ok(updates) => {
                    backoff = INITIAL_BACKOFF;
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.metrics.telegram_updates_total.inc();
                        let Some(message) = update.message else {
                            continue;
                        };
                        let handler = self.handler.clone();
                        let username = username.clone();
                        tokio::spawn(async move {
                            handler.handle(message, username.as_deref()).await;
                        });
                    }
                }
                Err(e) => {
                    warn!("Polling failed, retrying in {:?}: {}", backoff, e);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        info!("Telegram polling stopped");
        Ok(())
    }

    /// Bot username, after dropping the webhook and pending updates.
    async fn start(&self) -> Result<Option<Arc<str>>> {
        let me = self.client.get_me().await?;
        self.client.delete_webhook(true).await?;
        Ok(me.username.map(Arc::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::config::config::TelegramConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_polls_handles_and_advances_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"id": 1, "is_bot": true, "first_name": "R", "username": "ragram_bot"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/deleteWebhook"))
            .and(body_partial_json(serde_json::json!({ "drop_pending_updates": true })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": true})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .and(body_partial_json(serde_json::json!({ "offset": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [{"update_id": 7, "message": {
                    "message_id": 1, "chat": {"id": 9}, "text": "/ping@ragram_bot"
                }}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .and(body_partial_json(serde_json::json!({ "offset": 8 })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/sendMessage"))
            .and(body_partial_json(serde_json::json!({ "chat_id": 9 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 2, "chat": {"id": 9}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = TelegramConfig {
            bot_token: "t".into(),
            api_url: server.uri(),
            poll_timeout_secs: 1,
            ..TelegramConfig::default()
        };
        let client = TelegramClient::new(&config).unwrap();
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let handler =
            CommandHandler::new(client.clone(), None, metrics.clone(), &AppConfig::default());
        let dispatcher = Dispatcher::new(client, handler, metrics.clone(), 1);

        dispatcher
            .run(tokio::time::sleep(Duration::from_millis(400)))
            .await
            .unwrap();

        assert_eq!(metrics.telegram_updates_total.get(), 1);
    }

    #[tokio::test]
    async fn test_startup_retries_after_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/getMe"))
            .respond_with(ResponseTemplate::new(502).set_body_json(serde_json::json!({
                "ok": false, "error_code": 502, "description": "Bad Gateway"
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"id": 1, "is_bot": true, "first_name": "R", "username": "ragram_bot"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/deleteWebhook"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": true})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .and(body_partial_json(serde_json::json!({ "offset": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [{"update_id": 3}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let config = TelegramConfig {
            bot_token: "t".into(),
            api_url: server.uri(),
            poll_timeout_secs: 1,
            ..TelegramConfig::default()
        };
        let client = TelegramClient::new(&config).unwrap();
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let handler =
            CommandHandler::new(client.clone(), None, metrics.clone(), &AppConfig::default());

        Dispatcher::new(client, handler, metrics.clone(), 1)
            .run(tokio::time::sleep(Duration::from_millis(1500)))
            .await
            .unwrap();

        assert_eq!(metrics.telegram_updates_total.get(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_startup_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/getMe"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "ok": false, "error_code": 401, "description": "Unauthorized"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": []})))
            .expect(0)
            .mount(&server)
            .await;

        let config = TelegramConfig {
            bot_token: "t".into(),
            api_url: server.uri(),
            ..TelegramConfig::default()
        };
        let client = TelegramClient::new(&config).unwrap();
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let handler =
            CommandHandler::new(client.clone(), None, metrics.clone(), &AppConfig::default());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Dispatcher::new(client, handler, metrics, 1)
                .run(tokio::time::sleep(Duration::from_millis(200))),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}

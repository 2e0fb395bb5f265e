use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::types::{
    AnswerCallbackRequest, ApiResponse, GetUpdatesRequest, InlineKeyboardMarkup,
    SendMessageRequest, SentMessage, SetWebhookRequest, Update,
};
use crate::error::{BridgeError, BridgeResult};

const SERVICE: &str = "telegram";
const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

/// Bot API client. Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct TelegramBot {
    client: Client,
    api_base: String,
    token: String,
}

impl TelegramBot {
    pub fn new(client: Client, api_base: &str, token: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> BridgeResult<i64> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &SendMessageRequest {
                    chat_id,
                    text,
                    reply_markup,
                },
                None,
            )
            .await?;
        debug!("Message {} sent to chat {}", sent.message_id, chat_id);
        Ok(sent.message_id)
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> BridgeResult<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackRequest {
                    callback_query_id,
                    text,
                    show_alert,
                },
                None,
            )
            .await?;
        Ok(())
    }

    /// Long-polls for updates; the request timeout is stretched past the poll window.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> BridgeResult<Vec<Update>> {
        self.call(
            "getUpdates",
            &GetUpdatesRequest {
                offset,
                timeout: timeout_secs,
                allowed_updates: ALLOWED_UPDATES,
            },
            Some(Duration::from_secs(timeout_secs + 10)),
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> BridgeResult<()> {
        let _: bool = self
            .call(
                "setWebhook",
                &SetWebhookRequest {
                    url,
                    secret_token,
                    allowed_updates: ALLOWED_UPDATES,
                },
                None,
            )
            .await?;
        info!("Telegram webhook registered at {}", url);
        Ok(())
    }

    pub async fn delete_webhook(&self) -> BridgeResult<()> {
        let _: bool = self
            .call("deleteWebhook", &serde_json::json!({}), None)
            .await?;
        Ok(())
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> BridgeResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Errors carry the URL, which embeds the bot token.
        let response = request
            .send()
            .await
            .map_err(|e| BridgeError::from_transport(SERVICE, e.without_url()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BridgeError::from_transport(SERVICE, e.without_url()))?;

        let retryable = status.is_server_error() || status.as_u16() == 429;
        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) => Ok(result),
            Ok(envelope) => Err(BridgeError::external(
                SERVICE,
                format!(
                    "{} failed: {}",
                    method,
                    envelope
                        .description
                        .unwrap_or_else(|| format!("HTTP {}", status))
                ),
                retryable,
            )),
            Err(e) => Err(BridgeError::external(
                SERVICE,
                format!("{} returned HTTP {} with unreadable body: {}", method, status, e),
                retryable,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::types::InlineKeyboardButton;
    use httpmock::prelude::*;
    use serde_json::json;

    fn bot(base: &str) -> TelegramBot {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("client");
        TelegramBot::new(client, base, "test-token".to_string())
    }

    #[tokio::test]
    async fn send_message_attaches_inline_keyboard() {
        let server = MockServer::start();
        let send = server.mock(|when, then| {
            when.method(POST)
                .path("/bottest-token/sendMessage")
                .body_includes("\"chat_id\":42")
                .body_includes("\"callback_data\":\"copy_100\"");
            then.status(200)
                .json_body(json!({"ok": true, "result": {"message_id": 7, "chat": {"id": 42}}}));
        });

        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton::new("Copy", "copy_100")]],
        };
        let id = bot(&server.base_url())
            .send_message(42, "hello", Some(&markup))
            .await
            .expect("send");
        send.assert();
        assert_eq!(id, 7);
    }

    #[tokio::test]
    async fn api_error_surfaces_description() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bottest-token/sendMessage");
            then.status(400).json_body(
                json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}),
            );
        });

        let err = bot(&server.base_url())
            .send_message(1, "hello", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
        assert!(!err.is_retryable());
        assert!(!err.to_string().contains("test-token"));
    }

    #[tokio::test]
    async fn get_updates_decodes_messages_and_callbacks() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/bottest-token/getUpdates")
                .body_includes("\"offset\":5");
            then.status(200).json_body(json!({
                "ok": true,
                "result": [
                    {"update_id": 5, "message": {"message_id": 1, "chat": {"id": 42}, "text": "help"}},
                    {"update_id": 6, "callback_query": {
                        "id": "cb1", "from": {"id": 42, "is_bot": false},
                        "message": {"message_id": 2, "chat": {"id": 42}},
                        "data": "mark_100"
                    }}
                ]
            }));
        });

        let updates = bot(&server.base_url()).get_updates(5, 0).await.expect("updates");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].message.as_ref().and_then(|m| m.text.as_deref()), Some("help"));
        let callback = updates[1].callback_query.as_ref().expect("callback");
        assert_eq!(callback.chat_id(), 42);
        assert_eq!(callback.data.as_deref(), Some("mark_100"));
    }
}

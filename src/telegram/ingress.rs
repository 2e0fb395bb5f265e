use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::client::TelegramBot;
use super::dispatch::UpdateDispatcher;

/// How operator updates reach the dispatcher. One implementation is chosen
/// at startup and runs for the lifetime of the process.
pub trait UpdateIngress {
    fn run(self, dispatcher: Arc<UpdateDispatcher>) -> impl Future<Output = Result<()>> + Send;
}

/// Pull loop over `getUpdates`.
pub struct PollingIngress {
    bot: TelegramBot,
    timeout_secs: u64,
    retry_delay: Duration,
}

impl PollingIngress {
    pub fn new(bot: TelegramBot, timeout_secs: u64, retry_delay: Duration) -> Self {
        Self {
            bot,
            timeout_secs,
            retry_delay,
        }
    }
}

impl UpdateIngress for PollingIngress {
    async fn run(self, dispatcher: Arc<UpdateDispatcher>) -> Result<()> {
        // getUpdates is refused while a webhook is registered.
        if let Err(e) = self.bot.delete_webhook().await {
            warn!("Could not clear Telegram webhook before polling: {}", e);
        }
        info!("Telegram bot started (polling mode)");

        let mut offset = 0i64;
        loop {
            let updates = match self.bot.get_updates(offset, self.timeout_secs).await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("Telegram poll failed: {}", e);
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.handle(update).await;
                });
            }
        }
    }
}

/// Push mode: Telegram calls `POST /telegram`; this only registers the hook.
pub struct WebhookIngress {
    bot: TelegramBot,
    url: String,
    secret_token: String,
}

impl WebhookIngress {
    pub fn new(bot: TelegramBot, public_base_url: &str, secret_token: String) -> Self {
        Self {
            bot,
            url: format!("{}/telegram", public_base_url.trim_end_matches('/')),
            secret_token,
        }
    }
}

impl UpdateIngress for WebhookIngress {
    async fn run(self, _dispatcher: Arc<UpdateDispatcher>) -> Result<()> {
        self.bot
            .set_webhook(&self.url, Some(self.secret_token.as_str()))
            .await
            .context("Failed to register Telegram webhook")?;
        info!("Telegram bot started (webhook mode)");

        // Updates are delivered to the HTTP route from here on.
        std::future::pending::<()>().await;
        Ok(())
    }
}

use std::sync::Arc;
use tracing::{debug, error};

use super::client::TelegramBot;
use super::types::Update;
use crate::commands::CommandRouter;

/// Routes one Bot API update through the command router and delivers the
/// responses back to the chat it came from.
pub struct UpdateDispatcher {
    bot: TelegramBot,
    router: Arc<CommandRouter>,
}

impl UpdateDispatcher {
    pub fn new(bot: TelegramBot, router: Arc<CommandRouter>) -> Self {
        Self { bot, router }
    }

    pub async fn handle(&self, update: Update) {
        if let Some(query) = update.callback_query {
            let chat_id = query.chat_id();
            let data = query.data.as_deref().unwrap_or_default();
            debug!(
                "Callback '{}' from user {} ({}) in chat {}",
                data,
                query.from.id,
                query.from.username.as_deref().unwrap_or("-"),
                chat_id
            );

            let response = self.router.handle_control(chat_id, data).await;
            if let Err(e) = self
                .bot
                .answer_callback_query(&query.id, Some(&response.ack), response.show_alert)
                .await
            {
                error!("Failed to answer callback {}: {}", query.id, e);
            }
            self.send_all(chat_id, &response.messages).await;
            if let Some(follow_up) = response.follow_up {
                let messages = self.router.run_follow_up(chat_id, follow_up).await;
                self.send_all(chat_id, &messages).await;
            }
            return;
        }

        let Some(message) = update.message else {
            debug!("Ignoring update {} without message", update.update_id);
            return;
        };
        let Some(text) = message.text.as_deref() else {
            return;
        };

        if let Some(reply) = self.router.handle_command(message.chat.id, text).await {
            if let Err(e) = self.bot.send_message(message.chat.id, &reply, None).await {
                error!("Failed to reply to chat {}: {}", message.chat.id, e);
            }
        }
    }

    async fn send_all(&self, chat_id: i64, messages: &[String]) {
        for message in messages {
            if let Err(e) = self.bot.send_message(chat_id, message, None).await {
                error!("Failed to send follow-up to chat {}: {}", chat_id, e);
            }
        }
    }
}

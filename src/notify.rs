use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::access::AllowList;
use crate::commands::ControlAction;
use crate::storage::Comment;
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup, TelegramBot};

/// What operators are told about a newly received comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub comment_id: String,
    pub post_id: String,
    pub author: String,
    pub text: String,
    pub parent_id: Option<String>,
}

impl Notice {
    pub fn from_comment(comment_id: &str, comment: &Comment) -> Self {
        Self {
            comment_id: comment_id.to_string(),
            post_id: comment.post_id.clone(),
            author: comment.from.clone(),
            text: comment.text.clone(),
            parent_id: comment.parent_id.clone(),
        }
    }

    pub fn render(&self) -> String {
        let author = if self.author.is_empty() { "Unknown" } else { &self.author };
        let text = if self.text.is_empty() { "(no message)" } else { &self.text };
        let mut message = format!(
            "🆕 FB Comment\nPost: {}\nBy: {}\nText: \"{}\"\nCommentID: {}",
            self.post_id, author, text, self.comment_id
        );
        if let Some(parent) = &self.parent_id {
            message.push_str(&format!("\nReply to: {}", parent));
        }
        message
    }
}

/// The three buttons attached to every notice.
pub fn comment_controls(comment_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![
                InlineKeyboardButton::new(
                    "📋 Copy Prompt",
                    ControlAction::CopyPrompt.payload(comment_id),
                ),
                InlineKeyboardButton::new(
                    "✅ Mark Answered",
                    ControlAction::MarkAnswered.payload(comment_id),
                ),
            ],
            vec![InlineKeyboardButton::new(
                "📤 Post to FB",
                ControlAction::PostToPlatform.payload(comment_id),
            )],
        ],
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends each notice to every allow-listed chat independently.
#[derive(Clone)]
pub struct NotificationDispatcher {
    bot: Option<TelegramBot>,
    allow_list: Arc<AllowList>,
}

impl NotificationDispatcher {
    pub fn new(bot: Option<TelegramBot>, allow_list: Arc<AllowList>) -> Self {
        Self { bot, allow_list }
    }

    pub async fn dispatch(&self, notice: &Notice) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(bot) = &self.bot else {
            warn!(
                "Operator channel disabled; comment {} not announced",
                notice.comment_id
            );
            return report;
        };
        if self.allow_list.is_empty() {
            warn!("No operator chats configured; comment {} not announced", notice.comment_id);
            return report;
        }

        let text = Arc::new(notice.render());
        let markup = Arc::new(comment_controls(&notice.comment_id));

        let mut sends = JoinSet::new();
        for chat_id in self.allow_list.chats() {
            let bot = bot.clone();
            let text = text.clone();
            let markup = markup.clone();
            sends.spawn(async move {
                let result = bot.send_message(chat_id, text.as_str(), Some(&*markup)).await;
                (chat_id, result)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(_))) => report.delivered += 1,
                Ok((chat_id, Err(e))) => {
                    error!(
                        "Failed to notify chat {} about comment {}: {}",
                        chat_id, notice.comment_id, e
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Notification task for comment {} panicked: {}", notice.comment_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Comment {} announced to {} chat(s), {} failed",
            notice.comment_id, report.delivered, report.failed
        );
        report
    }
}

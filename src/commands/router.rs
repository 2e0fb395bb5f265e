use std::sync::Arc;
use tracing::{info, warn};

use super::parser::{Command, Control, ControlAction};
use crate::access::AllowList;
use crate::assist::{reply_prompt, GeminiClient};
use crate::error::BridgeError;
use crate::facebook::{PublishError, ReplyPublisher};
use crate::storage::{Comment, CommentStore};

pub const HELP_TEXT: &str = "Comment Bridge commands:\n\n\
/answer {comment_id}\n{answer text}\n\
Save an answer for a Facebook comment\n\n\
/status {comment_id}\n\
Check the status of a comment\n\n\
Inline buttons:\n\
• Copy Prompt - get a ready-to-copy reply prompt\n\
• Mark Answered - mark the comment as answered\n\
• Post to FB - post the saved answer to Facebook";

/// What to tell the operator right after a button press: the callback
/// acknowledgment, chat messages that are ready now, and slow outbound work
/// to run once the press has been acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub ack: String,
    pub show_alert: bool,
    pub messages: Vec<String>,
    pub follow_up: Option<FollowUp>,
}

/// Outbound calls deferred until after `answerCallbackQuery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    Suggest { comment_id: String, prompt: String },
    Publish { comment_id: String },
}

impl ControlResponse {
    fn ack(text: impl Into<String>) -> Self {
        Self {
            ack: text.into(),
            show_alert: false,
            messages: Vec::new(),
            follow_up: None,
        }
    }

    fn alert(text: impl Into<String>) -> Self {
        Self {
            ack: text.into(),
            show_alert: true,
            messages: Vec::new(),
            follow_up: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}

/// Authorizes and executes operator commands and button activations.
pub struct CommandRouter {
    store: Arc<CommentStore>,
    allow_list: Arc<AllowList>,
    publisher: Arc<ReplyPublisher>,
    completion: Option<GeminiClient>,
}

impl CommandRouter {
    pub fn new(
        store: Arc<CommentStore>,
        allow_list: Arc<AllowList>,
        publisher: Arc<ReplyPublisher>,
        completion: Option<GeminiClient>,
    ) -> Self {
        Self {
            store,
            allow_list,
            publisher,
            completion,
        }
    }

    /// Returns the reply to send, or `None` when the message must be ignored.
    /// Unauthorized chats get no response at all.
    pub async fn handle_command(&self, chat_id: i64, text: &str) -> Option<String> {
        let command = Command::parse(text);
        if command == Command::NoMatch {
            return None;
        }
        if let Err(e) = self.authorize(chat_id) {
            warn!("Dropping command: {}", e);
            return None;
        }

        Some(match command {
            Command::Answer { id, text } => self.answer(chat_id, &id, &text).await,
            Command::Status { id } => self.status(&id).await,
            Command::Help => HELP_TEXT.to_string(),
            Command::NoMatch => return None,
        })
    }

    /// Unlike commands, unauthorized button presses get an explicit answer.
    /// Only local checks run here; outbound calls are left in `follow_up`.
    pub async fn handle_control(&self, chat_id: i64, data: &str) -> ControlResponse {
        if let Err(e) = self.authorize(chat_id) {
            warn!("Rejecting button press: {}", e);
            return ControlResponse::alert("Unauthorized");
        }
        let Some(control) = Control::parse(data) else {
            warn!("Unknown control payload '{}' from chat {}", data, chat_id);
            return ControlResponse::ack("Unknown action");
        };

        let id = control.comment_id.as_str();
        match control.action {
            ControlAction::CopyPrompt => self.copy_prompt(chat_id, id).await,
            ControlAction::MarkAnswered => self.mark_answered(chat_id, id).await,
            ControlAction::PostToPlatform => self.post(id).await,
        }
    }

    /// Runs the deferred part of a button press and returns the chat messages to send.
    pub async fn run_follow_up(&self, chat_id: i64, follow_up: FollowUp) -> Vec<String> {
        match follow_up {
            FollowUp::Suggest { comment_id, prompt } => {
                vec![self.suggest(&comment_id, &prompt).await]
            }
            FollowUp::Publish { comment_id } => vec![self.publish(chat_id, &comment_id).await],
        }
    }

    fn authorize(&self, chat_id: i64) -> Result<(), BridgeError> {
        if self.allow_list.contains(chat_id) {
            Ok(())
        } else {
            Err(BridgeError::Unauthorized(format!("chat {} is not allowed", chat_id)))
        }
    }

    async fn answer(&self, chat_id: i64, id: &str, text: &str) -> String {
        match self.store.set_answer(id, text).await {
            Ok(comment) => {
                info!("Answer saved for comment {} by chat {}", id, chat_id);
                format!(
                    "✅ Answer saved for comment {}\n\nStatus: {}\n\nUse /status {} to check status.",
                    id, comment.status, id
                )
            }
            Err(BridgeError::Validation(reason)) => format!(
                "❌ {}. Send the answer on the lines after the id:\n/answer {}\nYour reply text",
                reason, id
            ),
            Err(e) => format!("❌ Error saving answer: {}", e),
        }
    }

    async fn status(&self, id: &str) -> String {
        match self.store.get(id).await {
            Some(comment) => format_status(id, &comment),
            None => format!("❌ Comment {} not found", id),
        }
    }

    async fn copy_prompt(&self, chat_id: i64, id: &str) -> ControlResponse {
        let Some(comment) = self.store.get(id).await else {
            return ControlResponse::alert("Comment not found");
        };

        let prompt = reply_prompt(&comment.text);
        let mut response = ControlResponse::ack("Prompt sent!")
            .with_message(format!("📋 Ready-to-copy prompt:\n\n{}", prompt));
        if self.completion.is_some() {
            response = response.with_follow_up(FollowUp::Suggest {
                comment_id: id.to_string(),
                prompt,
            });
        }

        info!("Copy prompt requested for comment {} by chat {}", id, chat_id);
        response
    }

    async fn suggest(&self, id: &str, prompt: &str) -> String {
        let Some(completion) = &self.completion else {
            return "⚠️ AI suggestion unavailable: GEMINI_API_KEY is not configured".to_string();
        };
        match completion.complete(prompt).await {
            Ok(text) => format!("🤖 Suggested reply:\n\n{}", text),
            Err(e) => {
                warn!("AI suggestion for comment {} failed: {}", id, e);
                format!("⚠️ AI suggestion unavailable: {}", e)
            }
        }
    }

    async fn mark_answered(&self, chat_id: i64, id: &str) -> ControlResponse {
        match self.store.mark_answered(id).await {
            Ok(comment) => {
                info!("Comment {} marked {} by chat {}", id, comment.status, chat_id);
                ControlResponse::ack("✅ Marked as answered")
                    .with_message(format!("✅ Comment {} marked as answered", id))
            }
            Err(e) => error_response(&e),
        }
    }

    async fn post(&self, id: &str) -> ControlResponse {
        match self.publisher.check_ready(id).await {
            Ok(()) => ControlResponse::ack("Posting to Facebook...").with_follow_up(
                FollowUp::Publish {
                    comment_id: id.to_string(),
                },
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn publish(&self, chat_id: i64, id: &str) -> String {
        match self.publisher.publish(id).await {
            Ok(published) => {
                info!(
                    "Comment {} published as {} by chat {}",
                    id, published.reply_id, chat_id
                );
                format!(
                    "✅ Successfully posted answer to Facebook!\n\nComment ID: {}\nReply ID: {}",
                    id, published.reply_id
                )
            }
            Err(PublishError::Bridge(e @ BridgeError::External { .. })) => {
                let hint = if e.is_retryable() {
                    "\nThe answer is still saved; press Post to FB to retry."
                } else {
                    "\nThe answer is still saved; edit it with /answer or retry."
                };
                format!("❌ Failed to post: {}{}", e, hint)
            }
            Err(PublishError::Bridge(e)) => format!("❌ Failed to post: {}", e),
            Err(e @ PublishError::Unrecorded { .. }) => format!("⚠️ {}", e),
        }
    }
}

fn error_response(e: &BridgeError) -> ControlResponse {
    match e {
        BridgeError::NotFound(_) => ControlResponse::alert("Comment not found"),
        BridgeError::Validation(reason) => ControlResponse::alert(reason.clone()),
        other => ControlResponse::alert(format!("Error: {}", other)),
    }
}

pub fn format_status(id: &str, comment: &Comment) -> String {
    let mut message = format!(
        "{} Status for Comment {}\n\nStatus: {}\nHas Answer: {}\nAnswer Preview: {}\nReceived: {}",
        comment.status.emoji(),
        id,
        comment.status,
        if comment.has_answer() { "Yes" } else { "No" },
        comment.answer_preview(100),
        comment.timestamp.to_rfc3339(),
    );
    if let Some(at) = comment.posted_at {
        message.push_str(&format!("\nPosted: {}", at.to_rfc3339()));
    } else if let Some(at) = comment.answered_at {
        message.push_str(&format!("\nAnswered: {}", at.to_rfc3339()));
    }
    message
}

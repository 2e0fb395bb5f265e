use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle position of a comment. Ordering follows the lifecycle, so a
/// transition is valid only when it does not move to a smaller value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    New,
    Drafted,
    Answered,
    Posted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Drafted => "drafted",
            Status::Answered => "answered",
            Status::Posted => "posted",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Status::New => "🆕",
            Status::Drafted => "📝",
            Status::Answered => "✅",
            Status::Posted => "📤",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked platform comment, keyed by its platform id in the store document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub post_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub status: Status,
    /// When the record was first created.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Empty record in status `new`, used both for first receipt and for
    /// operator references to ids the webhook has not delivered yet.
    pub fn stub(now: DateTime<Utc>) -> Self {
        Self {
            text: String::new(),
            from: String::new(),
            post_id: String::new(),
            parent_id: None,
            answer: String::new(),
            status: Status::New,
            timestamp: now,
            updated_at: None,
            answered_at: None,
            posted_at: None,
        }
    }

    pub fn has_answer(&self) -> bool {
        !self.answer.trim().is_empty()
    }

    /// Moves status forward to `target`; never moves it backwards.
    pub(crate) fn advance(&mut self, target: Status) {
        if target > self.status {
            self.status = target;
        }
    }

    /// Fills descriptive fields from an incoming event. Empty incoming
    /// values never overwrite recorded ones; answer and status are untouched.
    pub(crate) fn merge_incoming(&mut self, incoming: &IncomingComment) {
        merge_field(&mut self.text, &incoming.text);
        merge_field(&mut self.from, &incoming.author);
        merge_field(&mut self.post_id, &incoming.post_id);
        if let Some(parent) = incoming.parent_id.as_deref().filter(|p| !p.is_empty()) {
            self.parent_id = Some(parent.to_string());
        }
    }

    pub fn answer_preview(&self, max_chars: usize) -> String {
        if !self.has_answer() {
            return "No answer yet".to_string();
        }
        let mut preview: String = self.answer.chars().take(max_chars).collect();
        if self.answer.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

fn merge_field(current: &mut String, incoming: &str) {
    if !incoming.trim().is_empty() {
        *current = incoming.to_string();
    }
}

/// Normalized comment-creation event produced by the webhook ingestor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingComment {
    pub comment_id: String,
    pub post_id: String,
    pub author: String,
    pub text: String,
    pub parent_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_follows_lifecycle() {
        assert!(Status::New < Status::Drafted);
        assert!(Status::Drafted < Status::Answered);
        assert!(Status::Answered < Status::Posted);
    }

    #[test]
    fn advance_never_regresses() {
        let mut comment = Comment::stub(Utc::now());
        comment.advance(Status::Answered);
        comment.advance(Status::Drafted);
        assert_eq!(comment.status, Status::Answered);
        comment.advance(Status::Posted);
        comment.advance(Status::New);
        assert_eq!(comment.status, Status::Posted);
    }

    #[test]
    fn merge_keeps_non_empty_fields() {
        let mut comment = Comment::stub(Utc::now());
        comment.merge_incoming(&IncomingComment {
            comment_id: "1".into(),
            post_id: "P1".into(),
            author: "Aina".into(),
            text: "Hello".into(),
            parent_id: None,
        });
        comment.merge_incoming(&IncomingComment {
            comment_id: "1".into(),
            text: "  ".into(),
            ..Default::default()
        });
        assert_eq!(comment.text, "Hello");
        assert_eq!(comment.from, "Aina");
        assert_eq!(comment.post_id, "P1");
    }

    #[test]
    fn persisted_layout_uses_camel_case_and_skips_unset_timestamps() {
        let comment = Comment::stub(Utc::now());
        let value = serde_json::to_value(&comment).expect("serialize");
        assert_eq!(value["status"], "new");
        assert!(value.get("postId").is_some());
        assert!(value.get("postedAt").is_none());
        assert!(value.get("parentId").is_none());
    }

    #[test]
    fn answer_preview_truncates_long_answers() {
        let mut comment = Comment::stub(Utc::now());
        assert_eq!(comment.answer_preview(5), "No answer yet");
        comment.answer = "Terima kasih!".into();
        assert_eq!(comment.answer_preview(5), "Terim...");
        assert_eq!(comment.answer_preview(50), "Terima kasih!");
    }
}

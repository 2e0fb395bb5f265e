//! Operator text commands and inline-button payloads.

use crate::facebook::is_graph_id;

/// A parsed text command. Anything unrecognized is `NoMatch` and is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Text may be empty; the store rejects it with a validation message.
    Answer { id: String, text: String },
    Status { id: String },
    Help,
    NoMatch,
}

impl Command {
    /// Accepts `answer <id>\n<text>`, `status <id>`, `help` (and `start`),
    /// with an optional leading `/` and `@botname` suffix on the verb.
    pub fn parse(input: &str) -> Self {
        let input = input.trim_start();
        let verb_end = input
            .find(char::is_whitespace)
            .unwrap_or(input.len());
        let (verb, rest) = input.split_at(verb_end);

        let verb = verb.strip_prefix('/').unwrap_or(verb);
        let verb = verb.split('@').next().unwrap_or_default().to_ascii_lowercase();

        match verb.as_str() {
            "answer" => match split_id(rest) {
                Some((id, text)) => Command::Answer {
                    id,
                    text: text.trim().to_string(),
                },
                None => Command::NoMatch,
            },
            "status" => match split_id(rest) {
                Some((id, _)) => Command::Status { id },
                None => Command::NoMatch,
            },
            "help" | "start" => Command::Help,
            _ => Command::NoMatch,
        }
    }
}

/// First token on the first line is the id; everything after it is the remainder.
fn split_id(rest: &str) -> Option<(String, &str)> {
    let first_line_end = rest.find('\n').unwrap_or(rest.len());
    let first_line = &rest[..first_line_end];
    let trimmed = first_line.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let offset = first_line.len() - trimmed.len();
    let id_len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let id = &trimmed[..id_len];
    if !is_graph_id(id) {
        return None;
    }
    Some((id.to_string(), &rest[offset + id_len..]))
}

/// Inline button action tags, carried as `<tag><comment id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    CopyPrompt,
    MarkAnswered,
    PostToPlatform,
}

impl ControlAction {
    pub fn tag(&self) -> &'static str {
        match self {
            ControlAction::CopyPrompt => "copy_",
            ControlAction::MarkAnswered => "mark_",
            ControlAction::PostToPlatform => "post_",
        }
    }

    pub fn payload(&self, comment_id: &str) -> String {
        format!("{}{}", self.tag(), comment_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub action: ControlAction,
    pub comment_id: String,
}

impl Control {
    pub fn parse(data: &str) -> Option<Self> {
        [
            ControlAction::CopyPrompt,
            ControlAction::MarkAnswered,
            ControlAction::PostToPlatform,
        ]
        .into_iter()
        .find_map(|action| {
            let id = data.strip_prefix(action.tag())?.trim();
            is_graph_id(id).then(|| Control {
                action,
                comment_id: id.to_string(),
            })
        })
    }
}

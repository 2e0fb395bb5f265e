use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Top-level webhook delivery. Entries stay raw so one malformed entry
/// cannot fail the whole batch.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

/// `value` of a `feed` change.
#[derive(Debug, Default, Deserialize)]
pub struct FeedValue {
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub verb: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub comment_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub post_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub from: Option<Sender>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub name: Option<String>,
}

/// Graph API reply to a comment post.
#[derive(Debug, Deserialize)]
pub struct PostedReply {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorEnvelope {
    pub error: GraphError,
}

#[derive(Debug, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

/// Graph object ids are digits, optionally joined by `_` (`<post>_<comment>`).
/// Anything else must never reach a Graph URL path.
pub fn is_graph_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit() || b == b'_')
}

/// Ids arrive as strings, but some test tools and older payloads send numbers.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feed_value_accepts_numeric_ids() {
        let value: FeedValue = serde_json::from_value(json!({
            "item": "comment",
            "verb": "add",
            "comment_id": 100,
            "post_id": "P1",
            "from": {"id": 7, "name": "Aina"},
            "message": "Hello"
        }))
        .expect("feed value");
        assert_eq!(value.comment_id.as_deref(), Some("100"));
        assert_eq!(value.post_id.as_deref(), Some("P1"));
        assert_eq!(value.from.and_then(|f| f.name).as_deref(), Some("Aina"));
    }

    #[test]
    fn graph_ids_are_digits_and_underscores() {
        assert!(is_graph_id("100"));
        assert!(is_graph_id("123456_789012"));
        assert!(!is_graph_id(""));
        assert!(!is_graph_id("a/../me/feed"));
        assert!(!is_graph_id("100?fields=id"));
        assert!(!is_graph_id("me"));
    }
}

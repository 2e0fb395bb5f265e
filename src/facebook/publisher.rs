use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info, warn};

use super::types::{is_graph_id, GraphErrorEnvelope, PostedReply};
use crate::config::FacebookConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::storage::{Comment, CommentStore, Status};

const SERVICE: &str = "graph api";

/// Graph API client scoped to replying to comments.
#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    base_url: String,
    version: String,
    access_token: String,
}

#[derive(Serialize)]
struct ReplyRequest<'a> {
    message: &'a str,
    access_token: &'a str,
}

impl GraphClient {
    pub fn new(client: Client, config: &FacebookConfig, access_token: String) -> Self {
        Self {
            client,
            base_url: config.graph_api_base.trim_end_matches('/').to_string(),
            version: config.graph_api_version.clone(),
            access_token,
        }
    }

    /// Posts `message` as a reply in the thread of `comment_id`; returns the new reply id.
    pub async fn reply_to_comment(&self, comment_id: &str, message: &str) -> BridgeResult<String> {
        if !is_graph_id(comment_id) {
            return Err(BridgeError::Validation(format!(
                "'{}' is not a valid comment id",
                comment_id
            )));
        }
        let url = format!("{}/{}/{}/comments", self.base_url, self.version, comment_id);

        let response = self
            .client
            .post(&url)
            .json(&ReplyRequest {
                message,
                access_token: &self.access_token,
            })
            .send()
            .await
            .map_err(|e| BridgeError::from_transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<GraphErrorEnvelope>(&body) {
                Ok(envelope) => match envelope.error.code {
                    Some(code) => format!("{} (code {})", envelope.error.message, code),
                    None => envelope.error.message,
                },
                Err(_) => format!("HTTP {}: {}", status, body),
            };
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err(BridgeError::external(SERVICE, detail, retryable));
        }

        let reply: PostedReply = response
            .json()
            .await
            .map_err(|e| BridgeError::external(SERVICE, format!("unexpected response: {}", e), false))?;
        Ok(reply.id)
    }
}

#[derive(Debug, Clone)]
pub struct PublishedReply {
    pub reply_id: String,
    pub comment: Comment,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// The platform accepted the reply but the store could not record it.
    #[error("reply {reply_id} was posted but could not be recorded: {source}")]
    Unrecorded {
        reply_id: String,
        source: BridgeError,
    },
}

/// Publishes stored answers and finalizes the record. No automatic retry:
/// on failure the record is left as it was so the operator can try again.
pub struct ReplyPublisher {
    store: Arc<CommentStore>,
    graph: Option<GraphClient>,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases the per-comment publish slot on drop.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

impl ReplyPublisher {
    pub fn new(store: Arc<CommentStore>, graph: Option<GraphClient>) -> Self {
        Self {
            store,
            graph,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Claims the publish slot for `comment_id`; `None` while another publish is running.
    fn claim(&self, comment_id: &str) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock().ok()?;
        set.insert(comment_id.to_string()).then(|| InFlight {
            set: &self.in_flight,
            id: comment_id.to_string(),
        })
    }

    /// Checks everything that can be known before the platform call:
    /// the record exists, has an answer, is not posted yet, and publishing is configured.
    pub async fn check_ready(&self, comment_id: &str) -> BridgeResult<()> {
        self.ready(comment_id).await.map(|_| ())
    }

    async fn ready(&self, comment_id: &str) -> BridgeResult<(Comment, &GraphClient)> {
        let comment = self
            .store
            .get(comment_id)
            .await
            .ok_or_else(|| BridgeError::NotFound(comment_id.to_string()))?;
        if !comment.has_answer() {
            return Err(BridgeError::Validation(
                "No answer saved. Use /answer command first.".to_string(),
            ));
        }
        if comment.status == Status::Posted {
            return Err(BridgeError::Validation(format!(
                "Comment {} was already posted",
                comment_id
            )));
        }
        let graph = self.graph.as_ref().ok_or_else(|| {
            BridgeError::configuration("publishing", "FB_PAGE_ACCESS_TOKEN is not configured")
        })?;
        Ok((comment, graph))
    }

    pub async fn publish(&self, comment_id: &str) -> Result<PublishedReply, PublishError> {
        let Some(_slot) = self.claim(comment_id) else {
            return Err(BridgeError::Validation(format!(
                "Comment {} is already being posted",
                comment_id
            ))
            .into());
        };

        let (comment, graph) = self.ready(comment_id).await?;

        let reply_id = match graph.reply_to_comment(comment_id, &comment.answer).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to post reply to comment {}: {}", comment_id, e);
                return Err(e.into());
            }
        };
        info!("Posted reply {} to comment {}", reply_id, comment_id);

        match self.store.mark_posted(comment_id).await {
            Ok(comment) => Ok(PublishedReply { reply_id, comment }),
            Err(source) => {
                error!(
                    "Reply {} posted but comment {} could not be marked: {}",
                    reply_id, comment_id, source
                );
                Err(PublishError::Unrecorded { reply_id, source })
            }
        }
    }
}

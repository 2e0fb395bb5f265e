use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info};

use super::comment::{Comment, IncomingComment, Status};
use crate::error::{BridgeError, BridgeResult};

type Document = BTreeMap<String, Comment>;

/// A committed change to one record, broadcast to dashboard subscribers.
#[derive(Debug, Clone)]
pub struct CommentChange {
    pub id: String,
    pub comment: Comment,
}

/// Result of an incoming upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    Created(Comment),
    Merged(Comment),
}

impl Upsert {
    pub fn comment(&self) -> &Comment {
        match self {
            Upsert::Created(c) | Upsert::Merged(c) => c,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }
}

struct Committed {
    previous: Option<Comment>,
    current: Comment,
}

/// Durable map from comment id to lifecycle record.
///
/// All writes go through one async mutex: the record is mutated in memory,
/// the whole document is written to a temporary file and renamed over the
/// previous one, and only then is the change visible. A failed write rolls
/// the in-memory record back, so readers never see state that is not on disk.
pub struct CommentStore {
    path: PathBuf,
    comments: Mutex<Document>,
    events: broadcast::Sender<CommentChange>,
}

impl CommentStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }

        let comments = load_document(&path).await?;
        info!("Comment store opened at {} ({} records)", path.display(), comments.len());

        let (events, _) = broadcast::channel(256);
        Ok(Self {
            path,
            comments: Mutex::new(comments),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommentChange> {
        self.events.subscribe()
    }

    pub async fn get(&self, id: &str) -> Option<Comment> {
        self.comments.lock().await.get(id).cloned()
    }

    pub async fn list_all(&self) -> Vec<(String, Comment)> {
        self.comments
            .lock()
            .await
            .iter()
            .map(|(id, c)| (id.clone(), c.clone()))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.comments.lock().await.len()
    }

    /// Creates the record in status `new`, or merges non-empty descriptive
    /// fields into the existing one without touching answer or status.
    pub async fn upsert_incoming(&self, incoming: &IncomingComment) -> BridgeResult<Upsert> {
        let id = incoming.comment_id.trim();
        if id.is_empty() {
            return Err(BridgeError::Validation("comment id is empty".into()));
        }

        let committed = self
            .commit(id, |slot, now| {
                slot.get_or_insert_with(|| Comment::stub(now))
                    .merge_incoming(incoming);
                Ok(())
            })
            .await?;

        Ok(match committed.previous {
            None => Upsert::Created(committed.current),
            Some(_) => Upsert::Merged(committed.current),
        })
    }

    /// Stores the operator's draft. Creates a stub for unseen ids.
    pub async fn set_answer(&self, id: &str, text: &str) -> BridgeResult<Comment> {
        let answer = text.trim();
        if answer.is_empty() {
            return Err(BridgeError::Validation("answer text is empty".into()));
        }

        let committed = self
            .commit(id, |slot, now| {
                let comment = slot.get_or_insert_with(|| Comment::stub(now));
                comment.answer = answer.to_string();
                comment.advance(Status::Drafted);
                comment.updated_at = Some(now);
                Ok(())
            })
            .await?;
        Ok(committed.current)
    }

    /// Idempotent; a repeat only refreshes `answeredAt`.
    pub async fn mark_answered(&self, id: &str) -> BridgeResult<Comment> {
        let committed = self
            .commit(id, |slot, now| {
                let comment = slot
                    .as_mut()
                    .ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
                comment.advance(Status::Answered);
                comment.answered_at = Some(now);
                Ok(())
            })
            .await?;
        Ok(committed.current)
    }

    pub async fn mark_posted(&self, id: &str) -> BridgeResult<Comment> {
        let committed = self
            .commit(id, |slot, now| {
                let comment = slot
                    .as_mut()
                    .ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
                if !comment.has_answer() {
                    return Err(BridgeError::Validation(format!(
                        "comment {} has no saved answer",
                        id
                    )));
                }
                comment.advance(Status::Posted);
                comment.posted_at = Some(now);
                Ok(())
            })
            .await?;
        Ok(committed.current)
    }

    async fn commit<F>(&self, id: &str, mutate: F) -> BridgeResult<Committed>
    where
        F: FnOnce(&mut Option<Comment>, DateTime<Utc>) -> BridgeResult<()>,
    {
        let mut comments = self.comments.lock().await;

        let previous = comments.get(id).cloned();
        let mut slot = previous.clone();
        mutate(&mut slot, Utc::now())?;
        let Some(current) = slot else {
            return Err(BridgeError::NotFound(id.to_string()));
        };

        comments.insert(id.to_string(), current.clone());
        if let Err(e) = write_document(&self.path, &comments).await {
            match &previous {
                Some(prev) => comments.insert(id.to_string(), prev.clone()),
                None => comments.remove(id),
            };
            error!("Failed to persist comment {}: {:#}", id, e);
            return Err(BridgeError::Storage(format!("{:#}", e)));
        }
        drop(comments);

        debug!("Comment {} committed with status {}", id, current.status);
        let _ = self.events.send(CommentChange {
            id: id.to_string(),
            comment: current.clone(),
        });

        Ok(Committed { previous, current })
    }
}

async fn load_document(path: &Path) -> Result<Document> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    if raw.trim().is_empty() {
        return Ok(Document::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Writes the document to a sibling temp file and renames it into place.
async fn write_document(path: &Path, comments: &Document) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("store path cannot be empty");
    }
    let json = serde_json::to_string_pretty(comments).context("Failed to serialize comments")?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "comments.json".to_string());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = path.with_file_name(format!(".{}.{}.{}.tmp", file_name, std::process::id(), nanos));

    tokio::fs::write(&temp_path, format!("{}\n", json))
        .await
        .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e).with_context(|| {
            format!(
                "Failed to replace {} with {}",
                path.display(),
                temp_path.display()
            )
        });
    }
    Ok(())
}

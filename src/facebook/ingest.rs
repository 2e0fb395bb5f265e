use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::types::{Change, Entry, FeedValue, WebhookPayload};
use crate::storage::{Comment, CommentStore, IncomingComment};

/// Outcome of one delivery. `created` lists records seen for the first
/// time; only those are announced to operators.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub created: Vec<(String, Comment)>,
    pub merged: usize,
    pub ignored: usize,
    pub failed: usize,
}

/// Turns page webhook deliveries into store upserts.
pub struct WebhookIngestor {
    store: Arc<CommentStore>,
}

impl WebhookIngestor {
    pub fn new(store: Arc<CommentStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(&self, payload: WebhookPayload) -> IngestReport {
        let mut report = IngestReport::default();

        if payload.object != "page" {
            debug!("Ignoring webhook for object '{}'", payload.object);
            report.ignored += 1;
            return report;
        }

        for raw_entry in payload.entry {
            let entry: Entry = match serde_json::from_value(raw_entry) {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Skipping malformed webhook entry: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            let page = entry.id.as_deref().unwrap_or("?");

            for change in &entry.changes {
                match extract_comment(change) {
                    Ok(Some(incoming)) => self.store_one(incoming, &mut report).await,
                    Ok(None) => report.ignored += 1,
                    Err(e) => {
                        error!("Failed to extract comment from page {}: {:#}", page, e);
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            "Webhook ingested: {} new, {} merged, {} ignored, {} failed",
            report.created.len(),
            report.merged,
            report.ignored,
            report.failed
        );
        report
    }

    async fn store_one(&self, incoming: IncomingComment, report: &mut IngestReport) {
        match self.store.upsert_incoming(&incoming).await {
            Ok(upsert) if upsert.is_created() => {
                info!(
                    "New comment {} on post {} by {}",
                    incoming.comment_id, incoming.post_id, incoming.author
                );
                report
                    .created
                    .push((incoming.comment_id.clone(), upsert.comment().clone()));
            }
            Ok(_) => {
                debug!("Comment {} re-delivered, merged", incoming.comment_id);
                report.merged += 1;
            }
            Err(e) => {
                error!("Failed to store comment {}: {}", incoming.comment_id, e);
                report.failed += 1;
            }
        }
    }
}

/// Only `feed` changes whose item is a comment count as comment creation.
/// Removals are not creations and are ignored too.
fn extract_comment(change: &Change) -> Result<Option<IncomingComment>> {
    if change.field != "feed" {
        return Ok(None);
    }
    let item = change.value.get("item").and_then(Value::as_str);
    if item != Some("comment") {
        return Ok(None);
    }

    let value: FeedValue =
        serde_json::from_value(change.value.clone()).context("Malformed feed comment value")?;
    if value.verb.as_deref() == Some("remove") {
        return Ok(None);
    }

    let comment_id = value
        .comment_id
        .filter(|id| !id.trim().is_empty())
        .context("Feed comment without comment_id")?;

    Ok(Some(IncomingComment {
        comment_id: comment_id.trim().to_string(),
        post_id: value.post_id.unwrap_or_default(),
        author: value.from.and_then(|f| f.name).unwrap_or_default(),
        text: value.message.unwrap_or_default(),
        parent_id: value.parent_id,
    }))
}

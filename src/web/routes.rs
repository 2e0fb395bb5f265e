use askama::Template;
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::state::AppState;
use crate::storage::{Comment, Status};

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    timestamp: String,
    comments: usize,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(Health {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        comments: state.ctx.store.count().await,
    })
}

/// Dashboard credential as a query parameter, for clients that cannot set
/// headers (`EventSource`).
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    token: Option<String>,
}

/// Accepts `Authorization: Bearer <token>` or `?token=<token>`.
/// Without a configured token nothing is authorized.
pub(super) fn dashboard_authorized(
    state: &AppState,
    headers: &HeaderMap,
    query: &DashboardQuery,
) -> bool {
    let Some(expected) = state.ctx.dashboard_token.as_deref() else {
        return false;
    };
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim);
    bearer == Some(expected) || query.token.as_deref() == Some(expected)
}

fn events_url(token: &str) -> String {
    match Url::parse_with_params("http://localhost/events", &[("token", token)]) {
        Ok(url) => format!("{}?{}", url.path(), url.query().unwrap_or_default()),
        Err(_) => "/events".to_string(),
    }
}

#[derive(Template)]
#[template(path = "comments.html")]
struct DashboardTemplate {
    rows: Vec<CommentRow>,
    total: usize,
    stats: Vec<(String, usize)>,
    events_url: String,
}

pub(super) struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author: String,
    pub text: String,
    pub answer: String,
    pub status: String,
    pub status_css: &'static str,
    pub received: String,
}

impl CommentRow {
    pub(super) fn new(id: &str, c: &Comment) -> Self {
        Self {
            id: id.to_string(),
            post_id: c.post_id.clone(),
            author: c.from.clone(),
            text: c.text.clone(),
            answer: c.answer_preview(80),
            status: format!("{} {}", c.status.emoji(), c.status),
            status_css: c.status.as_str(),
            received: c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Response {
    if !dashboard_authorized(&state, &headers, &query) {
        warn!("Rejected dashboard request without a valid token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut comments = state.ctx.store.list_all().await;
    comments.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));

    let stats = [Status::New, Status::Drafted, Status::Answered, Status::Posted]
        .into_iter()
        .map(|status| {
            let count = comments.iter().filter(|(_, c)| c.status == status).count();
            (status.to_string(), count)
        })
        .collect();

    let template = DashboardTemplate {
        total: comments.len(),
        rows: comments.iter().map(|(id, c)| CommentRow::new(id, c)).collect(),
        stats,
        events_url: events_url(state.ctx.dashboard_token.as_deref().unwrap_or_default()),
    };

    Html(template.render().unwrap_or_else(|e| format!("Template error: {}", e))).into_response()
}

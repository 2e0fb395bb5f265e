use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::routes::{dashboard_authorized, CommentRow, DashboardQuery};
use super::state::AppState;
use crate::storage::CommentChange;

/// Live row updates for the dashboard, one `comment` event per committed change.
pub async fn sse_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Response {
    if !dashboard_authorized(&state, &headers, &query) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let stream = BroadcastStream::new(state.ctx.store.subscribe());

    // Lagged receivers skip the missed changes; a reload shows the full table.
    let stream = stream.filter_map(|result| match result {
        Ok(change) => Some(change_event(&change)),
        Err(_) => None,
    });

    let stream = stream.map(Ok::<Event, std::convert::Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn change_event(change: &CommentChange) -> Event {
    let payload = json!({
        "id": change.id,
        "status": change.comment.status,
        "html": render_comment_row(&CommentRow::new(&change.id, &change.comment)),
    });
    Event::default().event("comment").data(payload.to_string())
}

fn render_comment_row(row: &CommentRow) -> String {
    format!(
        r#"<tr id="comment-{id}">
  <td>{id}<div class="muted">{post}</div></td>
  <td>{author}</td>
  <td>{text}</td>
  <td>{answer}</td>
  <td><span class="badge {css}">{status}</span></td>
  <td class="muted">{received}</td>
</tr>"#,
        id = html_escape(&row.id),
        post = html_escape(&row.post_id),
        author = html_escape(&row.author),
        text = html_escape(&row.text),
        answer = html_escape(&row.answer),
        css = row.status_css,
        status = html_escape(&row.status),
        received = row.received,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

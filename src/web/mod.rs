pub mod routes;
pub mod sse;
pub mod state;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(
            "/fb/webhook",
            get(webhook::verify_subscription).post(webhook::receive_event),
        )
        .route("/telegram", post(webhook::telegram_update))
        .route("/health", get(routes::health));

    // Comment data is only served behind the dashboard token.
    if state.ctx.dashboard_token.is_some() {
        router = router
            .route("/comments", get(routes::dashboard))
            .route("/events", get(sse::sse_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

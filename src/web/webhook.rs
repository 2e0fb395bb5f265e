use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::state::AppState;
use crate::facebook::{Verdict, WebhookPayload, SIGNATURE_HEADER};
use crate::notify::Notice;
use crate::telegram::Update;

const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Deserialize)]
pub struct SubscriptionQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Subscription handshake: echo the challenge when mode and token match.
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> Response {
    let expected = state.ctx.verify_token.as_deref();
    let matches = query.mode.as_deref() == Some("subscribe")
        && expected.is_some()
        && query.verify_token.as_deref() == expected;

    match (matches, query.challenge) {
        (true, Some(challenge)) => {
            info!("Facebook webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!(
                "Facebook webhook verification failed (mode: {:?})",
                query.mode
            );
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Event delivery. Authenticated requests are always acknowledged with 200,
/// whatever happens downstream, so the platform does not retry-storm.
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let verdict = state.ctx.verifier.check(&body, signature);
    if !verdict.is_accepted() {
        return if verdict == Verdict::Unavailable {
            error!("Webhook delivery refused: FB_APP_SECRET is not configured");
            (StatusCode::SERVICE_UNAVAILABLE, "event delivery disabled").into_response()
        } else {
            warn!("Facebook webhook signature verification failed");
            StatusCode::FORBIDDEN.into_response()
        };
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Unparsable Facebook webhook body: {}", e);
            return (StatusCode::OK, "EVENT_RECEIVED").into_response();
        }
    };

    let report = state.ctx.ingestor.ingest(payload).await;
    if !report.created.is_empty() {
        let notifier = state.ctx.notifier.clone();
        tokio::spawn(async move {
            for (id, comment) in &report.created {
                notifier.dispatch(&Notice::from_comment(id, comment)).await;
            }
        });
    }

    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}

/// Telegram push ingress; answers 404 unless the bot runs in webhook mode.
pub async fn telegram_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(push) = &state.ctx.telegram else {
        return StatusCode::NOT_FOUND;
    };

    let provided = headers
        .get(TELEGRAM_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(push.secret_token.as_str()) {
        warn!("Rejected Telegram update with missing or wrong secret token");
        return StatusCode::UNAUTHORIZED;
    }

    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            let dispatcher = push.dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.handle(update).await;
            });
        }
        Err(e) => warn!("Ignoring unparsable Telegram update: {}", e),
    }
    StatusCode::OK
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::access::AllowList;
    use crate::commands::CommandRouter;
    use crate::context::{BridgeContext, TelegramPush};
    use crate::facebook::signature::sign;
    use crate::facebook::{ReplyPublisher, SignaturePolicy, SignatureVerifier, WebhookIngestor};
    use crate::notify::NotificationDispatcher;
    use crate::storage::{CommentStore, Status};
    use crate::telegram::{TelegramBot, UpdateDispatcher};
    use crate::web::create_router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    pub(crate) async fn test_state(
        policy: SignaturePolicy,
        telegram: Option<(TelegramBot, String)>,
    ) -> (tempfile::TempDir, AppState) {
        test_state_with_dashboard(policy, telegram, Some("dash-token")).await
    }

    pub(crate) async fn test_state_with_dashboard(
        policy: SignaturePolicy,
        telegram: Option<(TelegramBot, String)>,
        dashboard_token: Option<&str>,
    ) -> (tempfile::TempDir, AppState) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(
            CommentStore::open(temp.path().join("comments.json"))
                .await
                .expect("open"),
        );
        let allow_list = Arc::new(AllowList::new([42]));
        let router = Arc::new(CommandRouter::new(
            store.clone(),
            allow_list.clone(),
            Arc::new(ReplyPublisher::new(store.clone(), None)),
            None,
        ));
        let push = telegram.map(|(bot, secret_token)| TelegramPush {
            dispatcher: Arc::new(UpdateDispatcher::new(bot, router.clone())),
            public_base_url: "https://bridge.example.com".to_string(),
            secret_token,
        });
        let ctx = BridgeContext {
            store: store.clone(),
            allow_list: allow_list.clone(),
            verifier: SignatureVerifier::new(policy),
            verify_token: Some("verify-me".to_string()),
            ingestor: WebhookIngestor::new(store.clone()),
            notifier: NotificationDispatcher::new(None, allow_list),
            router,
            telegram: push,
            bot: None,
            dashboard_token: dashboard_token.map(str::to_string),
        };
        (temp, AppState::new(Arc::new(ctx)))
    }

    fn enforced() -> SignaturePolicy {
        SignaturePolicy::Enforced {
            secret: "app-secret".to_string(),
        }
    }

    fn comment_payload(id: &str, text: &str) -> String {
        json!({
            "object": "page",
            "entry": [{"id": "page-1", "changes": [{
                "field": "feed",
                "value": {
                    "item": "comment", "verb": "add",
                    "comment_id": id, "post_id": "P1",
                    "from": {"id": "u1", "name": "Aina"},
                    "message": text
                }
            }]}]
        })
        .to_string()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn subscription_echoes_challenge_on_matching_token() {
        let (_temp, state) = test_state(enforced(), None).await;
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/fb/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=12345")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "12345");
    }

    #[tokio::test]
    async fn subscription_rejects_wrong_token_or_mode() {
        let (_temp, state) = test_state(enforced(), None).await;
        for uri in [
            "/fb/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1",
            "/fb/webhook?hub.mode=unsubscribe&hub.verify_token=verify-me&hub.challenge=1",
            "/fb/webhook",
        ] {
            let response = create_router(state.clone())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
        }
    }

    #[tokio::test]
    async fn signed_delivery_is_stored_and_acknowledged() {
        let (_temp, state) = test_state(enforced(), None).await;
        let body = comment_payload("100", "Hello");
        let response = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fb/webhook")
                    .header("content-type", "application/json")
                    .header(SIGNATURE_HEADER, sign("app-secret", body.as_bytes()))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "EVENT_RECEIVED");
        let comment = state.ctx.store.get("100").await.expect("comment");
        assert_eq!(comment.status, Status::New);
        assert_eq!(comment.text, "Hello");
    }

    #[tokio::test]
    async fn tampered_delivery_is_rejected_without_mutation() {
        let (_temp, state) = test_state(enforced(), None).await;
        let body = comment_payload("100", "Hello");
        let signature = sign("app-secret", body.as_bytes());
        let tampered = body.replace("Hello", "Hellp");

        let response = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fb/webhook")
                    .header(SIGNATURE_HEADER, signature)
                    .body(Body::from(tampered))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(state.ctx.store.count().await, 0);
    }

    #[tokio::test]
    async fn missing_secret_refuses_delivery() {
        let (_temp, state) = test_state(SignaturePolicy::Unavailable, None).await;
        let response = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fb/webhook")
                    .body(Body::from(comment_payload("100", "Hello")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.ctx.store.count().await, 0);
    }

    #[tokio::test]
    async fn disabled_verification_accepts_unsigned_and_acks_garbage() {
        let (_temp, state) = test_state(SignaturePolicy::Disabled, None).await;
        let router = create_router(state.clone());

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fb/webhook")
                    .body(Body::from(comment_payload("100", "Hello")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.ctx.store.get("100").await.is_some());

        let garbage = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fb/webhook")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn telegram_route_is_absent_in_polling_mode() {
        let (_temp, state) = test_state(enforced(), None).await;
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/telegram")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn telegram_push_checks_secret_and_dispatches() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("client");
        let bot = TelegramBot::new(client, "http://127.0.0.1:9", "test-token".to_string());
        let (_temp, state) =
            test_state(enforced(), Some((bot, "tg-secret".to_string()))).await;
        let update = json!({
            "update_id": 1,
            "message": {"message_id": 5, "chat": {"id": 42}, "text": "/answer 100\nThanks"}
        })
        .to_string();

        let rejected = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/telegram")
                    .body(Body::from(update.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

        let accepted = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/telegram")
                    .header(TELEGRAM_SECRET_HEADER, "tg-secret")
                    .body(Body::from(update))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(accepted.status(), StatusCode::OK);

        let mut stored = None;
        for _ in 0..50 {
            stored = state.ctx.store.get("100").await;
            if stored.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(stored.expect("comment").status, Status::Drafted);
    }
}

//! Message submission and history endpoints.

use crate::app::AppState;
use crate::error::ApiError;
use alumnet_core::{MessageId, UserId};
use alumnet_messaging::{ErrorKind, MessageRecord, RoomKey};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub body: String,
}

/// Response to an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
    /// Live connections that received the push.
    pub delivered: usize,
}

/// Stores a message and pushes it to the recipient's live connections.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(SubmitRequest {
        sender_id,
        recipient_id,
        body,
    }) = payload.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;

    // Detached so that a client hanging up cannot cancel the push once the
    // message is stored.
    let task = {
        let state = Arc::clone(&state);
        tokio::spawn(async move { state.ingest.submit(sender_id, recipient_id, &body).await })
    };
    let submission = task.await.map_err(|e| {
        tracing::error!(error = %e, "submission task failed");
        ApiError {
            kind: ErrorKind::PersistenceFailure,
            message: "Message submission failed".to_string(),
        }
    })??;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            id: submission.record.id,
            created_at: submission.record.created_at,
            delivered: submission.delivery.delivered,
        }),
    ))
}

/// Messages addressed to a room, oldest first.
pub async fn room_history(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let room = RoomKey::parse(room)?;
    Ok(Json(state.ingest.history(&room).await?))
}

/// Messages exchanged between two users, oldest first.
pub async fn conversation(
    State(state): State<Arc<AppState>>,
    Path((user_a, user_b)): Path<(String, String)>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let a = parse_user(&user_a)?;
    let b = parse_user(&user_b)?;
    Ok(Json(state.ingest.conversation(a, b).await?))
}

fn parse_user(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::invalid(format!("invalid user id '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use crate::app::{AppState, router};
    use alumnet_core::UserId;
    use alumnet_messaging::{
        ConnectionId, InMemoryMessageStore, MessageRecord, MessageStore, MessagingConfig,
        RoomKey, StoreError,
    };
    use async_trait::async_trait;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{Notify, mpsc};
    use tokio::time::timeout;
    use tower::ServiceExt;

    fn setup() -> (Arc<InMemoryMessageStore>, Arc<AppState>) {
        let store = Arc::new(InMemoryMessageStore::new());
        let state = Arc::new(AppState::new(store.clone(), MessagingConfig::default()));
        (store, state)
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = serde_json::from_slice(&bytes).expect("json body");
        (status, body)
    }

    fn post(payload: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/messages")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn submit_stores_and_pushes_to_recipient() {
        let (store, state) = setup();
        let (tx, mut rx) = mpsc::channel(4);
        let conn = ConnectionId::new("b").expect("valid");
        state.registry.connect(conn.clone(), tx);
        let recipient = UserId::new(2).expect("valid");
        state
            .registry
            .join(&conn, &RoomKey::for_user(recipient))
            .expect("join");

        let (status, body) = call(
            router(state),
            post(json!({"sender_id": 1, "recipient_id": "2", "body": "hello"})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["delivered"], 1);
        let pushed = rx.try_recv().expect("pushed");
        assert_eq!(pushed.body, "hello");
        assert_eq!(body["id"], json!(pushed.id));
        assert_eq!(store.len(), 1);
    }

    /// Store whose writes wait until the test lets them through.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryMessageStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl MessageStore for GatedStore {
        async fn insert_message(
            &self,
            sender_id: UserId,
            recipient_id: UserId,
            body: &str,
        ) -> Result<MessageRecord, StoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.insert_message(sender_id, recipient_id, body).await
        }

        async fn list_messages(&self, room: &RoomKey) -> Result<Vec<MessageRecord>, StoreError> {
            self.inner.list_messages(room).await
        }

        async fn list_conversation(
            &self,
            a: UserId,
            b: UserId,
        ) -> Result<Vec<MessageRecord>, StoreError> {
            self.inner.list_conversation(a, b).await
        }
    }

    #[tokio::test]
    async fn submit_still_pushes_after_client_hangs_up() {
        let store = Arc::new(GatedStore::default());
        let state = Arc::new(AppState::new(store.clone(), MessagingConfig::default()));
        let (tx, mut rx) = mpsc::channel(4);
        let conn = ConnectionId::new("b").expect("valid");
        state.registry.connect(conn.clone(), tx);
        state
            .registry
            .join(&conn, &RoomKey::for_user(UserId::new(2).expect("valid")))
            .expect("join");

        let request = tokio::spawn(
            router(Arc::clone(&state))
                .oneshot(post(json!({"sender_id": 1, "recipient_id": 2, "body": "still here"}))),
        );
        store.entered.notified().await;
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());
        store.release.notify_one();

        let pushed = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("push in time")
            .expect("outbox open");
        assert_eq!(pushed.body, "still here");
        assert_eq!(store.inner.len(), 1);
    }

    #[tokio::test]
    async fn submit_rejects_placeholder_user_ids() {
        let (store, state) = setup();

        let (status, body) = call(
            router(state),
            post(json!({"sender_id": "undefined", "recipient_id": 2, "body": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "invalid_argument");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_blank_body() {
        let (_, state) = setup();

        let (status, body) = call(
            router(state),
            post(json!({"sender_id": 1, "recipient_id": 2, "body": "  "})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_argument");
    }

    #[tokio::test]
    async fn submit_reports_persistence_failure() {
        let (store, state) = setup();
        store.set_unavailable(true);

        let (status, body) = call(
            router(state),
            post(json!({"sender_id": 1, "recipient_id": 2, "body": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "persistence_failure");
    }

    #[tokio::test]
    async fn room_history_lists_deferred_messages() {
        let (_, state) = setup();
        let app = router(state);
        call(
            app.clone(),
            post(json!({"sender_id": 1, "recipient_id": 2, "body": "first"})),
        )
        .await;
        call(
            app.clone(),
            post(json!({"sender_id": 3, "recipient_id": 2, "body": "second"})),
        )
        .await;

        let (status, body) = call(app, get("/messages/room/user_2")).await;

        assert_eq!(status, StatusCode::OK);
        let bodies: Vec<_> = body
            .as_array()
            .expect("array")
            .iter()
            .map(|m| m["body"].as_str().expect("body"))
            .collect();
        assert_eq!(bodies, ["first", "second"]);
    }

    #[tokio::test]
    async fn conversation_returns_both_directions() {
        let (_, state) = setup();
        let app = router(state);
        call(
            app.clone(),
            post(json!({"sender_id": 1, "recipient_id": 2, "body": "hi"})),
        )
        .await;
        call(
            app.clone(),
            post(json!({"sender_id": 2, "recipient_id": 1, "body": "hey"})),
        )
        .await;
        call(
            app.clone(),
            post(json!({"sender_id": 1, "recipient_id": 3, "body": "elsewhere"})),
        )
        .await;

        let (status, body) = call(app, get("/messages/2/1")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().expect("array").len(), 2);
    }

    #[tokio::test]
    async fn conversation_rejects_non_numeric_users() {
        let (_, state) = setup();

        let (status, body) = call(router(state), get("/messages/null/2")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_argument");
    }
}

//! Application state and router.

use crate::{routes, ws};
use alumnet_messaging::{
    ConnectionRegistry, Dispatcher, MessageIngest, MessageStore, MessagingConfig,
};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
pub struct AppState {
    /// Live connections and their rooms.
    pub registry: Arc<ConnectionRegistry>,
    /// Persist-then-push entry point for new messages.
    pub ingest: MessageIngest,
    /// Delivery and ingest settings.
    pub messaging: MessagingConfig,
}

impl AppState {
    /// Wires a registry, dispatcher and ingest path over `store`.
    pub fn new(store: Arc<dyn MessageStore>, messaging: MessagingConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), messaging.send_timeout());
        let ingest = MessageIngest::new(store, dispatcher, messaging.max_body_len);
        Self {
            registry,
            ingest,
            messaging,
        }
    }
}

/// Builds the HTTP and WebSocket router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/ws", get(ws::upgrade))
        .route("/messages", post(routes::messages::submit))
        .route("/messages/room/{room}", get(routes::messages::room_history))
        .route(
            "/messages/{user_a}/{user_b}",
            get(routes::messages::conversation),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

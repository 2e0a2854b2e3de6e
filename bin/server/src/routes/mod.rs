//! HTTP route handlers.

pub mod messages;

/// Liveness check.
pub async fn health() -> &'static str {
    "ok"
}

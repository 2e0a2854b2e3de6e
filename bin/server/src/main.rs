use alumnet_messaging::{InMemoryMessageStore, MessageStore};
use alumnet_server::{
    app::{self, AppState},
    config::ServerConfig,
    db::PgMessageStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let store: Arc<dyn MessageStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let store = PgMessageStore::connect(url, config.database.max_connections)
                .await
                .expect("failed to initialize message store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, messages are kept in memory only");
            Arc::new(InMemoryMessageStore::new())
        }
    };

    let state = Arc::new(AppState::new(store, config.messaging));
    let app = app::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

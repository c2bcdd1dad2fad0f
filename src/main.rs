use std::sync::Arc;

use tasks_sync::application::notifier::TracingNotifier;
use tasks_sync::application::todo_controller::TodoController;
use tasks_sync::config::AppConfig;
use tasks_sync::domain::store::DocumentStore;
use tasks_sync::http::routing::{self, todos};
use tasks_sync::infrastructure::{
    memory_store::InMemoryDocumentStore, sqlite_store::SqliteDocumentStore, store_repo::StoreTodoRepository,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;
    let check = std::env::args().any(|arg| arg == "--check");

    if config.uses_memory_store() {
        tracing::warn!("using in-memory store; tasks are lost on exit");
        run(InMemoryDocumentStore::new(), &config, check).await
    } else {
        let store = SqliteDocumentStore::connect(&config.database_url).await?;
        store.init().await?;
        run(store, &config, check).await
    }
}

async fn run<S: DocumentStore>(store: S, config: &AppConfig, check: bool) -> anyhow::Result<()> {
    let repo = StoreTodoRepository::new(store)
        .with_collection(&config.collection)
        .with_delete_policy(config.delete_policy);
    let controller = TodoController::new(repo, Arc::new(TracingNotifier), config.controller());

    if check {
        controller.test_store_connection().await?;
        tracing::info!("store connection check passed");
        return Ok(());
    }

    let router = routing::app(todos::router(todos::AppState::new(controller)));
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(tokio::net::TcpListener::bind(config.bind_addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::ctrl_c;
    let _ = ctrl_c().await;
    tracing::info!("shutdown");
}

use std::sync::Arc;

use tokio::net::TcpListener;

use model_gateway::gateway::{DirectoryWatcher, HttpWorkerRegistry, WorkerDirectory};
use model_gateway::{logging, moderation, routes, AppState, Config, Dispatcher};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    logging::init_tracing(&config.logging.level);

    tracing::info!("Starting Model Gateway");

    // The directory must be populated before serving
    let registry = Arc::new(HttpWorkerRegistry::new(&config.registry)?);
    let directory = Arc::new(WorkerDirectory::new(registry));
    directory
        .refresh()
        .await
        .map_err(|e| format!("Initial worker directory refresh failed: {}", e))?;
    tracing::info!(models = ?directory.all_models(), "Worker directory loaded");

    let watcher = DirectoryWatcher::spawn(directory.clone(), config.registry.refresh_interval());

    let moderation = moderation::from_config(&config.moderation)?;
    let dispatcher = Dispatcher::new(directory, moderation, &config.chat)?;
    tracing::info!(
        max_concurrent = config.chat.max_concurrent,
        max_length_of_question = config.chat.max_length_of_question,
        "Dispatcher ready"
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        dispatcher: Arc::new(dispatcher),
    });

    let app = routes::router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, stopping directory watcher");
    watcher.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

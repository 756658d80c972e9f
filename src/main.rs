use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{error, info, warn};

use yatube::{
    app::{create_router, AppState},
    config::Config,
    middleware::init_tracing,
    models::NewGroup,
    store::{Database, MemoryStore, Store},
};

#[tokio::main]
async fn main() {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize structured logging
    if let Err(e) = init_tracing(&config.environment) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }
    info!("Configuration loaded successfully");

    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to prepare the store: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&config.site.media_root).await {
        error!("Failed to create media root {}: {}", config.site.media_root.display(), e);
        std::process::exit(1);
    }

    // Create the Axum router with all pages
    let app = create_router(AppState::new(store, config.site.clone()));

    // Create socket address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // Start the server with graceful shutdown handling
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// PostgreSQL when configured, otherwise a seeded in-memory store.
async fn open_store(config: &Config) -> yatube::AppResult<Arc<dyn Store>> {
    match config.database.clone() {
        Some(database_config) => {
            let database = Database::new(database_config).await?;
            info!("Database connection established");

            database.migrate().await?;
            if config.environment.is_local() {
                database.seed_groups().await?;
            }
            Ok(Arc::new(database))
        }
        None => {
            warn!("No database configured, using the in-memory store; data is lost on restart");
            let store = MemoryStore::new();
            store
                .create_group(NewGroup::new("General", "general", "Posts about everything"))
                .await?;
            Ok(Arc::new(store))
        }
    }
}

/// Graceful shutdown signal handler
/// Listens for SIGTERM and SIGINT signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM signal, initiating graceful shutdown");
        },
    }
}

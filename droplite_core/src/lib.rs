//! Core library for the Droplite file service: storage, metadata and the
//! HTTP routes that expose them.

pub mod config;
pub mod database;
pub mod error;
pub mod files;
pub mod handlers;
pub mod middleware;

pub use config::AppConfig;
pub use database::{get_database_pool, run_migrations, DatabaseManager};
pub use error::{AppError, Result};
pub use files::{
    FileManager, FileRecord, FileRepository, FileRepositoryTrait, FileValidationConfig,
    FileValidator, LocalBlobStore, MemoryFileRepository,
};
pub use handlers::routes::create_routes;
pub use middleware::cors::{cors_layer_from_config, cors_layer_permissive};

use axum::{extract::DefaultBodyLimit, Router};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::info;

/// Room for multipart boundaries and part headers on top of the file bytes.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub app_name: String,
    pub version: String,
    pub api_prefix: String,
    pub file_manager: FileManager,
    pub db_manager: Option<DatabaseManager>,
}

impl AppState {
    pub fn new(file_manager: FileManager) -> Self {
        Self {
            app_name: "Droplite".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_prefix: config::ServerConfig::default().api_prefix,
            file_manager,
            db_manager: None,
        }
    }

    pub fn with_database(mut self, db_manager: DatabaseManager) -> Self {
        self.db_manager = Some(db_manager);
        self
    }

    pub fn with_api_prefix(mut self, api_prefix: impl Into<String>) -> Self {
        self.api_prefix = api_prefix.into();
        self
    }
}

/// Builds the blob store, metadata store and file manager described by
/// `config`, running migrations when SQLite is used.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let blobs = LocalBlobStore::open(&config.storage.upload_dir).await?;
    let validator = FileValidator::new(FileValidationConfig::from(&config.storage));

    let (repository, db_manager): (Arc<dyn FileRepositoryTrait>, Option<DatabaseManager>) =
        if config.uses_memory_database() {
            info!("Using in-memory metadata store");
            (Arc::new(MemoryFileRepository::new()), None)
        } else {
            let pool = get_database_pool(&config.database).await?;
            run_migrations(pool.clone()).await?;
            (
                Arc::new(FileRepository::new(pool.clone())),
                Some(DatabaseManager::new(pool)),
            )
        };

    let file_manager = FileManager::new(validator, blobs, repository);
    let mut state = AppState::new(file_manager).with_api_prefix(config.server.api_prefix.clone());
    if let Some(db_manager) = db_manager {
        state = state.with_database(db_manager);
    }

    Ok(state)
}

pub fn create_app(state: AppState, config: &AppConfig) -> Router {
    let body_limit = usize::try_from(config.storage.max_file_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let router = create_routes(&state.api_prefix)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer_from_config(&config.cors));

    middleware::logging::with_request_tracing(router).with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<()> {
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

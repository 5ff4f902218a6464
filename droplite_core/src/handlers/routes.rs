//! Route table for the file service

use axum::{
    routing::{get, post},
    Router,
};

use super::{files, health};
use crate::AppState;

pub fn create_file_routes() -> Router<AppState> {
    Router::new()
        .route("/files", get(files::list_files))
        .route("/files/upload", post(files::upload_file))
        .route("/files/download/:id", get(files::download_file))
        .route("/files/view/:id", get(files::view_file))
        .route(
            "/files/:id",
            get(files::get_file_info).delete(files::delete_file),
        )
}

/// File routes nested under `api_prefix`, plus `/health` at the root.
pub fn create_routes(api_prefix: &str) -> Router<AppState> {
    let prefix = api_prefix.trim_end_matches('/');
    let api = if prefix.is_empty() {
        create_file_routes()
    } else {
        Router::new().nest(prefix, create_file_routes())
    };

    Router::new()
        .route("/health", get(health::handle_health))
        .merge(api)
}

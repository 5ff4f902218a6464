//! Health check handler

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let mut issues = Vec::new();

    let file_count = match state.file_manager.repository().count().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Metadata store health check failed: {}", e);
            issues.push("metadata_store_unavailable");
            None
        }
    };

    let database_status = match &state.db_manager {
        Some(db_manager) => match db_manager.health_check().await {
            Ok(_) => "healthy",
            Err(_) => {
                issues.push("database_unavailable");
                "unhealthy"
            }
        },
        None => "in_memory",
    };

    if issues.is_empty() {
        (
            StatusCode::OK,
            Json(ApiResponse::success(json!({
                "status": "healthy",
                "app": state.app_name,
                "version": state.version,
                "timestamp": chrono::Utc::now().timestamp(),
                "database_status": database_status,
                "file_count": file_count,
            }))),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error(format!(
                "Service unhealthy: {}",
                issues.join(", ")
            ))),
        )
    }
}

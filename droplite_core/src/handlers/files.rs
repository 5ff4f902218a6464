use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::{
    error::{AppError, Result},
    files::{guess_content_type, FileRecord},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct FileUploadResponse {
    #[serde(flatten)]
    pub file: FileRecord,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

impl FileUploadResponse {
    fn new(file: FileRecord, api_prefix: &str) -> Self {
        let download_url = format!(
            "{}/files/download/{}",
            api_prefix.trim_end_matches('/'),
            file.id
        );
        Self { file, download_url }
    }
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileUploadResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(format!("Failed to read multipart field: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing filename".to_string()))?
            .to_string();

        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(&filename));

        let data = field.bytes().await.map_err(|e| {
            AppError::BadRequest(format!("Failed to read file data: {}", e))
        })?;

        let mut reader: &[u8] = &data;
        let record = state
            .file_manager
            .store_file(&filename, &content_type, data.len() as u64, &mut reader)
            .await?;

        return Ok(Json(FileUploadResponse::new(record, &state.api_prefix)));
    }

    Err(AppError::BadRequest("No file found in request".to_string()))
}

pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileRecord>>> {
    Ok(Json(state.file_manager.list_files().await?))
}

pub async fn get_file_info(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FileRecord>> {
    Ok(Json(state.file_manager.get_file(id).await?))
}

pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response> {
    let (record, file) = state.file_manager.open_for_download(id).await?;
    let data = read_blob(&record, file).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        attachment_disposition(&record.original_name),
    );

    Ok((StatusCode::OK, headers, data).into_response())
}

pub async fn view_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response> {
    let (record, file, content_type) = state.file_manager.open_for_view(id).await?;
    let data = read_blob(&record, file).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );

    Ok((StatusCode::OK, headers, data).into_response())
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.file_manager.delete_file(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn read_blob(record: &FileRecord, mut file: File) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    file.read_to_end(&mut data).await.map_err(|e| {
        AppError::Storage(format!("Failed to read {}: {}", record.storage_path, e))
    })?;
    Ok(data)
}

fn attachment_disposition(original_name: &str) -> HeaderValue {
    let ascii_name: String = original_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut value = format!("attachment; filename=\"{}\"", ascii_name);
    if ascii_name != original_name {
        value.push_str("; filename*=UTF-8''");
        for byte in original_name.bytes() {
            if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
                value.push(byte as char);
            } else {
                value.push_str(&format!("%{:02X}", byte));
            }
        }
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

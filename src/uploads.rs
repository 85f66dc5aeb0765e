use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::WorkspaceRole;
use crate::core::shared::state::AppState;
use crate::workspaces::workspace_access;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub key: String,
    pub size: usize,
    pub content_type: String,
}

/// Keep filenames to a conservative character set for object keys.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '-').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn allowed_content_type(content_type: &str) -> bool {
    content_type.starts_with("image/") || content_type == "application/pdf"
}

fn content_type_of(headers: &HeaderMap, filename: &str) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_lowercase())
        .filter(|v| !v.is_empty() && v != "application/octet-stream")
        .unwrap_or_else(|| {
            mime_guess::from_path(filename)
                .first()
                .map(|m| m.essence_str().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string())
        })
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    CurrentUser { user, .. }: CurrentUser,
    Path((slug, filename)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let access = workspace_access(&state, &slug, &user, WorkspaceRole::Editor).await?;
    let filename = sanitize_filename(&filename)
        .ok_or_else(|| ApiError::validation("Invalid filename"))?;

    if body.is_empty() {
        return Err(ApiError::validation("Upload body is empty"));
    }
    if body.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::PayloadTooLarge(format!(
            "Uploads are limited to {} MiB",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    let content_type = content_type_of(&headers, &filename);
    if !allowed_content_type(&content_type) {
        return Err(ApiError::validation(format!(
            "Unsupported file type: {content_type}"
        )));
    }

    let key = format!("{}/{}-{}", access.workspace.id, Uuid::new_v4(), filename);
    tracing::debug!("Writing upload {} as {}", key, content_type);
    let size = body.len();
    state
        .drive
        .put(&key, body, &content_type)
        .await
        .map_err(|e| ApiError::Internal(format!("Upload failed: {e}")))?;
    log::info!("Stored upload {} ({} bytes) for {}", key, size, access.workspace.slug);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: state.drive.public_url(&key),
            key,
            size,
            content_type,
        }),
    ))
}

pub async fn serve_upload(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    tracing::debug!("Serving upload {}", key);
    let object = state
        .drive
        .get(&key)
        .await
        .map_err(|e| ApiError::Internal(format!("Download failed: {e}")))?
        .ok_or_else(|| ApiError::not_found("File"))?;
    Ok(([(header::CONTENT_TYPE, object.content_type)], object.body))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/workspaces/{slug}/uploads/{filename}",
            put(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/uploads/{*key}", get(serve_upload))
}

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use dualfm_backend::drivers::SftpConnectConfig;
use dualfm_backend::search::is_text_kind;
use dualfm_backend::session::StorageBox;
use dualfm_backend::storage::{folder_size as compute_folder_size, RemoteStorage, StorageError};
use dualfm_backend::utils::{fix_and_clean_path, format_size, get_ext, join_path};

use super::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathBody {
    pub path: Option<String>,
}

/// Current session or 401 / 获取当前会话
fn require_session(state: &AppState) -> Result<StorageBox, ApiError> {
    state
        .sessions
        .current()
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "No SFTP connection available"))
}

fn storage_error(err: StorageError) -> ApiError {
    let status = match &err {
        StorageError::NotConnected => StatusCode::UNAUTHORIZED,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        StorageError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        StorageError::ConnectionLost(_) | StorageError::Remote(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

/// POST /api/sftp/connect - 建立SFTP连接
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SftpConnectConfig>,
) -> Result<Json<Value>, ApiError> {
    config
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let timeout = Duration::from_secs(state.config.sftp.connect_timeout_secs);
    let info = state.sessions.connect(&config, timeout).await.map_err(|e| {
        tracing::error!("SFTP connection error: {:#}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Connection failed: {}", e),
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "message": "Connected successfully",
        "user": { "host": info.host, "username": info.username }
    })))
}

/// DELETE /api/sftp/connect - 断开连接
pub async fn disconnect(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.sessions.disconnect().await;
    Json(json!({
        "success": true,
        "message": "Disconnected successfully"
    }))
}

/// GET /api/sftp/connect - 连接状态
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.sessions.info() {
        Some(info) => Json(json!({
            "connected": true,
            "host": info.host,
            "username": info.username,
            "connectedAt": info.connected_at.to_rfc3339(),
        })),
        None => Json(json!({ "connected": false })),
    }
}

/// GET /api/sftp/files - 列出远程目录
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Value>, ApiError> {
    let storage = require_session(&state)?;
    let path = fix_and_clean_path(&query.path.unwrap_or_default());

    let mut entries = storage.list(&path).await.map_err(|e| {
        tracing::error!("SFTP list error: {}", e);
        storage_error(e)
    })?;

    // Folders first, then natural name order / 文件夹优先，自然排序
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => natord::compare(&a.name, &b.name),
    });

    let files: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "name": e.name,
                "type": if e.is_dir { "folder" } else { "file" },
                "size": e.size,
                "modified": e.modified.map(|m| m.to_rfc3339()),
                "path": join_path(&path, &e.name),
            })
        })
        .collect();

    Ok(Json(json!({
        "files": files,
        "currentPath": path
    })))
}

/// GET /api/sftp/read-file - 文本文件预览
pub async fn read_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Value>, ApiError> {
    let raw_path = query
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Path parameter required"))?;
    let path = fix_and_clean_path(&raw_path);
    let storage = require_session(&state)?;

    let entry = storage.metadata(&path).await.map_err(storage_error)?;
    if entry.is_dir {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Path is a directory, not a file",
        ));
    }

    let limit = state.config.sftp.preview_max_size;
    if entry.size > limit {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "File too large for preview",
        ));
    }
    if !is_text_kind(&entry.name) {
        return Err(api_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "File type not supported for preview",
        ));
    }

    let content = storage.read_file(&path, limit).await.map_err(|e| {
        tracing::error!("Read file error: {}", e);
        storage_error(e)
    })?;

    Ok(Json(json!({
        "type": "text",
        "content": String::from_utf8_lossy(&content),
        "size": entry.size,
        "extension": get_ext(&entry.name),
        "encoding": "utf-8"
    })))
}

/// POST /api/sftp/folder-size - 递归计算目录大小
pub async fn folder_size(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PathBody>,
) -> Result<Json<Value>, ApiError> {
    let raw_path = body
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Path is required"))?;
    let path = fix_and_clean_path(&raw_path);
    let storage = require_session(&state)?;

    let size = compute_folder_size(storage.as_ref(), &path).await;

    Ok(Json(json!({
        "size": size,
        "path": path,
        "formattedSize": format_size(size)
    })))
}

pub mod search;
pub mod server;
pub mod sftp;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Handler error: status plus `{ error, success: false }` / 接口错误
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({
            "error": message.into(),
            "success": false
        })),
    )
}

/// Build the HTTP router / 构建路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(server::health_check))
        .route(
            "/api/sftp/connect",
            post(sftp::connect).delete(sftp::disconnect).get(sftp::status),
        )
        .route("/api/sftp/files", get(sftp::list_files))
        .route("/api/sftp/read-file", get(sftp::read_file))
        .route("/api/sftp/folder-size", post(sftp::folder_size))
        .route("/api/sftp/search", post(search::search).get(search::search_info))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

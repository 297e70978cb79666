use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use dualfm_backend::config::SearchConfig;
use dualfm_backend::search::{SearchEngine, SearchError, SearchRequest, TEXT_EXTENSIONS};
use dualfm_backend::utils::format_size;

use super::{api_error, ApiError};
use crate::state::AppState;

/// POST /api/sftp/search request body / 搜索请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default = "default_true")]
    pub search_in_content: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub use_regex: bool,
    #[serde(default)]
    pub file_types: Option<Vec<String>>,
    #[serde(default)]
    pub min_size: Option<u64>,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub modified_after: Option<String>,
    #[serde(default)]
    pub modified_before: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub max_matches_per_file: Option<usize>,
    #[serde(default)]
    pub max_content_size: Option<u64>,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

/// Parse an ISO-8601 date or date-time; date-only and zone-less values are UTC / 解析日期
fn parse_date(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(dt.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(dt.and_utc()));
        }
    }
    Err(format!("Invalid date for {}: {}", field, value))
}

impl SearchBody {
    /// Convert to an engine request, filling omitted caps from config / 转换为搜索请求
    pub fn into_request(self, defaults: &SearchConfig) -> Result<SearchRequest, String> {
        let modified_after = parse_date("modifiedAfter", self.modified_after.as_deref())?;
        let modified_before = parse_date("modifiedBefore", self.modified_before.as_deref())?;

        let mut request = SearchRequest::with_defaults(self.path, defaults)
            .recursive(self.recursive)
            .search_in_content(self.search_in_content)
            .case_sensitive(self.case_sensitive)
            .use_regex(self.use_regex)
            .file_types(self.file_types.unwrap_or_default())
            .size_range(self.min_size, self.max_size)
            .modified_range(modified_after, modified_before);

        if let Some(query) = self.query {
            request = request.query(query);
        }
        if let Some(max) = self.max_results {
            request = request.with_max_results(max);
        }
        if let Some(max) = self.max_matches_per_file {
            request = request.with_max_matches_per_file(max);
        }
        if let Some(max) = self.max_content_size {
            request = request.with_max_content_size(max);
        }
        Ok(request)
    }
}

/// Effective options echoed back to the caller
fn echo_options(request: &SearchRequest) -> Value {
    json!({
        "query": request.query,
        "path": request.root_path,
        "recursive": request.recursive,
        "searchInContent": request.search_in_content,
        "caseSensitive": request.case_sensitive,
        "useRegex": request.use_regex,
        "fileTypes": request.file_types,
        "filters": {
            "minSize": request.min_size,
            "maxSize": request.max_size,
            "modifiedAfter": request.modified_after.map(|d| d.to_rfc3339()),
            "modifiedBefore": request.modified_before.map(|d| d.to_rfc3339()),
        },
        "maxResults": request.max_results,
        "maxMatchesPerFile": request.max_matches_per_file,
        "maxContentSize": request.max_content_size,
    })
}

/// POST /api/sftp/search - 远程递归搜索
pub async fn search(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let storage = state
        .sessions
        .current()
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Not connected to SFTP"))?;

    let Json(body) = payload.map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, format!("Invalid search request: {}", e.body_text()))
    })?;

    let request = body
        .into_request(&state.config.search)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    tracing::debug!(
        "Search request: query={:?} path={} recursive={} content={} regex={}",
        request.query,
        request.root_path,
        request.recursive,
        request.search_in_content,
        request.use_regex
    );

    let results = SearchEngine::new(storage.as_ref())
        .search(&request)
        .await
        .map_err(|e| {
            tracing::error!("SFTP search error: {}", e);
            match e {
                SearchError::NotConnected => api_error(StatusCode::UNAUTHORIZED, "Not connected to SFTP"),
                SearchError::InvalidOptions(msg) => api_error(StatusCode::BAD_REQUEST, msg),
                other => api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Search failed: {}", other),
                ),
            }
        })?;

    Ok(Json(json!({
        "success": true,
        "totalResults": results.len(),
        "results": results,
        "searchOptions": echo_options(&request),
    })))
}

/// GET /api/sftp/search - 搜索能力说明
pub async fn search_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let defaults = &state.config.search;
    Json(json!({
        "message": "Use POST method to perform search",
        "supportedFileTypes": TEXT_EXTENSIONS,
        "maxFileSize": format_size(defaults.max_content_size),
        "maxResults": defaults.max_results,
    }))
}

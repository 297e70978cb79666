//! Per-entry filter predicates / 条目过滤
//!
//! Applied in order extension -> size -> modified time, stopping at the first
//! failure.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use super::schema::SearchRequest;
use crate::storage::Entry;
use crate::utils::get_ext;

/// Extensions whose bodies are scanned for content matches / 可搜索内容的文本扩展名
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "js", "ts", "jsx", "tsx", "json", "xml", "html", "css", "scss", "sass",
    "py", "java", "c", "cpp", "h", "hpp", "cs", "php", "rb", "go", "rs", "sh", "bash",
    "yml", "yaml", "toml", "ini", "conf", "config", "env", "gitignore", "dockerfile",
    "sql", "r", "scala", "kt", "swift", "dart", "vue", "svelte", "astro", "mjs",
    "log", "csv", "tsv", "properties", "cfg",
];

static TEXT_EXTENSION_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| TEXT_EXTENSIONS.iter().copied().collect());

/// Whether a file name has a recognized text extension (case-insensitive) / 是否为文本文件
pub fn is_text_kind(name: &str) -> bool {
    TEXT_EXTENSION_SET.contains(get_ext(name).as_str())
}

/// Extension allow-list / 扩展名过滤
pub fn matches_file_types(entry: &Entry, request: &SearchRequest) -> bool {
    if request.file_types.is_empty() {
        return true;
    }
    let ext = get_ext(&entry.name);
    request.file_types.iter().any(|t| *t == ext)
}

/// Inclusive size bounds / 大小过滤
pub fn matches_size(entry: &Entry, request: &SearchRequest) -> bool {
    if let Some(min) = request.min_size {
        if entry.size < min {
            return false;
        }
    }
    if let Some(max) = request.max_size {
        if entry.size > max {
            return false;
        }
    }
    true
}

/// Inclusive modified-time bounds; an unknown time fails any bound / 修改时间过滤
pub fn matches_modified(entry: &Entry, request: &SearchRequest) -> bool {
    if request.modified_after.is_none() && request.modified_before.is_none() {
        return true;
    }
    let Some(modified) = entry.modified else {
        return false;
    };
    if let Some(after) = request.modified_after {
        if modified < after {
            return false;
        }
    }
    if let Some(before) = request.modified_before {
        if modified > before {
            return false;
        }
    }
    true
}

/// All filters, short-circuiting / 依次应用全部过滤器
pub fn passes_filters(entry: &Entry, request: &SearchRequest) -> bool {
    matches_file_types(entry, request)
        && matches_size(entry, request)
        && matches_modified(entry, request)
}

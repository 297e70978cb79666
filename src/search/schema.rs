//! Search request and result schema / 搜索请求与结果定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

/// Search request - one live walk of the remote tree / 搜索请求
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Query pattern; `None` lists everything that passes the filters / 搜索关键词
    pub query: Option<String>,
    /// Absolute remote path the walk starts from / 起始路径
    pub root_path: String,
    /// Descend into subdirectories / 是否递归
    pub recursive: bool,
    /// Scan file bodies as well as names / 是否搜索内容
    pub search_in_content: bool,
    pub case_sensitive: bool,
    /// Compile the query as a regex, falling back to literal on bad patterns / 正则模式
    pub use_regex: bool,
    /// Lowercase extensions without dot; empty means no restriction / 扩展名白名单
    pub file_types: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub modified_after: Option<DateTime<Utc>>,
    pub modified_before: Option<DateTime<Utc>>,
    /// Cap on total results / 最大结果数
    pub max_results: usize,
    /// Cap on recorded content matches per file / 每文件最大匹配数
    pub max_matches_per_file: usize,
    /// Files above this size are never opened for content scanning / 内容扫描大小上限
    pub max_content_size: u64,
    /// Characters of context on each side of a content match / 片段上下文
    pub snippet_context: usize,
}

impl SearchRequest {
    pub fn new(root_path: impl Into<String>) -> Self {
        Self::with_defaults(root_path, &SearchConfig::default())
    }

    /// Build a request whose caps come from configuration / 使用配置默认值
    pub fn with_defaults(root_path: impl Into<String>, defaults: &SearchConfig) -> Self {
        Self {
            query: None,
            root_path: root_path.into(),
            recursive: true,
            search_in_content: true,
            case_sensitive: false,
            use_regex: false,
            file_types: Vec::new(),
            min_size: None,
            max_size: None,
            modified_after: None,
            modified_before: None,
            max_results: defaults.max_results,
            max_matches_per_file: defaults.max_matches_per_file,
            max_content_size: defaults.max_content_size,
            snippet_context: defaults.snippet_context,
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn recursive(mut self, enabled: bool) -> Self {
        self.recursive = enabled;
        self
    }

    pub fn search_in_content(mut self, enabled: bool) -> Self {
        self.search_in_content = enabled;
        self
    }

    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    pub fn use_regex(mut self, enabled: bool) -> Self {
        self.use_regex = enabled;
        self
    }

    pub fn file_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.file_types = types
            .into_iter()
            .map(|t| t.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn size_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    pub fn modified_range(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.modified_after = after;
        self.modified_before = before;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_max_matches_per_file(mut self, max: usize) -> Self {
        self.max_matches_per_file = max;
        self
    }

    pub fn with_max_content_size(mut self, max: u64) -> Self {
        self.max_content_size = max;
        self
    }

    /// The query, with an empty string treated as absent / 有效关键词
    pub fn effective_query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }
}

/// Why a file made it into the results / 匹配类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Matched by name only (or list-all mode) / 仅文件名匹配
    Filename,
    /// Has at least one content match / 内容匹配
    Content,
}

/// One located occurrence inside a file / 内容匹配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMatch {
    /// 1-based / 从1开始的行号
    pub line_number: usize,
    /// Matched line clipped to the context window / 上下文片段
    #[serde(rename = "content")]
    pub snippet: String,
    /// Offset of the match inside `snippet`, in chars / 片段内的匹配起点
    pub match_start: usize,
    /// Length of the match, in chars / 匹配长度
    pub match_length: usize,
    pub relevance: u8,
}

/// One file that satisfied the search / 搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub path: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "modified")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: ResultKind,
    /// Max of the name score and every content score / 相关性
    pub relevance: u8,
    pub matches: Vec<ContentMatch>,
    #[serde(rename = "isTextFile")]
    pub is_text_kind: bool,
}

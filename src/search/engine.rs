//! Search traversal engine / 搜索遍历引擎
//!
//! Walks the remote tree live for every request. The walk is depth-first with an
//! explicit stack of directory listings, so a subdirectory's entries are visited
//! as soon as it is encountered and before its later siblings. Results are
//! collected until `max_results` is reached, then reordered by `aggregate`.

use std::time::Instant;

use super::filter::{is_text_kind, passes_filters};
use super::matcher::QueryMatcher;
use super::schema::{ResultKind, SearchRequest, SearchResult};
use crate::storage::{Entry, RemoteStorage, StorageError};
use crate::utils::{fix_and_clean_path, join_path};

/// Fatal search failure / 搜索失败
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("not connected to remote storage")]
    NotConnected,
    #[error("invalid search options: {0}")]
    InvalidOptions(String),
    #[error("cannot read {path}: {source}")]
    RootUnreachable {
        path: String,
        #[source]
        source: StorageError,
    },
}

/// Walk counters, logged once per search
#[derive(Debug, Default)]
struct WalkStats {
    dirs_listed: usize,
    dirs_failed: usize,
    files_scanned: usize,
    reads_failed: usize,
}

/// Search engine over one remote session / 搜索引擎
pub struct SearchEngine<'a> {
    storage: &'a dyn RemoteStorage,
}

impl<'a> SearchEngine<'a> {
    pub fn new(storage: &'a dyn RemoteStorage) -> Self {
        Self { storage }
    }

    /// Run one search and return results sorted for presentation / 执行搜索
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        validate(request)?;
        if !self.storage.is_connected() {
            return Err(SearchError::NotConnected);
        }

        let started = Instant::now();
        let mut stats = WalkStats::default();
        let results = self.walk(request, &mut stats).await?;

        tracing::info!(
            "Search under {} finished: {} results, {} dirs listed ({} failed), {} files scanned ({} failed) in {:?}",
            request.root_path,
            results.len(),
            stats.dirs_listed,
            stats.dirs_failed,
            stats.files_scanned,
            stats.reads_failed,
            started.elapsed()
        );

        Ok(aggregate(results))
    }

    async fn walk(
        &self,
        request: &SearchRequest,
        stats: &mut WalkStats,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let root = fix_and_clean_path(&request.root_path);
        let matcher = request
            .effective_query()
            .map(|q| QueryMatcher::new(q, request.case_sensitive, request.use_regex, request.snippet_context));

        let root_entries = self
            .storage
            .list(&root)
            .await
            .map_err(|source| SearchError::RootUnreachable {
                path: root.clone(),
                source,
            })?;
        stats.dirs_listed += 1;

        let mut stack: Vec<(String, std::vec::IntoIter<Entry>)> = vec![(root, root_entries.into_iter())];
        let mut results = Vec::new();

        loop {
            if results.len() >= request.max_results {
                tracing::debug!("Result cap {} reached, stopping walk", request.max_results);
                break;
            }
            let Some((dir, entries)) = stack.last_mut() else {
                break;
            };
            let Some(entry) = entries.next() else {
                stack.pop();
                continue;
            };
            let path = join_path(dir, &entry.name);

            if entry.is_dir {
                if !request.recursive {
                    continue;
                }
                match self.storage.list(&path).await {
                    Ok(children) => {
                        tracing::debug!("Listed {} ({} entries)", path, children.len());
                        stats.dirs_listed += 1;
                        stack.push((path, children.into_iter()));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to search in directory {}: {}", path, e);
                        stats.dirs_failed += 1;
                    }
                }
                continue;
            }

            if let Some(result) = self.evaluate_file(&entry, path, request, matcher.as_ref(), stats).await {
                results.push(result);
            }
        }

        Ok(results)
    }

    /// Filter, match and score one file entry / 处理单个文件
    async fn evaluate_file(
        &self,
        entry: &Entry,
        path: String,
        request: &SearchRequest,
        matcher: Option<&QueryMatcher>,
        stats: &mut WalkStats,
    ) -> Option<SearchResult> {
        if !passes_filters(entry, request) {
            return None;
        }
        let is_text_kind = is_text_kind(&entry.name);

        let Some(matcher) = matcher else {
            // List-all mode
            return Some(SearchResult {
                path,
                name: entry.name.clone(),
                size: entry.size,
                modified_at: entry.modified,
                kind: ResultKind::Filename,
                relevance: 0,
                matches: Vec::new(),
                is_text_kind,
            });
        };

        let name_relevance = matcher.match_name(&entry.name);

        let mut matches = Vec::new();
        if request.search_in_content && is_text_kind && entry.size <= request.max_content_size {
            stats.files_scanned += 1;
            match self.storage.read_file(&path, request.max_content_size).await {
                Ok(body) => {
                    let text = String::from_utf8_lossy(&body);
                    matches = matcher.match_content(&text, request.max_matches_per_file);
                }
                Err(e) => {
                    tracing::warn!("Failed to read file for content search {}: {}", path, e);
                    stats.reads_failed += 1;
                }
            }
        }

        if name_relevance.is_none() && matches.is_empty() {
            return None;
        }

        let relevance = matches
            .iter()
            .map(|m| m.relevance)
            .chain(name_relevance)
            .max()
            .unwrap_or(0);
        let kind = if matches.is_empty() {
            ResultKind::Filename
        } else {
            ResultKind::Content
        };

        Some(SearchResult {
            path,
            name: entry.name.clone(),
            size: entry.size,
            modified_at: entry.modified,
            kind,
            relevance,
            matches,
            is_text_kind,
        })
    }
}

fn validate(request: &SearchRequest) -> Result<(), SearchError> {
    if request.max_results == 0 {
        return Err(SearchError::InvalidOptions("maxResults must be positive".into()));
    }
    if request.max_matches_per_file == 0 {
        return Err(SearchError::InvalidOptions("maxMatchesPerFile must be positive".into()));
    }
    if request.max_content_size == 0 {
        return Err(SearchError::InvalidOptions("maxContentSize must be positive".into()));
    }
    Ok(())
}

/// Order results: content matches first, then relevance descending; stable otherwise / 结果排序
pub fn aggregate(mut results: Vec<SearchResult>) -> Vec<SearchResult> {
    fn kind_rank(kind: ResultKind) -> u8 {
        match kind {
            ResultKind::Content => 0,
            ResultKind::Filename => 1,
        }
    }

    results.sort_by(|a, b| {
        kind_rank(a.kind)
            .cmp(&kind_rank(b.kind))
            .then_with(|| b.relevance.cmp(&a.relevance))
    });
    results
}

/// Convenience wrapper over `SearchEngine` / 搜索入口
pub async fn search(
    storage: &dyn RemoteStorage,
    request: &SearchRequest,
) -> Result<Vec<SearchResult>, SearchError> {
    SearchEngine::new(storage).search(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::{TimeZone, Utc};

    /// /docs/a.txt "hello world", /docs/sub/b.txt "hello again"
    fn docs_tree() -> MemoryStorage {
        MemoryStorage::new()
            .with_file("/docs/a.txt", "hello world")
            .with_file("/docs/sub/b.txt", "hello again")
    }

    fn paths(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_recursive_content_search() {
        let storage = docs_tree();
        let req = SearchRequest::new("/docs").query("hello");
        let results = search(&storage, &req).await.unwrap();

        assert_eq!(paths(&results), vec!["/docs/a.txt", "/docs/sub/b.txt"]);
        for r in &results {
            assert_eq!(r.kind, ResultKind::Content);
            assert_eq!(r.matches.len(), 1);
            assert_eq!(r.matches[0].line_number, 1);
            assert!(r.is_text_kind);
        }
    }

    #[tokio::test]
    async fn test_non_recursive_skips_subdirectories() {
        let storage = docs_tree();
        let req = SearchRequest::new("/docs").query("hello").recursive(false);
        let results = search(&storage, &req).await.unwrap();
        assert_eq!(paths(&results), vec!["/docs/a.txt"]);
    }

    #[tokio::test]
    async fn test_case_sensitive_no_match() {
        let storage = docs_tree();
        let req = SearchRequest::new("/docs").query("HELLO").case_sensitive(true);
        assert!(search(&storage, &req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_result_cap_keeps_first_visited() {
        let storage = docs_tree();
        let req = SearchRequest::new("/docs").query("hello").with_max_results(1);
        let results = search(&storage, &req).await.unwrap();
        assert_eq!(paths(&results), vec!["/docs/a.txt"]);
    }

    #[tokio::test]
    async fn test_file_types_excludes_everything() {
        let storage = docs_tree();
        let req = SearchRequest::new("/docs").query("hello").file_types(["md"]);
        assert!(search(&storage, &req).await.unwrap().is_empty());

        let list_all = SearchRequest::new("/docs").file_types(["md"]);
        assert!(search(&storage, &list_all).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_depth_first_order() {
        let storage = MemoryStorage::new()
            .with_file("/r/a.txt", "x")
            .with_file("/r/d/b.txt", "x")
            .with_file("/r/d/e/c.txt", "x")
            .with_file("/r/z.txt", "x");
        let req = SearchRequest::new("/r").with_max_results(3);
        let results = search(&storage, &req).await.unwrap();
        assert_eq!(paths(&results), vec!["/r/a.txt", "/r/d/b.txt", "/r/d/e/c.txt"]);
    }

    #[tokio::test]
    async fn test_list_all_mode() {
        let storage = docs_tree().with_file("/docs/image.png", vec![0u8; 4]);
        let results = search(&storage, &SearchRequest::new("/docs")).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.kind == ResultKind::Filename && r.relevance == 0));
        let png = results.iter().find(|r| r.name == "image.png").unwrap();
        assert!(!png.is_text_kind);
    }

    #[tokio::test]
    async fn test_empty_query_is_list_all() {
        let storage = docs_tree();
        let req = SearchRequest::new("/docs").query("");
        assert_eq!(search(&storage, &req).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sorted_content_before_filename() {
        let storage = MemoryStorage::new()
            .with_file("/p/todo.txt", "nothing relevant")
            .with_file("/p/notes.txt", "remember the TODO list")
            .with_file("/p/todo", "binary-ish")
            .with_file("/p/plan.md", "todo: ship it");
        let req = SearchRequest::new("/p").query("todo");
        let results = search(&storage, &req).await.unwrap();

        let kinds: Vec<ResultKind> = results.iter().map(|r| r.kind).collect();
        let first_filename = kinds.iter().position(|k| *k == ResultKind::Filename).unwrap();
        assert!(kinds[first_filename..].iter().all(|k| *k == ResultKind::Filename));
        assert!(kinds[..first_filename].iter().all(|k| *k == ResultKind::Content));
        for group in [&results[..first_filename], &results[first_filename..]] {
            assert!(group.windows(2).all(|w| w[0].relevance >= w[1].relevance));
        }

        // equal relevance keeps traversal order
        assert_eq!(results[0].path, "/p/notes.txt");
        assert_eq!(results[1].path, "/p/plan.md");
        let todo = results.iter().find(|r| r.path == "/p/todo").unwrap();
        assert_eq!(todo.relevance, 100);
        assert_eq!(results.last().unwrap().path, "/p/todo.txt");
    }

    #[tokio::test]
    async fn test_name_and_content_match_reports_content() {
        let storage = MemoryStorage::new().with_file("/hello.txt", "say hello");
        let results = search(&storage, &SearchRequest::new("/").query("hello")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ResultKind::Content);
        assert_eq!(results[0].relevance, 100);
    }

    #[tokio::test]
    async fn test_invalid_regex_does_not_fail() {
        let storage = MemoryStorage::new()
            .with_file("/a.txt", "value [a here")
            .with_file("/b.txt", "nothing");
        let req = SearchRequest::new("/").query("[a").use_regex(true);
        let results = search(&storage, &req).await.unwrap();
        assert_eq!(paths(&results), vec!["/a.txt"]);
        assert_eq!(results[0].matches[0].match_length, 2);
    }

    #[tokio::test]
    async fn test_content_size_gate() {
        let big = format!("needle {}", "x".repeat(100));
        let storage = MemoryStorage::new()
            .with_file("/big.txt", big)
            .with_file("/needle.txt", "x".repeat(200))
            .with_file("/small.txt", "needle");
        let req = SearchRequest::new("/").query("needle").with_max_content_size(50);
        let results = search(&storage, &req).await.unwrap();

        assert!(results.iter().all(|r| r.size <= 50 || r.kind == ResultKind::Filename));
        assert!(!results.iter().any(|r| r.path == "/big.txt"));
        let by_name = results.iter().find(|r| r.path == "/needle.txt").unwrap();
        assert_eq!(by_name.kind, ResultKind::Filename);
        let small = results.iter().find(|r| r.path == "/small.txt").unwrap();
        assert_eq!(small.kind, ResultKind::Content);
    }

    #[tokio::test]
    async fn test_content_size_gate_boundary() {
        let storage = MemoryStorage::new()
            .with_file("/exact.txt", "needle")
            .with_file("/over.txt", "needle!");
        let req = SearchRequest::new("/").query("needle").with_max_content_size(6);
        let results = search(&storage, &req).await.unwrap();

        assert_eq!(paths(&results), vec!["/exact.txt"]);
        assert_eq!(results[0].kind, ResultKind::Content);
        assert_eq!(results[0].matches.len(), 1);
    }

    #[tokio::test]
    async fn test_match_cap_per_file() {
        let body = "hit\n".repeat(50);
        let storage = MemoryStorage::new().with_file("/many.log", body);
        let req = SearchRequest::new("/").query("hit").with_max_matches_per_file(3);
        let results = search(&storage, &req).await.unwrap();
        assert_eq!(results[0].matches.len(), 3);
    }

    #[tokio::test]
    async fn test_filters_hold_for_every_result() {
        let old = Utc.timestamp_opt(1_000_000, 0).single().unwrap();
        let new = Utc.timestamp_opt(2_000_000, 0).single().unwrap();
        let storage = MemoryStorage::new()
            .with_file_at("/f/old.txt", "data data", old)
            .with_file_at("/f/new.txt", "data data", new)
            .with_file_at("/f/tiny.txt", "d", new)
            .with_file_at("/f/new.md", "data data", new);
        let req = SearchRequest::new("/f")
            .file_types(["txt"])
            .size_range(Some(2), Some(100))
            .modified_range(Some(new), None);
        let results = search(&storage, &req).await.unwrap();
        assert_eq!(paths(&results), vec!["/f/new.txt"]);
    }

    #[tokio::test]
    async fn test_subdirectory_failure_is_isolated() {
        let storage = docs_tree()
            .with_file("/docs/locked/c.txt", "hello hidden")
            .fail_list("/docs/locked", StorageError::PermissionDenied("/docs/locked".into()));
        let results = search(&storage, &SearchRequest::new("/docs").query("hello")).await.unwrap();
        assert_eq!(paths(&results), vec!["/docs/a.txt", "/docs/sub/b.txt"]);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_name_match() {
        let storage = MemoryStorage::new()
            .with_file("/hello.txt", "hello")
            .fail_read("/hello.txt", StorageError::ConnectionLost("reset".into()));
        let results = search(&storage, &SearchRequest::new("/").query("hello")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ResultKind::Filename);
        assert_eq!(results[0].relevance, 75);
    }

    #[tokio::test]
    async fn test_unreachable_root_fails() {
        let storage = docs_tree();
        let err = search(&storage, &SearchRequest::new("/missing").query("x")).await.unwrap_err();
        assert!(matches!(err, SearchError::RootUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_not_connected_fails_before_walk() {
        let storage = docs_tree();
        storage.close().await.unwrap();
        let err = search(&storage, &SearchRequest::new("/docs")).await.unwrap_err();
        assert!(matches!(err, SearchError::NotConnected));
    }

    #[tokio::test]
    async fn test_zero_caps_rejected() {
        let storage = docs_tree();
        let req = SearchRequest::new("/docs").with_max_results(0);
        assert!(matches!(
            search(&storage, &req).await,
            Err(SearchError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_aggregate_is_stable() {
        let make = |path: &str, kind, relevance| SearchResult {
            path: path.to_string(),
            name: path.to_string(),
            size: 0,
            modified_at: None,
            kind,
            relevance,
            matches: Vec::new(),
            is_text_kind: true,
        };
        let sorted = aggregate(vec![
            make("f1", ResultKind::Filename, 100),
            make("c1", ResultKind::Content, 70),
            make("c2", ResultKind::Content, 90),
            make("f2", ResultKind::Filename, 100),
            make("c3", ResultKind::Content, 70),
        ]);
        let order: Vec<&str> = sorted.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(order, vec!["c2", "c1", "c3", "f1", "f2"]);
    }
}

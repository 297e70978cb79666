//! In-memory remote storage / 内存存储
//!
//! Simulates a remote directory tree without a network session. Listing order
//! is insertion order, and individual paths can be made to fail on list or read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use super::{Entry, RemoteStorage, StorageError};
use crate::utils::fix_and_clean_path;

/// Modification time given to entries added without an explicit one
fn default_modified() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default()
}

pub struct MemoryStorage {
    /// Directory path -> children in listing order / 目录 -> 子条目
    children: HashMap<String, Vec<Entry>>,
    contents: HashMap<String, Bytes>,
    list_failures: HashMap<String, StorageError>,
    read_failures: HashMap<String, StorageError>,
    connected: AtomicBool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let mut children = HashMap::new();
        children.insert("/".to_string(), Vec::new());
        Self {
            children,
            contents: HashMap::new(),
            list_failures: HashMap::new(),
            read_failures: HashMap::new(),
            connected: AtomicBool::new(true),
        }
    }

    /// Add a directory (and any missing parents) / 添加目录
    pub fn with_dir(mut self, path: &str) -> Self {
        self.ensure_dir(&fix_and_clean_path(path));
        self
    }

    /// Add a file with the default modification time / 添加文件
    pub fn with_file(self, path: &str, content: impl Into<Bytes>) -> Self {
        self.with_file_at(path, content, default_modified())
    }

    /// Add a file with an explicit modification time / 添加带修改时间的文件
    pub fn with_file_at(
        mut self,
        path: &str,
        content: impl Into<Bytes>,
        modified: DateTime<Utc>,
    ) -> Self {
        let path = fix_and_clean_path(path);
        let content = content.into();
        let (parent, name) = split_parent(&path);
        self.ensure_dir(&parent);
        self.push_child(
            &parent,
            Entry {
                name,
                path: path.clone(),
                is_dir: false,
                size: content.len() as u64,
                modified: Some(modified),
            },
        );
        self.contents.insert(path, content);
        self
    }

    /// Make listing `path` fail / 模拟列目录失败
    pub fn fail_list(mut self, path: &str, err: StorageError) -> Self {
        self.list_failures.insert(fix_and_clean_path(path), err);
        self
    }

    /// Make reading `path` fail / 模拟读取失败
    pub fn fail_read(mut self, path: &str, err: StorageError) -> Self {
        self.read_failures.insert(fix_and_clean_path(path), err);
        self
    }

    fn ensure_dir(&mut self, path: &str) {
        if self.children.contains_key(path) {
            return;
        }
        let (parent, name) = split_parent(path);
        self.ensure_dir(&parent);
        self.push_child(
            &parent,
            Entry {
                name,
                path: path.to_string(),
                is_dir: true,
                size: 0,
                modified: Some(default_modified()),
            },
        );
        self.children.insert(path.to_string(), Vec::new());
    }

    fn push_child(&mut self, parent: &str, entry: Entry) {
        let siblings = self.children.entry(parent.to_string()).or_default();
        siblings.retain(|e| e.name != entry.name);
        siblings.push(entry);
    }

    fn find(&self, path: &str) -> Option<&Entry> {
        let (parent, name) = split_parent(path);
        self.children
            .get(&parent)
            .and_then(|siblings| siblings.iter().find(|e| e.name == name))
    }

    fn check_connected(&self) -> Result<(), StorageError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StorageError::NotConnected)
        }
    }
}

fn split_parent(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(pos) => (path[..pos].to_string(), path[pos + 1..].to_string()),
        None => ("/".to_string(), path.to_string()),
    }
}

#[async_trait]
impl RemoteStorage for MemoryStorage {
    fn name(&self) -> &str {
        "Memory"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn list(&self, path: &str) -> Result<Vec<Entry>, StorageError> {
        self.check_connected()?;
        let path = fix_and_clean_path(path);
        if let Some(err) = self.list_failures.get(&path) {
            return Err(err.clone());
        }
        self.children
            .get(&path)
            .cloned()
            .ok_or(StorageError::NotFound(path))
    }

    async fn metadata(&self, path: &str) -> Result<Entry, StorageError> {
        self.check_connected()?;
        let path = fix_and_clean_path(path);
        if path == "/" {
            return Ok(Entry {
                name: String::new(),
                path,
                is_dir: true,
                size: 0,
                modified: Some(default_modified()),
            });
        }
        self.find(&path)
            .cloned()
            .ok_or(StorageError::NotFound(path))
    }

    async fn read_file(&self, path: &str, limit: u64) -> Result<Bytes, StorageError> {
        self.check_connected()?;
        let path = fix_and_clean_path(path);
        if let Some(err) = self.read_failures.get(&path) {
            return Err(err.clone());
        }
        let content = self
            .contents
            .get(&path)
            .ok_or_else(|| StorageError::NotFound(path.clone()))?;
        let size = content.len() as u64;
        if size > limit {
            return Err(StorageError::TooLarge { path, size, limit });
        }
        Ok(content.clone())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let storage = MemoryStorage::new()
            .with_file("/docs/b.txt", "b")
            .with_dir("/docs/sub")
            .with_file("/docs/a.txt", "a");

        let names: Vec<String> = storage
            .list("/docs")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["b.txt", "sub", "a.txt"]);

        let root = storage.list("/").await.unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].is_dir);
        assert_eq!(root[0].path, "/docs");
    }

    #[tokio::test]
    async fn test_read_and_failures() {
        let storage = MemoryStorage::new()
            .with_file("/a.txt", "hello")
            .with_file("/b.txt", "secret")
            .fail_read("/b.txt", StorageError::PermissionDenied("/b.txt".into()))
            .with_dir("/locked")
            .fail_list("/locked", StorageError::PermissionDenied("/locked".into()));

        assert_eq!(storage.read_file("/a.txt", 100).await.unwrap(), "hello");
        assert!(matches!(
            storage.read_file("/a.txt", 2).await,
            Err(StorageError::TooLarge { size: 5, limit: 2, .. })
        ));
        assert!(matches!(
            storage.read_file("/b.txt", 100).await,
            Err(StorageError::PermissionDenied(_))
        ));
        assert!(matches!(
            storage.list("/locked").await,
            Err(StorageError::PermissionDenied(_))
        ));
        assert!(matches!(
            storage.list("/missing").await,
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(storage.metadata("/a.txt").await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn test_close_disconnects() {
        let storage = MemoryStorage::new().with_file("/a.txt", "x");
        storage.close().await.unwrap();
        assert!(!storage.is_connected());
        assert_eq!(storage.list("/").await, Err(StorageError::NotConnected));
    }
}

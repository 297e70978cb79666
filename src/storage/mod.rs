use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File entry information / 文件条目信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Remote access failure / 远程访问错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("file too large: {path} ({size} bytes, limit {limit})")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("not connected")]
    NotConnected,
    #[error("remote error: {0}")]
    Remote(String),
}

/// Remote storage interface (primitive operations only) / 远程存储接口
///
/// One live session behind a shared reference. Callers treat it as read-only
/// and never close it themselves; the session manager owns its lifetime.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Driver name / 驱动名称
    fn name(&self) -> &str;

    /// Whether the underlying session is still usable / 会话是否可用
    fn is_connected(&self) -> bool {
        true
    }

    /// List immediate children of a directory / 列出目录内容
    async fn list(&self, path: &str) -> Result<Vec<Entry>, StorageError>;

    /// Stat a single path / 获取单个路径信息
    async fn metadata(&self, path: &str) -> Result<Entry, StorageError>;

    /// Read a whole file, failing with `TooLarge` if it exceeds `limit` bytes / 读取完整文件
    async fn read_file(&self, path: &str, limit: u64) -> Result<Bytes, StorageError>;

    /// Close the session / 关闭会话
    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

pub mod memory;
pub mod usage;

pub use memory::MemoryStorage;
pub use usage::folder_size;

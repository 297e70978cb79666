//! Remote session manager / 远程会话管理
//!
//! Owns at most one live remote session. Search and listing code borrow it
//! through `current()` and never close it; only connect/disconnect do.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::drivers::{SftpConnectConfig, SftpStorage};
use crate::storage::RemoteStorage;

pub type StorageBox = Arc<dyn RemoteStorage>;

/// Who the current session is connected to / 当前会话信息
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub connected_at: DateTime<Utc>,
}

struct ActiveSession {
    info: SessionInfo,
    storage: StorageBox,
}

/// Session manager (single remote connection) / 会话管理器
#[derive(Clone, Default)]
pub struct SessionManager {
    active: Arc<RwLock<Option<ActiveSession>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an SFTP session, replacing any existing one / 建立SFTP连接
    ///
    /// The old session is closed before dialing, and again in `attach` in case a
    /// concurrent connect installed one while this one was in flight.
    pub async fn connect(&self, config: &SftpConnectConfig, timeout: Duration) -> Result<SessionInfo> {
        self.disconnect().await;

        let storage = SftpStorage::connect(config, timeout).await?;
        let info = SessionInfo {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            connected_at: Utc::now(),
        };
        self.attach(info.clone(), Arc::new(storage)).await;
        Ok(info)
    }

    /// Install an already-open storage as the current session, closing the one
    /// it replaces / 挂载已建立的会话
    pub async fn attach(&self, info: SessionInfo, storage: StorageBox) {
        tracing::info!(
            "Session attached: {}@{}:{} ({})",
            info.username,
            info.host,
            info.port,
            storage.name()
        );
        let previous = self.active.write().replace(ActiveSession { info, storage });
        if let Some(old) = previous {
            Self::close_session(old).await;
        }
    }

    /// Close the current session if any; idempotent / 断开连接
    pub async fn disconnect(&self) -> bool {
        let previous = self.active.write().take();
        match previous {
            Some(session) => {
                Self::close_session(session).await;
                true
            }
            None => false,
        }
    }

    async fn close_session(session: ActiveSession) {
        if let Err(e) = session.storage.close().await {
            tracing::warn!("Failed to close session to {}: {}", session.info.host, e);
        }
        tracing::info!("Session closed: {}", session.info.host);
    }

    /// The live storage, or `None` when not connected / 当前可用会话
    pub fn current(&self) -> Option<StorageBox> {
        self.active
            .read()
            .as_ref()
            .filter(|s| s.storage.is_connected())
            .map(|s| s.storage.clone())
    }

    /// Connection details of the live session / 当前连接信息
    pub fn info(&self) -> Option<SessionInfo> {
        self.active
            .read()
            .as_ref()
            .filter(|s| s.storage.is_connected())
            .map(|s| s.info.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }
}

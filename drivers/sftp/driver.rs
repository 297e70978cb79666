//! SFTP 驱动实现（基于 russh，纯 Rust 异步实现）
//!
//! 特性：
//! - 纯 Rust 实现，无 OpenSSL/Perl 依赖
//! - 单会话保持，整个连接期间复用
//! - 远程错误映射为 StorageError

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Config, Handle, Handler};
use russh::keys::PublicKey;
use russh_sftp::client::SftpSession;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use crate::storage::{Entry, RemoteStorage, StorageError};
use crate::utils::join_path;

/// SFTP 连接参数
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SftpConnectConfig {
    /// 主机名或 IP
    pub host: String,
    /// 端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 密码（与私钥二选一）
    #[serde(default)]
    pub password: Option<String>,
    /// 私钥内容（PEM/OpenSSH）或路径（与密码二选一）
    #[serde(default, rename = "privateKey", alias = "private_key")]
    pub private_key: Option<String>,
    /// 私钥密码
    #[serde(default)]
    pub passphrase: Option<String>,
    /// 是否强制校验主机指纹
    #[serde(default, rename = "strictHostKey", alias = "strict_host_key")]
    pub strict_host_key: bool,
    /// 预期主机指纹（SHA256，支持 base64 或 hex）
    #[serde(default, rename = "hostFingerprint", alias = "host_fingerprint")]
    pub host_fingerprint: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl SftpConnectConfig {
    /// 校验必填字段
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() || self.username.trim().is_empty() {
            return Err(anyhow!("Missing required fields: host and username"));
        }
        if self.password.as_deref().unwrap_or("").is_empty()
            && self.private_key.as_deref().unwrap_or("").is_empty()
        {
            return Err(anyhow!("Missing required fields: password or privateKey"));
        }
        Ok(())
    }
}

/// SSH 客户端 Handler（处理服务端事件）
struct SshClientHandler {
    strict_host_key: bool,
    expected_fingerprint: Option<String>,
}

#[async_trait]
impl Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        use russh::keys::HashAlg;
        let fingerprint_str = format!("{}", server_public_key.fingerprint(HashAlg::Sha256));

        if self.strict_host_key {
            let Some(expected) = &self.expected_fingerprint else {
                tracing::error!("Strict host key checking enabled but no host fingerprint given");
                return Ok(false);
            };
            let expected_norm = expected.replace(':', "").trim().to_lowercase();
            let actual_norm = fingerprint_str.replace(':', "").to_lowercase();
            let actual_clean = actual_norm.trim_start_matches("sha256");
            let expected_clean = expected_norm.trim_start_matches("sha256");

            if actual_clean != expected_clean {
                tracing::error!(
                    "SFTP host fingerprint mismatch, expected: {}, actual: {}",
                    expected,
                    fingerprint_str
                );
                return Ok(false);
            }
        }

        tracing::debug!("SSH server fingerprint: {}", fingerprint_str);
        Ok(true)
    }
}

/// SFTP 会话（单连接，整个生命周期复用）
pub struct SftpStorage {
    host: String,
    session: Handle<SshClientHandler>,
    sftp: SftpSession,
    closed: AtomicBool,
}

impl SftpStorage {
    /// 建立 SSH/SFTP 连接
    pub async fn connect(config: &SftpConnectConfig, timeout: Duration) -> Result<Self> {
        config.validate()?;
        let addr = format!("{}:{}", config.host, config.port);
        tracing::debug!("SFTP: connecting to {}", addr);

        let handler = SshClientHandler {
            strict_host_key: config.strict_host_key,
            expected_fingerprint: config.host_fingerprint.clone(),
        };

        let mut session = tokio::time::timeout(
            timeout,
            client::connect(Arc::new(Config::default()), &addr, handler),
        )
        .await
        .map_err(|_| anyhow!("SFTP connection timed out: {}", addr))?
        .map_err(|e| anyhow!("SSH connect/handshake failed: {} - {}", addr, e))?;

        authenticate(&mut session, config).await?;
        tracing::debug!("SFTP: authenticated as {}", config.username);

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| anyhow!("Failed to open SSH channel: {}", e))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| anyhow!("Failed to request SFTP subsystem: {}", e))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| anyhow!("Failed to create SFTP session: {}", e))?;

        tracing::info!("SFTP: connected to {}", addr);

        Ok(Self {
            host: addr,
            session,
            sftp,
            closed: AtomicBool::new(false),
        })
    }

    fn entry_from_metadata(name: String, path: String, metadata: &russh_sftp::client::fs::Metadata) -> Entry {
        let modified = metadata.modified().ok().and_then(|ts| {
            ts.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .and_then(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0))
        });
        Entry {
            name,
            path,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified,
        }
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StorageError::NotConnected)
        }
    }
}

/// 执行认证
async fn authenticate(session: &mut Handle<SshClientHandler>, config: &SftpConnectConfig) -> Result<()> {
    let username = &config.username;

    if let Some(key) = config.private_key.as_deref().filter(|k| !k.is_empty()) {
        let passphrase = config.passphrase.as_deref();
        let key_pair = if key.trim_start().starts_with("-----BEGIN") {
            russh_keys::decode_secret_key(key, passphrase)
                .map_err(|e| anyhow!("Failed to decode private key: {}", e))?
        } else {
            russh_keys::load_secret_key(Path::new(key), passphrase)
                .map_err(|e| anyhow!("Failed to load private key: {} - {}", key, e))?
        };

        let accepted = session
            .authenticate_publickey(username, Arc::new(key_pair))
            .await
            .map_err(|e| anyhow!("Public key authentication failed: {}", e))?;

        if !accepted {
            return Err(anyhow!("Public key rejected by server"));
        }
    } else if let Some(password) = &config.password {
        let accepted = session
            .authenticate_password(username, password)
            .await
            .map_err(|e| anyhow!("Password authentication failed: {}", e))?;

        if !accepted {
            return Err(anyhow!("Password rejected by server"));
        }
    } else {
        return Err(anyhow!("Either password or privateKey is required"));
    }

    Ok(())
}

/// 远程错误 -> StorageError
fn map_sftp_error(path: &str, err: russh_sftp::client::error::Error) -> StorageError {
    use russh_sftp::client::error::Error as SftpError;
    use russh_sftp::protocol::StatusCode;

    match err {
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => StorageError::NotFound(path.to_string()),
            StatusCode::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
            StatusCode::NoConnection | StatusCode::ConnectionLost => {
                StorageError::ConnectionLost(status.error_message)
            }
            _ => StorageError::Remote(format!("{}: {}", path, status.error_message)),
        },
        SftpError::Timeout => StorageError::ConnectionLost(format!("timeout on {}", path)),
        SftpError::IO(msg) => StorageError::ConnectionLost(msg),
        other => StorageError::Remote(format!("{}: {}", path, other)),
    }
}

#[async_trait]
impl RemoteStorage for SftpStorage {
    fn name(&self) -> &str {
        "SFTP"
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.session.is_closed()
    }

    async fn list(&self, path: &str) -> Result<Vec<Entry>, StorageError> {
        self.check_open()?;
        tracing::debug!("SFTP: list {}", path);

        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_sftp_error(path, e))?;

        let mut result = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let entry_path = join_path(path, &name);
            result.push(Self::entry_from_metadata(name, entry_path, &entry.metadata()));
        }

        Ok(result)
    }

    async fn metadata(&self, path: &str) -> Result<Entry, StorageError> {
        self.check_open()?;
        let metadata = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| map_sftp_error(path, e))?;
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Ok(Self::entry_from_metadata(name, path.to_string(), &metadata))
    }

    async fn read_file(&self, path: &str, limit: u64) -> Result<Bytes, StorageError> {
        let entry = self.metadata(path).await?;
        if entry.size > limit {
            return Err(StorageError::TooLarge {
                path: path.to_string(),
                size: entry.size,
                limit,
            });
        }
        tracing::debug!("SFTP: read {} ({} bytes)", path, entry.size);

        let file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| map_sftp_error(path, e))?;

        let mut buf = Vec::with_capacity(entry.size as usize);
        file.take(limit)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| StorageError::ConnectionLost(format!("{}: {}", path, e)))?;

        Ok(Bytes::from(buf))
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.sftp.close().await {
            tracing::warn!("SFTP: failed to close subsystem on {}: {}", self.host, e);
        }
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| StorageError::ConnectionLost(e.to_string()))?;
        tracing::info!("SFTP: disconnected from {}", self.host);
        Ok(())
    }
}

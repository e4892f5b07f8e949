//! 应用配置模块
//!
//! 配置文件为 JSON，包含一个协议段（`ftp` 或 `sftp`，存在 `ftp` 时优先）和可选的 `log` 段：
//!
//! ```json
//! {
//!   "sftp": {
//!     "host": "example.com",
//!     "user": "deploy",
//!     "privateKeyPath": "~/.ssh/id_ed25519",
//!     "remoteRootPath": "/var/www/site",
//!     "localRootPath": "site",
//!     "include": ["wp-content/themes/**"],
//!     "exclude": ["*.log"]
//!   },
//!   "log": { "level": "debug" }
//! }
//! ```

use crate::error::SyncError;
use crate::logging::LogConfig;
use crate::models::Direction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SFTP_PORT: u16 = 22;
pub const DEFAULT_FTP_PORT: u16 = 21;

/// 协议段（字段与配置文件一致，必填项在解析时检查）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSection {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub remote_root_path: Option<String>,
    #[serde(default)]
    pub local_root_path: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// 覆盖按方向决定的默认并发数
    pub concurrency: Option<usize>,
}

/// 配置文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub ftp: Option<ProtocolSection>,
    pub sftp: Option<ProtocolSection>,
    #[serde(default)]
    pub log: LogConfig,
}

/// 协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn key(self) -> &'static str {
        match self {
            Protocol::Ftp => "ftp",
            Protocol::Sftp => "sftp",
        }
    }
}

/// SFTP 认证方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SftpAuth {
    PrivateKey(PathBuf),
    Agent,
}

/// 已解析的连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteConfig {
    Sftp {
        host: String,
        port: u16,
        user: String,
        auth: SftpAuth,
    },
    Ftp {
        host: String,
        port: u16,
        user: String,
        password: String,
    },
}

/// 单次运行使用的已解析配置
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub remote_root: String,
    pub local_root: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// 仅复制新增或大小变化的文件
    pub changes_only: bool,
    pub direction: Direction,
    pub concurrency: usize,
}

impl SyncSettings {
    pub fn new(
        remote_root: impl Into<String>,
        local_root: impl Into<PathBuf>,
        direction: Direction,
    ) -> Self {
        Self {
            remote_root: remote_root.into(),
            local_root: local_root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            changes_only: true,
            direction,
            concurrency: direction.default_concurrency(),
        }
    }

    pub fn with_patterns(mut self, include: &[&str], exclude: &[&str]) -> Self {
        self.include = include.iter().map(|s| s.to_string()).collect();
        self.exclude = exclude.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_changes_only(mut self, changes_only: bool) -> Self {
        self.changes_only = changes_only;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl AppConfig {
    /// 从配置文件加载
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let content = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, SyncError> {
        serde_json::from_str(content).map_err(|e| SyncError::Config(format!("解析配置失败: {}", e)))
    }

    /// 存在 `ftp` 段时使用 FTP，否则使用 SFTP
    pub fn protocol(&self) -> Protocol {
        if self.ftp.is_some() {
            Protocol::Ftp
        } else {
            Protocol::Sftp
        }
    }

    fn section(&self) -> Result<(Protocol, &ProtocolSection), SyncError> {
        let protocol = self.protocol();
        let section = match protocol {
            Protocol::Ftp => self.ftp.as_ref(),
            Protocol::Sftp => self.sftp.as_ref(),
        };
        section
            .map(|s| (protocol, s))
            .ok_or_else(|| SyncError::Config("配置中需要 \"ftp\" 或 \"sftp\" 段".to_string()))
    }

    /// 解析本次运行的路径与过滤配置；`cwd` 用于解析相对的本地根目录
    pub fn sync_settings(
        &self,
        direction: Direction,
        changes_only: bool,
        cwd: &Path,
    ) -> Result<SyncSettings, SyncError> {
        let (protocol, section) = self.section()?;
        let remote_root = demand(&section.remote_root_path, protocol, "remoteRootPath")?;

        let local_root = if section.local_root_path.is_empty() {
            cwd.to_path_buf()
        } else {
            cwd.join(&section.local_root_path)
        };

        Ok(SyncSettings {
            remote_root,
            local_root,
            include: section.include.clone(),
            exclude: section.exclude.clone(),
            changes_only,
            direction,
            concurrency: section
                .concurrency
                .unwrap_or_else(|| direction.default_concurrency())
                .max(1),
        })
    }

    /// 解析连接参数与凭据；`ssh_auth_sock` 为当前环境中的 SSH_AUTH_SOCK
    pub fn remote_config(&self, ssh_auth_sock: Option<&str>) -> Result<RemoteConfig, SyncError> {
        let (protocol, section) = self.section()?;
        let host = demand(&section.host, protocol, "host")?;
        let user = demand(&section.user, protocol, "user")?;

        match protocol {
            Protocol::Ftp => Ok(RemoteConfig::Ftp {
                host,
                port: section.port.unwrap_or(DEFAULT_FTP_PORT),
                user,
                password: demand(&section.password, protocol, "password")?,
            }),
            Protocol::Sftp => {
                let auth = if let Some(key) = &section.private_key_path {
                    SftpAuth::PrivateKey(expand_home(key))
                } else if ssh_auth_sock.is_some_and(|s| !s.is_empty()) {
                    SftpAuth::Agent
                } else {
                    return Err(SyncError::Config("sftp.privateKeyPath required".to_string()));
                };
                if section.password.is_some() {
                    tracing::warn!("SFTP 仅支持密钥或 ssh-agent 认证，已忽略 sftp.password");
                }
                Ok(RemoteConfig::Sftp {
                    host,
                    port: section.port.unwrap_or(DEFAULT_SFTP_PORT),
                    user,
                    auth,
                })
            }
        }
    }
}

fn demand(value: &Option<String>, protocol: Protocol, setting: &str) -> Result<String, SyncError> {
    value
        .as_ref()
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| SyncError::missing(&format!("{}.{}", protocol.key(), setting)))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

//! 错误类型

use thiserror::Error;

/// 同步过程中的错误分类
///
/// `Config` / `InvalidPattern` / `Connect` 是致命错误，会在任何队列工作开始前中止本次运行；
/// `Listing` / `Transfer` 只影响单个任务，由调度器记录后继续。
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("无效的 glob 模式 \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("连接远程存储失败: {0:#}")]
    Connect(#[source] anyhow::Error),

    #[error("列出目录失败 {directory}: {source:#}")]
    Listing {
        directory: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("传输失败 {path}: {source:#}")]
    Transfer {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    /// 是否为致命错误（需要中止整个运行）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_) | SyncError::InvalidPattern { .. } | SyncError::Connect(_)
        )
    }

    pub(crate) fn missing(setting: &str) -> Self {
        SyncError::Config(format!("config setting \"{}\" is required", setting))
    }
}

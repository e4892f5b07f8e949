pub mod local;
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

/// 目录列表中的单个条目（只包含直接子项）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// 文件元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub is_dir: bool,
}

/// 存储抽象接口，路径均为相对根目录、以 `/` 分隔
#[async_trait]
pub trait Storage: Send + Sync {
    /// 列出目录的直接子项
    async fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>>;

    /// 获取元数据，不存在时返回 None
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// 检查路径是否存在
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// 递归创建目录，目录已存在时必须成功
    async fn create_dir_all(&self, path: &str) -> Result<()>;

    /// 相对路径对应的完整路径（用于日志和描述符）
    fn absolute_path(&self, path: &str) -> String;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 远程传输会话
#[async_trait]
pub trait Transport: Storage {
    /// 远程文件 -> 本地绝对路径
    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    /// 本地绝对路径 -> 远程文件
    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// 关闭会话
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

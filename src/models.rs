//! 同步过程中流转的数据模型

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 传输方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 远程 -> 本地，远程为权威端
    Download,
    /// 本地 -> 远程，本地为权威端
    Upload,
}

impl Direction {
    /// 默认并发上限：下载可以并行，上传串行以避免远端写入竞争
    pub fn default_concurrency(self) -> usize {
        match self {
            Direction::Download => 8,
            Direction::Upload => 1,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Direction::Download => "下载",
            Direction::Upload => "上传",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Download => write!(f, "download"),
            Direction::Upload => write!(f, "upload"),
        }
    }
}

/// 调度器状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Connecting,
    Discovering,
    Copying,
    Draining,
    Done,
    Failed,
}

/// 某一端（本地或远程）对同一相对路径的 stat 结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub relative_directory: String,
    pub name: String,
    pub absolute_path: String,
    pub is_dir: bool,
    pub exists: bool,
    /// 不存在时为 None；目录通常为 None
    pub size: Option<u64>,
}

impl FileDescriptor {
    /// 该端不存在此路径
    pub fn missing(relative_directory: &str, name: &str, absolute_path: String, is_dir: bool) -> Self {
        Self {
            relative_directory: relative_directory.to_string(),
            name: name.to_string(),
            absolute_path,
            is_dir,
            exists: false,
            size: None,
        }
    }

    pub fn relative_path(&self) -> String {
        join_relative(&self.relative_directory, &self.name)
    }
}

/// 权威端条目与另一端对应描述符的配对
#[derive(Debug, Clone)]
pub struct MirroredPair {
    pub local: FileDescriptor,
    pub remote: FileDescriptor,
    pub is_dir: bool,
    pub name: String,
    pub relative_directory: String,
}

impl MirroredPair {
    pub fn relative_path(&self) -> String {
        join_relative(&self.relative_directory, &self.name)
    }
}

/// 待展开的目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTask {
    pub relative_directory: String,
}

impl DirectoryTask {
    pub fn root() -> Self {
        Self {
            relative_directory: String::new(),
        }
    }
}

/// 待传输的文件
#[derive(Debug, Clone)]
pub struct FileTask {
    /// 相对远程根目录的路径（传输层使用）
    pub remote_path: String,
    /// 本地绝对路径
    pub local_path: PathBuf,
    pub remote: FileDescriptor,
    pub local: FileDescriptor,
}

impl FileTask {
    pub fn relative_path(&self) -> String {
        self.remote.relative_path()
    }
}

/// 同步进度（仅供展示层参考）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub directories_queued: usize,
    pub files_discovered: u32,
    pub files_copied: u32,
    pub files_skipped: u32,
    pub files_failed: u32,
    pub in_flight: usize,
}

/// 拼接相对路径，统一使用 `/`，根目录为空串
pub fn join_relative(directory: &str, name: &str) -> String {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", directory, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_relative() {
        assert_eq!(join_relative("", "a"), "a");
        assert_eq!(join_relative("a/b", "c.txt"), "a/b/c.txt");
        assert_eq!(join_relative("/a/", "c.txt"), "a/c.txt");
    }

    #[test]
    fn test_direction_defaults() {
        assert_eq!(Direction::Download.default_concurrency(), 8);
        assert_eq!(Direction::Upload.default_concurrency(), 1);
        assert_eq!(Direction::Upload.to_string(), "upload");
    }
}

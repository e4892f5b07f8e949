use crate::core::filter::PathFilter;
use crate::error::SyncError;
use crate::models::{
    join_relative, Direction, DirectoryTask, FileDescriptor, FileTask, MirroredPair,
};
use crate::storage::{FileInfo, Storage, Transport};
use anyhow::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// 单个目录内并发 stat 另一端的数量
const MIRROR_STAT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Local,
    Remote,
}

/// 一个目录展开的结果
#[derive(Debug, Default)]
pub struct Discovery {
    pub directories: Vec<DirectoryTask>,
    pub files: Vec<FileTask>,
    /// 被过滤掉的目录数
    pub skipped_directories: u32,
    /// 被过滤掉的文件数
    pub skipped_files: u32,
}

/// 目录扫描器：列出权威端的一层目录，配上另一端的描述符，并按过滤规则拆分成新任务
pub struct TreeScanner {
    remote: Arc<dyn Transport>,
    local: Arc<dyn Storage>,
    filter: Arc<PathFilter>,
    direction: Direction,
}

impl TreeScanner {
    pub fn new(
        remote: Arc<dyn Transport>,
        local: Arc<dyn Storage>,
        filter: Arc<PathFilter>,
        direction: Direction,
    ) -> Self {
        Self {
            remote,
            local,
            filter,
            direction,
        }
    }

    fn authoritative(&self) -> Side {
        match self.direction {
            Direction::Download => Side::Remote,
            Direction::Upload => Side::Local,
        }
    }

    fn mirror_side(&self) -> Side {
        match self.authoritative() {
            Side::Remote => Side::Local,
            Side::Local => Side::Remote,
        }
    }

    async fn list_side(&self, side: Side, path: &str) -> Result<Vec<FileInfo>> {
        match side {
            Side::Local => self.local.list_dir(path).await,
            Side::Remote => self.remote.list_dir(path).await,
        }
    }

    fn absolute(&self, side: Side, path: &str) -> String {
        match side {
            Side::Local => self.local.absolute_path(path),
            Side::Remote => self.remote.absolute_path(path),
        }
    }

    async fn describe(&self, side: Side, directory: &str, name: &str, is_dir: bool) -> Result<FileDescriptor> {
        let path = join_relative(directory, name);
        let absolute_path = self.absolute(side, &path);
        let meta = match side {
            Side::Local => self.local.stat(&path).await?,
            Side::Remote => self.remote.stat(&path).await?,
        };

        Ok(match meta {
            Some(meta) => FileDescriptor {
                relative_directory: directory.to_string(),
                name: name.to_string(),
                absolute_path,
                is_dir: meta.is_dir,
                exists: true,
                size: (!meta.is_dir).then_some(meta.size),
            },
            None => FileDescriptor::missing(directory, name, absolute_path, is_dir),
        })
    }

    /// 把权威端条目与另一端同路径的描述符配对
    async fn mirror(&self, directory: &str, entry: FileInfo) -> Result<MirroredPair> {
        let authoritative = FileDescriptor {
            relative_directory: directory.to_string(),
            name: entry.name.clone(),
            absolute_path: self.absolute(self.authoritative(), &join_relative(directory, &entry.name)),
            is_dir: entry.is_dir,
            exists: true,
            size: (!entry.is_dir).then_some(entry.size),
        };
        let mirrored = self
            .describe(self.mirror_side(), directory, &entry.name, entry.is_dir)
            .await?;

        let (local, remote) = match self.authoritative() {
            Side::Remote => (mirrored, authoritative),
            Side::Local => (authoritative, mirrored),
        };

        Ok(MirroredPair {
            local,
            remote,
            is_dir: entry.is_dir,
            name: entry.name,
            relative_directory: directory.to_string(),
        })
    }

    async fn mirror_all(&self, directory: &str, entries: Vec<FileInfo>) -> Result<Vec<MirroredPair>> {
        stream::iter(entries)
            .map(|entry| self.mirror(directory, entry))
            .buffered(MIRROR_STAT_CONCURRENCY)
            .try_collect()
            .await
    }

    /// 展开一个目录任务
    ///
    /// 先按过滤规则筛掉条目，只对保留的条目去另一端 stat。
    pub async fn discover(&self, task: &DirectoryTask) -> Result<Discovery, SyncError> {
        let directory = task.relative_directory.as_str();
        let entries = self
            .list_side(self.authoritative(), directory)
            .await
            .map_err(|source| listing_error(directory, source))?;

        let mut discovery = Discovery::default();
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let relative_path = join_relative(directory, &entry.name);
            if self.filter.keep(&relative_path, entry.is_dir) {
                kept.push(entry);
            } else if entry.is_dir {
                debug!("跳过目录: {}", relative_path);
                discovery.skipped_directories += 1;
            } else {
                debug!("跳过文件: {}", relative_path);
                discovery.skipped_files += 1;
            }
        }

        let pairs = self
            .mirror_all(directory, kept)
            .await
            .map_err(|source| listing_error(directory, source))?;

        for pair in pairs {
            let relative_path = pair.relative_path();
            if pair.is_dir {
                debug!("加入目录队列: {}", relative_path);
                discovery.directories.push(DirectoryTask {
                    relative_directory: relative_path,
                });
            } else {
                debug!("加入文件队列: {}", relative_path);
                discovery.files.push(FileTask {
                    remote_path: relative_path,
                    local_path: PathBuf::from(&pair.local.absolute_path),
                    remote: pair.remote,
                    local: pair.local,
                });
            }
        }

        Ok(discovery)
    }
}

fn listing_error(directory: &str, source: anyhow::Error) -> SyncError {
    SyncError::Listing {
        directory: if directory.is_empty() { "/".to_string() } else { directory.to_string() },
        source,
    }
}

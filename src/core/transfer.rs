//! 单文件传输

use crate::core::comparator::FileComparator;
use crate::error::SyncError;
use crate::models::{Direction, FileTask};
use crate::storage::{Storage, Transport};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 传输结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Copied { bytes: u64 },
    Skipped,
}

/// 已确认存在的目标目录
///
/// 只做尽力而为的记忆：多个任务可能同时看到"未创建"并重复调用 `create_dir_all`，
/// 这依赖底层创建目录操作的幂等性。记录一旦写入，本次运行内不会失效。
#[derive(Debug, Default)]
pub struct DirectoryCache {
    created: RwLock<HashSet<String>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, directory: &str) -> bool {
        self.created.read().await.contains(directory)
    }

    pub async fn len(&self) -> usize {
        self.created.read().await.len()
    }

    async fn ensure<S: Storage + ?Sized>(&self, storage: &S, directory: &str) -> Result<()> {
        if self.contains(directory).await {
            return Ok(());
        }
        storage.create_dir_all(directory).await?;
        self.created.write().await.insert(directory.to_string());
        Ok(())
    }
}

/// 传输执行器：比较 -> 确保目标目录 -> 传输，不做重试
pub struct TransferExecutor {
    transport: Arc<dyn Transport>,
    local: Arc<dyn Storage>,
    direction: Direction,
    comparator: FileComparator,
    directories: DirectoryCache,
}

impl TransferExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        local: Arc<dyn Storage>,
        direction: Direction,
        changes_only: bool,
    ) -> Self {
        Self {
            transport,
            local,
            direction,
            comparator: FileComparator::new(changes_only),
            directories: DirectoryCache::new(),
        }
    }

    pub fn directories(&self) -> &DirectoryCache {
        &self.directories
    }

    pub async fn transfer(&self, task: &FileTask) -> Result<TransferOutcome, SyncError> {
        let relative_path = task.relative_path();
        if !self.comparator.should_copy(&task.local, &task.remote) {
            debug!("未变化，跳过: {}", relative_path);
            return Ok(TransferOutcome::Skipped);
        }

        debug!("{}: {}", self.direction.verb(), relative_path);
        self.copy(task)
            .await
            .map_err(|source| SyncError::Transfer {
                path: relative_path,
                source,
            })
    }

    async fn copy(&self, task: &FileTask) -> Result<TransferOutcome> {
        match self.direction {
            Direction::Download => {
                self.directories
                    .ensure(self.local.as_ref(), &task.local.relative_directory)
                    .await?;
                self.transport
                    .download_file(&task.remote_path, &task.local_path)
                    .await?;
                Ok(TransferOutcome::Copied {
                    bytes: task.remote.size.unwrap_or(0),
                })
            }
            Direction::Upload => {
                self.directories
                    .ensure(self.transport.as_ref(), &task.remote.relative_directory)
                    .await?;
                self.transport
                    .upload_file(&task.local_path, &task.remote_path)
                    .await?;
                Ok(TransferOutcome::Copied {
                    bytes: task.local.size.unwrap_or(0),
                })
            }
        }
    }
}

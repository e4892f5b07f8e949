use crate::models::FileDescriptor;

/// 比较结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDecision {
    /// 另一端不存在
    New,
    /// 未开启仅变更模式，全量复制
    Forced,
    /// 大小不同
    SizeChanged,
    /// 大小相同，视为未变化
    Unchanged,
}

impl CopyDecision {
    pub fn should_copy(self) -> bool {
        !matches!(self, CopyDecision::Unchanged)
    }
}

/// 文件比较器
///
/// 只比较存在性和大小：大小相同即认为内容相同。
/// 不计算 hash 也不比较修改时间，因此内容改变但大小不变的文件会被跳过，这是有意保留的行为。
#[derive(Debug, Clone, Copy, Default)]
pub struct FileComparator {
    changes_only: bool,
}

impl FileComparator {
    pub fn new(changes_only: bool) -> Self {
        Self { changes_only }
    }

    pub fn decide(&self, local: &FileDescriptor, remote: &FileDescriptor) -> CopyDecision {
        if !local.exists || !remote.exists {
            return CopyDecision::New;
        }
        if !self.changes_only {
            return CopyDecision::Forced;
        }
        if local.size != remote.size {
            tracing::debug!(
                "文件大小不同: {} (local={:?}, remote={:?})",
                remote.relative_path(),
                local.size,
                remote.size
            );
            CopyDecision::SizeChanged
        } else {
            CopyDecision::Unchanged
        }
    }

    pub fn should_copy(&self, local: &FileDescriptor, remote: &FileDescriptor) -> bool {
        self.decide(local, remote).should_copy()
    }
}

use crate::config::{RemoteConfig, SyncSettings};
use crate::core::filter::PathFilter;
use crate::core::scanner::{Discovery, TreeScanner};
use crate::core::transfer::{TransferExecutor, TransferOutcome};
use crate::error::SyncError;
use crate::models::{Direction, DirectoryTask, FileTask, SyncPhase, SyncProgress};
use crate::storage::{LocalStorage, RemoteStorage, Storage, Transport};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 被过滤掉的条目数
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilteredCounts {
    pub directories: u32,
    pub files: u32,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub direction: Direction,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_ms: u64,
    pub files_copied: u32,
    pub files_skipped: u32,
    pub files_failed: u32,
    pub files_discovered: u32,
    pub directories_visited: u32,
    pub directories_failed: u32,
    pub bytes_transferred: u64,
    pub entries_filtered: FilteredCounts,
    /// 同时在途的任务数峰值
    pub max_in_flight: usize,
    pub errors: Vec<String>,
}

/// 单次运行的调度状态
struct SchedulerState {
    directories: VecDeque<DirectoryTask>,
    files: VecDeque<FileTask>,
    limit: usize,
    max_in_flight: usize,
    files_copied: u32,
    files_skipped: u32,
    files_failed: u32,
    files_discovered: u32,
    directories_visited: u32,
    directories_failed: u32,
    bytes_transferred: u64,
    filtered: FilteredCounts,
    errors: Vec<String>,
}

impl SchedulerState {
    fn new(limit: usize) -> Self {
        Self {
            directories: VecDeque::from([DirectoryTask::root()]),
            files: VecDeque::new(),
            limit: limit.max(1),
            max_in_flight: 0,
            files_copied: 0,
            files_skipped: 0,
            files_failed: 0,
            files_discovered: 0,
            directories_visited: 0,
            directories_failed: 0,
            bytes_transferred: 0,
            filtered: FilteredCounts::default(),
            errors: Vec::new(),
        }
    }

    fn note_in_flight(&mut self, in_flight: usize) {
        self.max_in_flight = self.max_in_flight.max(in_flight);
    }

    fn absorb_discovery(&mut self, discovery: Discovery) {
        self.directories_visited += 1;
        self.files_discovered += discovery.files.len() as u32;
        self.filtered.directories += discovery.skipped_directories;
        self.filtered.files += discovery.skipped_files;
        self.directories.extend(discovery.directories);
        self.files.extend(discovery.files);
    }

    fn absorb_failure(&mut self, err: &SyncError) {
        warn!("{}", err);
        self.errors.push(err.to_string());
    }
}

/// 同步引擎：每次运行创建一个，先完整发现目录树，再传输文件
pub struct SyncEngine {
    settings: SyncSettings,
    filter: Arc<PathFilter>,
    phase: SyncPhase,
    progress_tx: Option<mpsc::Sender<SyncProgress>>,
}

impl SyncEngine {
    /// 编译过滤规则；无效的模式属于配置错误，在连接之前就失败
    pub fn new(settings: SyncSettings) -> Result<Self, SyncError> {
        if settings.remote_root.trim().is_empty() {
            return Err(SyncError::Config("remote root path is required".to_string()));
        }
        let filter = PathFilter::new(settings.include.as_slice(), settings.exclude.as_slice())?;
        Ok(Self {
            settings,
            filter: Arc::new(filter),
            phase: SyncPhase::Idle,
            progress_tx: None,
        })
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<SyncProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// 建立连接后运行；连接失败是致命错误
    pub async fn connect_and_run(mut self, remote: &RemoteConfig) -> Result<SyncReport, SyncError> {
        self.phase = SyncPhase::Connecting;
        info!("正在连接远程存储...");

        let transport = match RemoteStorage::connect(remote, &self.settings.remote_root).await {
            Ok(t) => t,
            Err(e) => {
                self.phase = SyncPhase::Failed;
                error!("连接远程存储失败: {:#}", e);
                return Err(SyncError::Connect(e));
            }
        };
        info!("已连接: {}", transport.name());

        self.run(Arc::new(transport)).await
    }

    /// 在已建立的会话上运行一次同步，结束时关闭会话
    pub async fn run(mut self, transport: Arc<dyn Transport>) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let start_time = chrono::Utc::now().timestamp();
        let run_id = uuid::Uuid::new_v4().to_string();
        let direction = self.settings.direction;

        info!(
            "开始同步 ({}): {} <-> {} [run={}]",
            direction,
            transport.absolute_path(""),
            self.settings.local_root.display(),
            run_id
        );

        let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(&self.settings.local_root));
        let scanner = Arc::new(TreeScanner::new(
            transport.clone(),
            local.clone(),
            self.filter.clone(),
            direction,
        ));
        let executor = Arc::new(TransferExecutor::new(
            transport.clone(),
            local,
            direction,
            self.settings.changes_only,
        ));

        let mut state = SchedulerState::new(self.settings.concurrency);

        self.phase = SyncPhase::Discovering;
        self.discover(&mut state, scanner).await;
        info!(
            "发现完成: {} 个目录, {} 个文件待处理",
            state.directories_visited,
            state.files.len()
        );

        self.phase = SyncPhase::Copying;
        self.copy(&mut state, executor.clone()).await;
        debug!("已确认 {} 个目标目录", executor.directories().len().await);

        self.phase = SyncPhase::Draining;
        self.send_progress(&state, 0);
        if let Err(e) = transport.close().await {
            warn!("关闭远程会话失败: {:#}", e);
        }

        self.phase = SyncPhase::Done;
        self.send_progress(&state, 0);
        info!(
            "Done! copied {} files, skipped {}",
            state.files_copied, state.files_skipped
        );
        if state.files_failed > 0 {
            warn!("{} 个文件{}失败", state.files_failed, direction.verb());
        }

        Ok(SyncReport {
            run_id,
            direction,
            start_time,
            end_time: chrono::Utc::now().timestamp(),
            duration_ms: started.elapsed().as_millis() as u64,
            files_copied: state.files_copied,
            files_skipped: state.files_skipped,
            files_failed: state.files_failed,
            files_discovered: state.files_discovered,
            directories_visited: state.directories_visited,
            directories_failed: state.directories_failed,
            bytes_transferred: state.bytes_transferred,
            entries_filtered: state.filtered,
            max_in_flight: state.max_in_flight,
            errors: state.errors,
        })
    }

    /// 发现阶段：只处理目录任务，直到队列为空且没有在途任务
    async fn discover(&self, state: &mut SchedulerState, scanner: Arc<TreeScanner>) {
        let mut in_flight = JoinSet::new();

        loop {
            while in_flight.len() < state.limit {
                let Some(task) = state.directories.pop_front() else {
                    break;
                };
                let scanner = scanner.clone();
                in_flight.spawn(async move {
                    let result = scanner.discover(&task).await;
                    (task, result)
                });
                state.note_in_flight(in_flight.len());
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            match joined {
                Ok((task, Ok(discovery))) => {
                    debug!(
                        "展开目录 /{}: {} 个子目录, {} 个文件",
                        task.relative_directory,
                        discovery.directories.len(),
                        discovery.files.len()
                    );
                    state.absorb_discovery(discovery);
                }
                Ok((_, Err(e))) => {
                    state.directories_failed += 1;
                    state.absorb_failure(&e);
                }
                Err(e) => {
                    state.directories_failed += 1;
                    warn!("目录任务异常退出: {}", e);
                    state.errors.push(e.to_string());
                }
            }
            self.send_progress(state, in_flight.len());
        }
    }

    /// 传输阶段：目录已全部展开，按并发上限处理文件任务
    async fn copy(&self, state: &mut SchedulerState, executor: Arc<TransferExecutor>) {
        let mut in_flight = JoinSet::new();

        loop {
            while in_flight.len() < state.limit {
                let Some(task) = state.files.pop_front() else {
                    break;
                };
                let executor = executor.clone();
                in_flight.spawn(async move { executor.transfer(&task).await });
                state.note_in_flight(in_flight.len());
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            match joined {
                Ok(Ok(TransferOutcome::Copied { bytes })) => {
                    state.files_copied += 1;
                    state.bytes_transferred += bytes;
                }
                Ok(Ok(TransferOutcome::Skipped)) => state.files_skipped += 1,
                Ok(Err(e)) => {
                    state.files_failed += 1;
                    state.absorb_failure(&e);
                }
                Err(e) => {
                    state.files_failed += 1;
                    warn!("传输任务异常退出: {}", e);
                    state.errors.push(e.to_string());
                }
            }
            self.send_progress(state, in_flight.len());
        }
    }

    /// 发送进度更新；通道已满或已关闭时直接丢弃，不阻塞调度
    fn send_progress(&self, state: &SchedulerState, in_flight: usize) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.try_send(SyncProgress {
                phase: self.phase,
                directories_queued: state.directories.len(),
                files_discovered: state.files_discovered,
                files_copied: state.files_copied,
                files_skipped: state.files_skipped,
                files_failed: state.files_failed,
                in_flight,
            });
        }
    }
}

use anyhow::Context;
use clap::{Parser, Subcommand};
use ftpsync_lib::logging::{LogConfig, SizeRotatingWriter};
use ftpsync_lib::{AppConfig, Direction, SyncEngine, SyncProgress};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ftpsync", version, about = "Sync a remote directory tree over SFTP / FTP")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/default.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 从远程下载到本地
    Get {
        /// 复制所有文件，不比较大小
        #[arg(long)]
        all: bool,
    },
    /// 从本地上传到远程
    Put {
        /// 复制所有文件，不比较大小
        #[arg(long)]
        all: bool,
    },
}

impl Command {
    fn direction(&self) -> Direction {
        match self {
            Command::Get { .. } => Direction::Download,
            Command::Put { .. } => Direction::Upload,
        }
    }

    fn all(&self) -> bool {
        match self {
            Command::Get { all } | Command::Put { all } => *all,
        }
    }
}

/// 初始化日志系统
///
/// 控制台始终输出；启用文件日志时再叠加一层非阻塞的文件输出。返回的 guard 需要保持到进程结束。
fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let level = config.tracing_level().to_string().to_lowercase();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},opendal=warn", level)));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let (file_layer, guard) = if config.enabled {
        match SizeRotatingWriter::new(&config.log_dir(), config.max_size_mb) {
            Ok(writer) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(writer);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("无法创建日志文件，仅输出到控制台: {}", e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}

/// 消费进度更新，只在阶段变化时输出 info，其余为 debug
async fn log_progress(mut rx: mpsc::Receiver<SyncProgress>) {
    let mut last_phase = None;
    while let Some(progress) = rx.recv().await {
        if last_phase != Some(progress.phase) {
            tracing::info!("阶段: {:?}", progress.phase);
            last_phase = Some(progress.phase);
        }
        tracing::debug!(
            "进度: 待展开目录 {}, 已发现文件 {}, 已复制 {}, 已跳过 {}, 失败 {}, 在途 {}",
            progress.directories_queued,
            progress.files_discovered,
            progress.files_copied,
            progress.files_skipped,
            progress.files_failed,
            progress.in_flight
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;
    let _guard = init_logging(&config.log);
    tracing::debug!("已加载配置: {}", cli.config.display());

    let cwd = std::env::current_dir().context("无法获取当前目录")?;
    let direction = cli.command.direction();
    let settings = config.sync_settings(direction, !cli.command.all(), &cwd)?;
    let ssh_auth_sock = std::env::var("SSH_AUTH_SOCK").ok();
    let remote = config.remote_config(ssh_auth_sock.as_deref())?;

    let (tx, rx) = mpsc::channel(256);
    let progress = tokio::spawn(log_progress(rx));

    let result = SyncEngine::new(settings)?
        .with_progress(tx)
        .connect_and_run(&remote)
        .await;
    let _ = progress.await;

    let report = result?;
    tracing::debug!("同步报告: {}", serde_json::to_string(&report)?);
    if report.files_failed > 0 || report.directories_failed > 0 {
        tracing::warn!(
            "{} 个文件、{} 个目录处理失败",
            report.files_failed,
            report.directories_failed
        );
    }
    Ok(())
}

use super::{FileInfo, FileMeta, Storage, Transport};
use crate::config::{RemoteConfig, SftpAuth};
use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::{Metakey, Operator};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 基于 opendal 的远程存储（SFTP / FTP），以远程根目录为 root
pub struct RemoteStorage {
    operator: Operator,
    root: String,
    name: String,
}

impl RemoteStorage {
    /// 建立连接并探测远程根目录是否可访问
    pub async fn connect(config: &RemoteConfig, remote_root: &str) -> Result<Self> {
        let root = normalize_root(remote_root);

        let (operator, name) = match config {
            RemoteConfig::Sftp {
                host,
                port,
                user,
                auth,
            } => {
                use opendal::services::Sftp;

                let mut builder = Sftp::default()
                    .endpoint(&format!("ssh://{}:{}", host, port))
                    .user(user)
                    .root(&root);
                if let SftpAuth::PrivateKey(key) = auth {
                    builder = builder.key(&key.to_string_lossy());
                }
                tracing::info!("初始化 SFTP 存储: {}@{}:{} root={}", user, host, port, root);
                (
                    Operator::new(builder)?.finish(),
                    format!("sftp://{}@{}:{}{}", user, host, port, root),
                )
            }
            RemoteConfig::Ftp {
                host,
                port,
                user,
                password,
            } => {
                use opendal::services::Ftp;

                let builder = Ftp::default()
                    .endpoint(&format!("ftp://{}:{}", host, port))
                    .user(user)
                    .password(password)
                    .root(&root);
                tracing::info!("初始化 FTP 存储: {}@{}:{} root={}", user, host, port, root);
                (
                    Operator::new(builder)?.finish(),
                    format!("ftp://{}@{}:{}{}", user, host, port, root),
                )
            }
        };

        operator
            .check()
            .await
            .with_context(|| format!("无法访问远程根目录 {}", name))?;

        Ok(Self {
            operator,
            root,
            name,
        })
    }

    /// opendal 的目录路径必须以 `/` 结尾
    fn dir_path(path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", path)
        }
    }

    fn file_path(path: &str) -> String {
        path.replace('\\', "/").trim_start_matches('/').to_string()
    }
}

fn normalize_root(root: &str) -> String {
    let root = root.replace('\\', "/");
    let trimmed = root.trim_end_matches('/');
    if trimmed.starts_with('/') {
        format!("{}/", trimmed)
    } else {
        format!("/{}/", trimmed).replace("//", "/")
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        let dir = Self::dir_path(path);
        let entries = self
            .operator
            .list_with(&dir)
            .metakey(Metakey::ContentLength | Metakey::Mode)
            .await?;

        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            // 部分服务会把目录自身也列出来
            if entry.path() == dir || entry.path().trim_start_matches('/') == dir.trim_start_matches('/') {
                continue;
            }
            let name = entry.name().trim_end_matches('/').to_string();
            if name.is_empty() || name == "." || name == ".." {
                continue;
            }
            let meta = entry.metadata();
            files.push(FileInfo {
                name,
                size: if meta.is_dir() { 0 } else { meta.content_length() },
                is_dir: meta.is_dir(),
            });
        }

        Ok(files)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match self.operator.stat(&Self::file_path(path)).await {
            Ok(meta) => Ok(Some(FileMeta {
                size: if meta.is_dir() { 0 } else { meta.content_length() },
                is_dir: meta.is_dir(),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        let dir = Self::dir_path(path);
        if dir == "/" {
            return Ok(());
        }
        // opendal 的 create_dir 会创建缺失的父目录，已存在时返回 Ok
        self.operator.create_dir(&dir).await?;
        Ok(())
    }

    fn absolute_path(&self, path: &str) -> String {
        format!("{}{}", self.root, Self::file_path(path))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Transport for RemoteStorage {
    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let data = self.operator.read(&Self::file_path(remote_path)).await?;

        // 先写临时文件再重命名，避免中断时留下半个文件
        let mut temp_path = local_path.as_os_str().to_owned();
        temp_path.push(".ftpsync-part");
        let temp_path = PathBuf::from(temp_path);
        let written = match fs::write(&temp_path, data.to_vec()).await {
            Ok(()) => fs::rename(&temp_path, local_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e).with_context(|| format!("写入本地文件失败: {}", local_path.display()));
        }
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let data = fs::read(local_path)
            .await
            .with_context(|| format!("读取本地文件失败: {}", local_path.display()))?;
        self.operator.write(&Self::file_path(remote_path), data).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!("关闭远程会话: {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_remote() -> RemoteStorage {
        let operator = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        RemoteStorage {
            operator,
            root: "/".to_string(),
            name: "memory".to_string(),
        }
    }

    #[tokio::test]
    async fn test_download_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let remote = memory_remote();
        remote.operator.write("x.txt", b"fresh".to_vec()).await.unwrap();
        std::fs::write(dir.path().join("x.txt"), b"stale data").unwrap();

        remote
            .download_file("x.txt", &dir.path().join("x.txt"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(dir.path().join("x.txt")).unwrap(), b"fresh");
        assert!(!dir.path().join("x.txt.ftpsync-part").exists());
    }

    #[tokio::test]
    async fn test_failed_download_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let remote = memory_remote();
        remote.operator.write("x.txt", b"fresh".to_vec()).await.unwrap();
        // 目标位置是非空目录，rename 会失败
        std::fs::create_dir_all(dir.path().join("x.txt/inner")).unwrap();

        let err = remote
            .download_file("x.txt", &dir.path().join("x.txt"))
            .await;
        assert!(err.is_err());
        assert!(!dir.path().join("x.txt.ftpsync-part").exists());
        assert!(dir.path().join("x.txt").is_dir());
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_root("/var/www"), "/var/www/");
        assert_eq!(normalize_root("/var/www/"), "/var/www/");
        assert_eq!(normalize_root("site"), "/site/");
        assert_eq!(normalize_root("/"), "/");
        assert_eq!(normalize_root(""), "/");
    }

    #[test]
    fn test_opendal_paths() {
        assert_eq!(RemoteStorage::dir_path(""), "/");
        assert_eq!(RemoteStorage::dir_path("a/b"), "a/b/");
        assert_eq!(RemoteStorage::dir_path("/a/b/"), "a/b/");
        assert_eq!(RemoteStorage::file_path("/a\\b.txt"), "a/b.txt");
    }
}

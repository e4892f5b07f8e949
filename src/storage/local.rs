use super::{FileInfo, FileMeta, Storage};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    /// 本地根目录不要求事先存在，首次写入时会按需创建
    pub fn new(path: impl AsRef<Path>) -> Self {
        let base_path = path.as_ref().to_path_buf();
        let name = format!("local:{}", base_path.display());
        Self { base_path, name }
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        let dir = self.resolve_path(path);
        let mut reader = fs::read_dir(&dir).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("跳过非 UTF-8 文件名: {:?}", entry.path());
                continue;
            };
            // 跟随符号链接，与远端 list 的语义保持一致；悬空链接只影响它自己
            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("跳过悬空的符号链接: {}", entry.path().display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            entries.push(FileInfo {
                name,
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                is_dir: metadata.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match fs::metadata(self.resolve_path(path)).await {
            Ok(metadata) => Ok(Some(FileMeta {
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                is_dir: metadata.is_dir(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        // create_dir_all 对已存在的目录返回 Ok
        fs::create_dir_all(self.resolve_path(path)).await?;
        Ok(())
    }

    fn absolute_path(&self, path: &str) -> String {
        self.resolve_path(path).display().to_string()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_and_stat() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/x.txt"), b"0123456789").unwrap();

        let storage = LocalStorage::new(dir.path());
        let mut entries = storage.list_dir("a").await.unwrap();
        entries.sort_by(|l, r| l.name.cmp(&r.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "b");
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].name, "x.txt");
        assert_eq!(entries[1].size, 10);

        let meta = storage.stat("a/x.txt").await.unwrap().unwrap();
        assert_eq!(meta, FileMeta { size: 10, is_dir: false });
        assert!(storage.stat("a/missing.txt").await.unwrap().is_none());
        assert!(!storage.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_dir_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.create_dir_all("p/q/r").await.unwrap();
        storage.create_dir_all("p/q/r").await.unwrap();
        assert!(dir.path().join("p/q/r").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_skips_dangling_symlink() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), b"abc").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        let storage = LocalStorage::new(dir.path());
        let entries = storage.list_dir("").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "real.txt");
        assert!(storage.stat("dangling").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(storage.list_dir("does/not/exist").await.is_err());
    }
}

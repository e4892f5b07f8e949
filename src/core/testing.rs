//! 测试用的内存远程存储

use crate::storage::{FileInfo, FileMeta, Storage, Transport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ListDone(String),
    TransferStart(String),
    CreateDir(String),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub seq: u64,
    pub kind: EventKind,
}

pub struct MemoryRemote {
    nodes: Mutex<BTreeMap<String, Node>>,
    events: Mutex<Vec<Event>>,
    seq: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    listing: AtomicUsize,
    max_listing: AtomicUsize,
    fail_list: HashSet<String>,
    fail_transfer: HashSet<String>,
    delay: Duration,
    pub closed: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            events: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            listing: AtomicUsize::new(0),
            max_listing: AtomicUsize::new(0),
            fail_list: HashSet::new(),
            fail_transfer: HashSet::new(),
            delay: Duration::from_millis(2),
            closed: AtomicUsize::new(0),
        }
    }

    /// 添加文件，自动补齐父目录
    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.insert_parents(path);
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_string(), Node::File(data.to_vec()));
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.insert_parents(path);
        self.nodes.lock().unwrap().insert(path.to_string(), Node::Dir);
        self
    }

    pub fn failing_list(mut self, path: &str) -> Self {
        self.fail_list.insert(path.to_string());
        self
    }

    pub fn failing_transfer(mut self, path: &str) -> Self {
        self.fail_transfer.insert(path.to_string());
        self
    }

    fn insert_parents(&self, path: &str) {
        let mut nodes = self.nodes.lock().unwrap();
        let mut current = String::new();
        let segments: Vec<&str> = path.split('/').collect();
        for seg in &segments[..segments.len().saturating_sub(1)] {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(seg);
            nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// 同时进行的传输数峰值
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 同时进行的目录列出数峰值
    pub fn max_concurrent_listings(&self) -> usize {
        self.max_listing.load(Ordering::SeqCst)
    }

    fn record(&self, kind: EventKind) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event { seq, kind });
    }

    fn enter(counter: &AtomicUsize, peak: &AtomicUsize) {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::SeqCst);
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }
}

#[async_trait]
impl Storage for MemoryRemote {
    async fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        let path = Self::normalize(path);
        Self::enter(&self.listing, &self.max_listing);
        tokio::time::sleep(self.delay).await;
        Self::leave(&self.listing);
        if self.fail_list.contains(&path) {
            return Err(anyhow!("permission denied: {}", path));
        }

        let entries = {
            let nodes = self.nodes.lock().unwrap();
            if !path.is_empty() && !matches!(nodes.get(&path), Some(Node::Dir)) {
                return Err(anyhow!("no such directory: {}", path));
            }
            let prefix = if path.is_empty() { String::new() } else { format!("{}/", path) };
            nodes
                .iter()
                .filter_map(|(key, node)| {
                    let rest = key.strip_prefix(&prefix)?;
                    if rest.is_empty() || rest.contains('/') {
                        return None;
                    }
                    Some(match node {
                        Node::Dir => FileInfo { name: rest.to_string(), size: 0, is_dir: true },
                        Node::File(data) => FileInfo {
                            name: rest.to_string(),
                            size: data.len() as u64,
                            is_dir: false,
                        },
                    })
                })
                .collect()
        };

        self.record(EventKind::ListDone(path));
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        let path = Self::normalize(path);
        Ok(self.nodes.lock().unwrap().get(&path).map(|node| match node {
            Node::Dir => FileMeta { size: 0, is_dir: true },
            Node::File(data) => FileMeta { size: data.len() as u64, is_dir: false },
        }))
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        let path = Self::normalize(path);
        self.record(EventKind::CreateDir(path.clone()));
        if path.is_empty() {
            return Ok(());
        }
        self.insert_parents(&path);
        self.nodes.lock().unwrap().entry(path).or_insert(Node::Dir);
        Ok(())
    }

    fn absolute_path(&self, path: &str) -> String {
        format!("mem:/{}", Self::normalize(path))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl Transport for MemoryRemote {
    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let path = Self::normalize(remote_path);
        self.record(EventKind::TransferStart(path.clone()));
        Self::enter(&self.in_flight, &self.max_in_flight);
        tokio::time::sleep(self.delay).await;
        let result = if self.fail_transfer.contains(&path) {
            Err(anyhow!("connection reset while reading {}", path))
        } else {
            match self.file(&path) {
                Some(data) => tokio::fs::write(local_path, data).await.map_err(Into::into),
                None => Err(anyhow!("no such file: {}", path)),
            }
        };
        Self::leave(&self.in_flight);
        result
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let path = Self::normalize(remote_path);
        self.record(EventKind::TransferStart(path.clone()));
        Self::enter(&self.in_flight, &self.max_in_flight);
        tokio::time::sleep(self.delay).await;
        let result = if self.fail_transfer.contains(&path) {
            Err(anyhow!("write refused for {}", path))
        } else {
            match tokio::fs::read(local_path).await {
                Ok(data) => {
                    self.nodes.lock().unwrap().insert(path, Node::File(data));
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        };
        Self::leave(&self.in_flight);
        result
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 在本地临时目录中写入文件
pub fn write_local(root: &Path, path: &str, data: &[u8]) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, data).unwrap();
}

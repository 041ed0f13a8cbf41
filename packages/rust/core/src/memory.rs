//! Conversation memory injected into every stage instruction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use docent_shared::{DocentError, Result};

/// An append-only text file guarded by an async lock.
///
/// Shared via `Arc` between the recorder that appends to it and the memory
/// store that reads and clears it, so appends and truncation never interleave.
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full contents; a missing file reads as empty.
    pub async fn read(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(DocentError::io(&self.path, e)),
        }
    }

    /// Append `text`, creating the file and its parent directory if needed.
    pub async fn append(&self, text: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DocentError::io(parent, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| DocentError::io(&self.path, e))?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| DocentError::io(&self.path, e))?;
        file.flush().await.map_err(|e| DocentError::io(&self.path, e))
    }

    /// Truncate to empty. A missing file stays missing.
    pub async fn truncate(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => tokio::fs::write(&self.path, b"")
                .await
                .map_err(|e| DocentError::io(&self.path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocentError::io(&self.path, e)),
        }
    }
}

/// Accumulated conversation history as a single text blob.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Current history, possibly empty.
    async fn load(&self) -> Result<String>;

    /// Forget everything. Subsequent loads return empty text.
    async fn clear(&self) -> Result<()>;
}

/// Memory backed by a [`LogFile`], normally the recorder's progress log.
#[derive(Debug, Clone)]
pub struct FileMemoryStore {
    file: Arc<LogFile>,
}

impl FileMemoryStore {
    pub fn new(file: Arc<LogFile>) -> Self {
        Self { file }
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn load(&self) -> Result<String> {
        self.file.read().await
    }

    async fn clear(&self) -> Result<()> {
        self.file.truncate().await
    }
}

/// Process-local memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry to the history.
    pub async fn push(&self, entry: impl Into<String>) {
        self.entries.lock().await.push(entry.into());
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self) -> Result<String> {
        Ok(self.entries.lock().await.join("\n"))
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("docent_core_{}", uuid::Uuid::now_v7()))
        .join(name)
}

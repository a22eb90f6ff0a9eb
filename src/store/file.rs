//! File-backed stores: a JSON Lines ledger and a JSON array queue.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use super::traits::{LedgerStore, QueueStore};
use crate::error::StorageError;
use crate::outreach::model::{QueueEntry, SendRecord};

/// Ledger stored as one JSON object per line. A missing file is an empty ledger.
pub struct JsonlLedgerStore {
    path: PathBuf,
}

impl JsonlLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for JsonlLedgerStore {
    async fn load(&self) -> Result<Vec<SendRecord>, StorageError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No ledger yet, starting empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: SendRecord =
                serde_json::from_str(line).map_err(|e| StorageError::Corrupt {
                    path: self.path.clone(),
                    line: idx + 1,
                    reason: e.to_string(),
                })?;
            records.push(record);
        }

        debug!(path = %self.path.display(), records = records.len(), "Loaded ledger");
        Ok(records)
    }

    async fn append(&self, record: &SendRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        line.push('\n');

        let write_err = |source: std::io::Error| StorageError::Write {
            path: self.path.clone(),
            source,
        };

        ensure_parent(&self.path).await.map_err(write_err)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(write_err)?;

        // A hand-edited ledger may lack the final newline.
        let len = file.metadata().await.map_err(write_err)?.len();
        if len > 0 {
            file.seek(SeekFrom::End(-1)).await.map_err(write_err)?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await.map_err(write_err)?;
            if last[0] != b'\n' {
                line.insert(0, '\n');
            }
        }

        file.write_all(line.as_bytes()).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        Ok(())
    }
}

/// Queue stored as a pretty-printed JSON array, replaced atomically on save.
pub struct JsonQueueStore {
    path: PathBuf,
}

impl JsonQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl QueueStore for JsonQueueStore {
    async fn load(&self) -> Result<Vec<QueueEntry>, StorageError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            line: e.line(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, entries: &[QueueEntry]) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        // Write to a temp file then rename over the original.
        let tmp_path = self.tmp_path();
        let write_err = |source: std::io::Error| StorageError::Write {
            path: self.path.clone(),
            source,
        };

        ensure_parent(&self.path).await.map_err(write_err)?;
        {
            let mut file = fs::File::create(&tmp_path).await.map_err(write_err)?;
            file.write_all(json.as_bytes()).await.map_err(write_err)?;
            file.write_all(b"\n").await.map_err(write_err)?;
            file.sync_all().await.map_err(write_err)?;
        }
        fs::rename(&tmp_path, &self.path).await.map_err(write_err)?;

        debug!(path = %self.path.display(), remaining = entries.len(), "Saved queue");
        Ok(())
    }
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

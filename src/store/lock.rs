//! Exclusive run lock around the queue/ledger read-modify-write.
//!
//! The lock is an OS advisory lock on a persistent file, so it dies with the
//! process that holds it. The file records the PID of the last holder and is
//! left in place between runs.

use std::fs::{File, TryLockError};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::error::StorageError;

/// Guard for an acquired run lock. Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    _file: File,
}

impl RunLock {
    /// Acquire the lock or fail with [`StorageError::Locked`].
    pub async fn acquire(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let write_err = |source: std::io::Error| StorageError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .await
            .map_err(write_err)?
            .into_std()
            .await;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(StorageError::Locked { path: path.clone() });
            }
            Err(TryLockError::Error(source)) => return Err(write_err(source)),
        }

        // Informational only; a failed write still leaves us holding the lock.
        if let Err(e) = stamp_pid(&mut file) {
            debug!(path = %path.display(), error = %e, "Could not record PID in run lock");
        }

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn stamp_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    writeln!(file, "{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let lock = RunLock::acquire(&path).await.unwrap();
        assert!(path.exists());
        assert!(matches!(
            RunLock::acquire(&path).await,
            Err(StorageError::Locked { .. })
        ));

        drop(lock);
        let _again = RunLock::acquire(&path).await.unwrap();
    }

    #[tokio::test]
    async fn file_left_by_a_dead_holder_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        // What a crashed run leaves behind: the file, but no lock on it.
        std::fs::write(&path, "4194304\n").unwrap();

        let lock = RunLock::acquire(&path).await.unwrap();
        let pid = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }

    #[tokio::test]
    async fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("run.lock");

        let _lock = RunLock::acquire(&path).await.unwrap();
        assert!(path.exists());
    }
}

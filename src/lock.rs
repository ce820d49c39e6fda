//! Cross-process advisory file lock, mirroring
//! `original_source/app/core/filelock.py`'s non-blocking-acquire-plus-poll
//! discipline and reusing the teacher's `fs2`-based
//! `ohlc.rs::acquire_lock` open/lock pattern.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct FileLockTimeout;

impl std::fmt::Display for FileLockTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timed out acquiring file lock")
    }
}
impl std::error::Error for FileLockTimeout {}

/// An exclusively-locked file; the lock is released and the descriptor
/// closed when this value is dropped (spec invariant I1: the lock-file
/// descriptor is always closed).
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Non-blocking acquisition with polling, bounded by `timeout`. The
    /// file is opened once on the calling task (never a worker thread) so
    /// cancellation of the waiter never leaks the descriptor; only the
    /// individual `try_lock_exclusive` polls are cheap enough to run
    /// inline without blocking the runtime.
    pub async fn acquire_with_timeout(
        path: &Path,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, FileLockTimeout> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| FileLockTimeout)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(FileLock { file }),
                Err(_) => {
                    if Instant::now() >= deadline {
                        return Err(FileLockTimeout);
                    }
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquires_uncontended_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".generation.lock");
        let lock = FileLock::acquire_with_timeout(&path, Duration::from_millis(500), Duration::from_millis(10))
            .await
            .unwrap();
        drop(lock);
    }

    #[tokio::test]
    async fn second_acquire_times_out_while_first_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".generation.lock");
        let _first = FileLock::acquire_with_timeout(&path, Duration::from_millis(500), Duration::from_millis(10))
            .await
            .unwrap();
        let second = FileLock::acquire_with_timeout(&path, Duration::from_millis(100), Duration::from_millis(10)).await;
        assert!(second.is_err());
    }
}

//! Exclusive store lock shared by every process working on one roadmap.
//!
//! The lock is a file created with `create_new`, so the filesystem decides
//! the winner when several processes race. The file carries JSON metadata
//! about its holder; a lock older than `stale_after` is assumed to belong to
//! a crashed process and is broken.

use crate::error::{Result, RoadmapError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
}

/// Retry budget for [`StoreLock::acquire`].
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    pub timeout: Duration,
    pub stale_after: Duration,
    pub retry_initial: Duration,
    pub retry_max: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(120),
            retry_initial: Duration::from_millis(5),
            retry_max: Duration::from_millis(200),
        }
    }
}

/// Exponential backoff between lock attempts, doubling up to a cap.
#[derive(Debug, Clone)]
struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            max,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    meta: LockMeta,
    released: bool,
}

impl StoreLock {
    /// Block until the lock is ours or `opts.timeout` elapses.
    pub fn acquire(path: &Path, holder: Option<&str>, opts: LockOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let started = Instant::now();
        let mut backoff = Backoff::new(opts.retry_initial, opts.retry_max);

        loop {
            match Self::try_acquire(path, holder)? {
                Some(lock) => {
                    tracing::debug!(path = %path.display(), "store lock acquired");
                    return Ok(lock);
                }
                None => {
                    if break_if_stale(path, opts.stale_after)? {
                        continue;
                    }
                    let waited = started.elapsed();
                    if waited >= opts.timeout {
                        return Err(RoadmapError::LockTimeout {
                            path: path.to_path_buf(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    let delay = backoff.next_delay().min(opts.timeout - waited);
                    tracing::debug!(?delay, "store lock busy, retrying");
                    std::thread::sleep(delay);
                }
            }
        }
    }

    /// One attempt. `Ok(None)` means somebody else holds the lock.
    pub fn try_acquire(path: &Path, holder: Option<&str>) -> Result<Option<Self>> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let meta = LockMeta {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            holder: holder.map(str::to_string),
        };
        let bytes = serde_json::to_vec(&meta)?;
        if let Err(err) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(path);
            return Err(err.into());
        }

        Ok(Some(Self {
            path: path.to_path_buf(),
            meta,
            released: false,
        }))
    }

    pub fn meta(&self) -> &LockMeta {
        &self.meta
    }

    pub fn release(mut self) -> Result<()> {
        if !self.released {
            fs::remove_file(&self.path)?;
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Read the current holder's metadata, if the lock is held.
pub fn read_lock_meta(path: &Path) -> Result<Option<LockMeta>> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Remove the lock file if it is older than `stale_after`. Returns true if a
/// stale lock was removed (or vanished while we looked).
fn break_if_stale(path: &Path, stale_after: Duration) -> Result<bool> {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err.into()),
    };
    let age = modified.elapsed().unwrap_or_default();
    if age <= stale_after {
        return Ok(false);
    }

    let meta = read_lock_meta(path)?;
    tracing::warn!(
        path = %path.display(),
        age_secs = age.as_secs(),
        holder_pid = ?meta.as_ref().map(|m| m.pid),
        "breaking stale store lock"
    );
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

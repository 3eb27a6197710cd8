//! Durable 64-bit nonce counter.
//!
//! The counter is stored as a single 8-byte big-endian record. Each call to
//! [`NonceCounter::take_next`] returns the stored value and persists its
//! successor before returning, so a value handed out once is never handed
//! out again, even after a crash or power loss.
//!
//! # Persistence protocol
//!
//! 1. Write the successor to `<path>.tmp`
//! 2. `fsync` the temporary file
//! 3. Rename it over `<path>` (atomic on POSIX filesystems)
//! 4. `fsync` the parent directory so the rename itself is durable
//!
//! A crash at any step leaves either the old or the new value on disk.
//! A stale `<path>.tmp` from an interrupted cycle is simply overwritten.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Size of the on-disk counter record.
const COUNTER_RECORD_SIZE: usize = 8;

/// Counter error types.
#[derive(Debug, Error)]
pub enum CounterError {
    /// Persisting the successor failed. The value must not be used.
    #[error("Counter I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Entropy source unavailable: {0}")]
    Entropy(String),
}

/// Result type for counter operations.
pub type CounterResult<T> = Result<T, CounterError>;

/// Source of never-repeating 64-bit values for nonce construction.
pub trait NonceCounter: Send + Sync {
    /// Return a value that no previous call on this counter returned.
    fn take_next(&self) -> CounterResult<u64>;
}

impl<C: NonceCounter + ?Sized> NonceCounter for Arc<C> {
    fn take_next(&self) -> CounterResult<u64> {
        (**self).take_next()
    }
}

/// File-backed counter that survives process restarts.
///
/// Callers within one process are serialised by an internal lock. There is
/// no cross-process locking: two processes must never point at the same file.
#[derive(Debug)]
pub struct PersistentCounter {
    path: PathBuf,
    tmp_path: PathBuf,
    lock: Mutex<()>,
}

impl PersistentCounter {
    /// Create a counter backed by `path`. Nothing is read or written until
    /// the first [`take_next`](NonceCounter::take_next).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp: OsString = path.as_os_str().to_owned();
        tmp.push(".tmp");

        Self {
            path,
            tmp_path: PathBuf::from(tmp),
            lock: Mutex::new(()),
        }
    }

    /// Path of the live counter record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value the next call would return, if a valid record exists.
    pub fn peek(&self) -> Option<u64> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_stored()
    }

    fn read_stored(&self) -> Option<u64> {
        match fs::read(&self.path) {
            Ok(bytes) => match <[u8; COUNTER_RECORD_SIZE]>::try_from(bytes.as_slice()) {
                Ok(record) => Some(u64::from_be_bytes(record)),
                Err(_) => {
                    warn!(
                        path = %self.path.display(),
                        len = bytes.len(),
                        "Counter record has wrong length, reseeding"
                    );
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Counter record unreadable, reseeding"
                );
                None
            }
        }
    }

    fn persist(&self, value: u64) -> CounterResult<()> {
        let io_err = |path: &Path, source: io::Error| CounterError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = self.parent_dir() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let mut file = File::create(&self.tmp_path).map_err(|e| io_err(&self.tmp_path, e))?;
        file.write_all(&value.to_be_bytes())
            .map_err(|e| io_err(&self.tmp_path, e))?;
        file.sync_all().map_err(|e| io_err(&self.tmp_path, e))?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path).map_err(|e| io_err(&self.path, e))?;

        if let Some(parent) = self.parent_dir() {
            fsync_dir(parent).map_err(|e| io_err(parent, e))?;
        }

        Ok(())
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }
}

impl NonceCounter for PersistentCounter {
    fn take_next(&self) -> CounterResult<u64> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = match self.read_stored() {
            Some(value) => value,
            None => {
                let seed = random_seed()?;
                info!(path = %self.path.display(), "Seeding nonce counter");
                seed
            }
        };

        self.persist(current.wrapping_add(1))?;
        debug!(path = %self.path.display(), "Nonce counter advanced");

        Ok(current)
    }
}

/// In-memory counter for tests and ephemeral senders.
#[derive(Debug)]
pub struct MemoryCounter {
    next: AtomicU64,
}

impl MemoryCounter {
    /// Counter whose first value is `start`.
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Counter starting from a random value.
    pub fn seeded() -> CounterResult<Self> {
        Ok(Self::new(random_seed()?))
    }
}

impl NonceCounter for MemoryCounter {
    fn take_next(&self) -> CounterResult<u64> {
        // fetch_add wraps on overflow
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

fn random_seed() -> CounterResult<u64> {
    let mut buf = [0u8; COUNTER_RECORD_SIZE];
    getrandom::getrandom(&mut buf).map_err(|e| CounterError::Entropy(e.to_string()))?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

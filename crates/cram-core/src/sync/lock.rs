//! Named advisory locks that fail fast instead of waiting

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use fs2::FileExt;
use tokio::sync::OwnedMutexGuard;

use crate::error::Result;

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    held: Held,
}

#[derive(Debug)]
enum Held {
    Local(OwnedMutexGuard<()>),
    File(File),
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Held::File(file) = &self.held {
            if let Err(error) = FileExt::unlock(file) {
                tracing::warn!("Failed to release lock {}: {}", self.name, error);
            }
        }
        tracing::trace!("Released lock {}", self.name);
    }
}

/// Non-blocking named mutual exclusion.
pub trait LockCoordinator {
    /// Take `name` if nobody holds it; `Ok(None)` when it is held elsewhere.
    fn try_acquire(&self, name: &str) -> Result<Option<LockGuard>>;
}

/// Run `body` under `name`, or skip it when the lock is taken.
///
/// The lock is released when `body` finishes, whether it succeeded or not.
pub async fn try_run<L, F, T>(locks: &L, name: &str, body: F) -> Result<Option<T>>
where
    L: LockCoordinator + ?Sized,
    F: Future<Output = T>,
{
    let Some(guard) = locks.try_acquire(name)? else {
        tracing::debug!("Lock {name} is held elsewhere, skipping");
        return Ok(None);
    };
    let output = body.await;
    drop(guard);
    Ok(Some(output))
}

/// In-process locks shared by clones of the same value.
#[derive(Debug, Clone, Default)]
pub struct LocalLocks {
    slots: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl LocalLocks {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockCoordinator for LocalLocks {
    fn try_acquire(&self, name: &str) -> Result<Option<LockGuard>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(name.to_string()).or_default())
        };

        Ok(slot.try_lock_owned().ok().map(|guard| LockGuard {
            name: name.to_string(),
            held: Held::Local(guard),
        }))
    }
}

/// Cross-process locks backed by `<dir>/<name>.lock` files.
#[derive(Debug, Clone)]
pub struct FileLocks {
    dir: PathBuf,
}

impl FileLocks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Percent-encoded so distinct names never share a file
    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", urlencoding::encode(name)))
    }
}

impl LockCoordinator for FileLocks {
    fn try_acquire(&self, name: &str) -> Result<Option<LockGuard>> {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(name))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(LockGuard {
                name: name.to_string(),
                held: Held::File(file),
            })),
            Err(error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }
}

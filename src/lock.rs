//! File-based locking for store-root ownership.
//!
//! Cross-platform (fs2) advisory locks:
//! - Exclusive: a store root belongs to exactly one process at a time.
//!   Two processes starting their service-id counters from zero would
//!   otherwise produce colliding chapter file names.
//!
//! Lock file path: <root>/LOCK
//! Lock is released on Drop.

use fs2::FileExt;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use crate::consts::STORE_LOCK_FILE;

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        let _ = self.file.unlock();
    }
}

fn lock_file_path(root: &Path) -> PathBuf {
    root.join(STORE_LOCK_FILE)
}

fn open_lock_file(root: &Path) -> io::Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_file_path(root))
}

/// Try to take the root exclusively. Errors if another process holds it.
pub fn try_acquire_exclusive_lock(root: &Path) -> io::Result<LockGuard> {
    let file = open_lock_file(root)?;
    file.try_lock_exclusive()?;
    Ok(LockGuard {
        file,
        path: lock_file_path(root),
    })
}

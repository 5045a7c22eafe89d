//! Advisory per-fingerprint file locks.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::error::CacheError;

/// Guard over an advisory lock file. The lock is released when the guard is
/// dropped and the file handle closes.
#[derive(Debug)]
pub struct SectionLock {
    _file: File,
    path: PathBuf,
}

impl SectionLock {
    /// Blocks until an exclusive lock on `path` is held.
    pub fn exclusive(path: &Path) -> Result<Self, CacheError> {
        let file = open_lock_file(path)?;
        FileExt::lock_exclusive(&file).map_err(|source| CacheError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Blocks until a shared lock on `path` is held.
    pub fn shared(path: &Path) -> Result<Self, CacheError> {
        let file = open_lock_file(path)?;
        FileExt::lock_shared(&file).map_err(|source| CacheError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// The lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File, CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(CacheError::io(parent))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| CacheError::Lock {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn creates_lock_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks/abc.lock");
        let lock = SectionLock::exclusive(&path).unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path);
    }

    #[test]
    fn shared_locks_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.lock");
        let _a = SectionLock::shared(&path).unwrap();
        let _b = SectionLock::shared(&path).unwrap();
    }

    #[test]
    fn relock_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.lock");
        drop(SectionLock::exclusive(&path).unwrap());
        let _again = SectionLock::exclusive(&path).unwrap();
    }

    #[test]
    fn exclusive_lock_serializes_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("x.lock"));
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = Arc::clone(&path);
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    let _lock = SectionLock::exclusive(&path).unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}

//! Cross-process exclusion for reconciliation cycles.
//!
//! The in-process gate in [`crate::engine`] only serializes cycles of one
//! [`crate::Reconciler`]. A long-running `serve` and one-shot CLI commands
//! each build their own engine over the same store and artifact, so the
//! snapshot, write and reload of a cycle are additionally wrapped in an
//! exclusive `flock` on a lock file next to the artifact.
//!
//! The lock is advisory and released when the guard's file handle closes,
//! including when the holding process dies.

use crate::error::ArtifactWriteError;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file shared by every engine publishing the same artifact.
#[derive(Debug, Clone)]
pub struct CycleLock {
    path: PathBuf,
}

/// Held for the duration of one cycle.
#[derive(Debug)]
pub struct CycleLockGuard {
    _file: File,
}

impl CycleLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<artifact>.lock`
    pub fn beside(artifact: &Path) -> Self {
        let mut name = artifact.as_os_str().to_owned();
        name.push(".lock");
        Self::new(PathBuf::from(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until no other holder remains.
    pub fn acquire(&self) -> Result<CycleLockGuard, ArtifactWriteError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| ArtifactWriteError::io("create directory", parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| ArtifactWriteError::io("open lock file", &self.path, e))?;

        lock_exclusive(&file).map_err(|e| ArtifactWriteError::io("lock", &self.path, e))?;
        tracing::trace!(path = %self.path.display(), "cycle lock acquired");

        Ok(CycleLockGuard { _file: file })
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    loop {
        match flock(file.as_raw_fd(), FlockArg::LockExclusive) {
            Ok(()) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_lock_file_sits_beside_artifact() {
        let lock = CycleLock::beside(Path::new("/var/lib/proxy/whitelist.txt"));
        assert_eq!(lock.path(), Path::new("/var/lib/proxy/whitelist.txt.lock"));
    }

    #[test]
    fn test_acquire_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let lock = CycleLock::beside(&dir.path().join("nested/whitelist.txt"));

        let _guard = lock.acquire().unwrap();

        assert!(lock.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_holder_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt.lock");
        let guard = CycleLock::new(&path).acquire().unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = std::thread::spawn(move || {
            let _guard = CycleLock::new(&path).acquire().unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }
}

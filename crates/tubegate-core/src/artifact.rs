//! Allow-list artifact: rendering and durable atomic replacement.
//!
//! The artifact is a plain-text file, one identifier per line, read by the
//! enforcement point. Replacement stages the new content in a temp file in
//! the same directory and renames it over the target, so a reader sees either
//! the old file or the new one and a crash leaves the old file in place.

use crate::error::ArtifactWriteError;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sink for the rendered active set.
pub trait ArtifactWriter: Send + Sync {
    /// Replace the artifact with exactly `active`.
    fn write(&self, active: &BTreeSet<String>) -> Result<(), ArtifactWriteError>;
}

/// Artifact stored at a fixed filesystem path.
#[derive(Debug, Clone)]
pub struct FileArtifact {
    path: PathBuf,
}

impl FileArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactWriter for FileArtifact {
    fn write(&self, active: &BTreeSet<String>) -> Result<(), ArtifactWriteError> {
        atomic_replace(&self.path, |w| render(w, active))
    }
}

/// Write one identifier per line.
pub fn render(w: &mut dyn Write, active: &BTreeSet<String>) -> io::Result<()> {
    for id in active {
        w.write_all(id.as_bytes())?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

/// Replace `path` with whatever `fill` writes.
///
/// If `fill` or any later step fails, `path` is untouched and the staging
/// file is removed.
pub fn atomic_replace<F>(path: &Path, fill: F) -> Result<(), ArtifactWriteError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    if !parent.exists() {
        fs::create_dir_all(parent)
            .map_err(|e| ArtifactWriteError::io("create directory", parent, e))?;
    }

    // Same directory as the target: rename stays on one filesystem.
    let mut tmp = tempfile::Builder::new()
        .prefix(".tubegate-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| ArtifactWriteError::io("stage artifact in", parent, e))?;

    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        fill(&mut w).map_err(|e| ArtifactWriteError::io("render artifact", path, e))?;
        w.flush()
            .map_err(|e| ArtifactWriteError::io("flush staged artifact", path, e))?;
    }

    tmp.as_file()
        .sync_all()
        .map_err(|e| ArtifactWriteError::io("fsync staged artifact", path, e))?;

    set_reader_permissions(tmp.path(), path)?;

    tmp.persist(path)
        .map_err(|e| ArtifactWriteError::io("replace artifact", path, e.error))?;

    fsync_directory(parent)
}

/// Read an existing artifact back into a set. A missing file is empty.
pub fn read_artifact(path: &Path) -> io::Result<BTreeSet<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(e),
    }
}

// Temp files are created 0600; the proxy usually runs as another user.
// Keep the mode of the file being replaced, or 0644 for a new one.
#[cfg(unix)]
fn set_reader_permissions(staged: &Path, target: &Path) -> Result<(), ArtifactWriteError> {
    use std::os::unix::fs::PermissionsExt;

    let perms = match fs::metadata(target) {
        Ok(meta) => meta.permissions(),
        Err(_) => fs::Permissions::from_mode(0o644),
    };
    fs::set_permissions(staged, perms)
        .map_err(|e| ArtifactWriteError::io("set permissions on staged artifact", target, e))
}

#[cfg(not(unix))]
fn set_reader_permissions(_staged: &Path, _target: &Path) -> Result<(), ArtifactWriteError> {
    Ok(())
}

#[cfg(unix)]
fn fsync_directory(dir: &Path) -> Result<(), ArtifactWriteError> {
    let dir_file =
        File::open(dir).map_err(|e| ArtifactWriteError::io("open directory for fsync", dir, e))?;
    dir_file
        .sync_all()
        .map_err(|e| ArtifactWriteError::io("fsync directory", dir, e))
}

#[cfg(not(unix))]
fn fsync_directory(_dir: &Path) -> Result<(), ArtifactWriteError> {
    Ok(())
}

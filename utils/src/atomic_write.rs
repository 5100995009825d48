//! Atomic file write helpers.
//!
//! A durable launch-state file must never be observed half-written: the very
//! crash we are trying to detect may land in the middle of a write. Bytes go
//! to a temp file in the same directory and are renamed over the target. On
//! Windows, rename-over-existing fails, so the old file is moved to `.bak`
//! first and restored if the second rename fails.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSyncPolicy {
    SyncAll,
    SkipSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentDirSyncPolicy {
    SyncBestEffort,
    SkipSync,
}

#[derive(Debug, Clone, Copy)]
pub struct AtomicWriteOptions {
    /// File sync policy for the temp file before it is renamed into place.
    pub file_sync: FileSyncPolicy,
    /// Parent directory sync policy after the rename.
    pub parent_dir_sync: ParentDirSyncPolicy,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self {
        Self {
            file_sync: FileSyncPolicy::SyncAll,
            parent_dir_sync: ParentDirSyncPolicy::SyncBestEffort,
        }
    }
}

/// Restore `path` from `path.bak` after an interrupted write.
///
/// Only acts when the canonical file is missing and the backup exists, which
/// is exactly the window between the two renames in [`atomic_write`].
/// Returns true if a backup was restored.
pub fn recover_bak_file(path: &Path) -> bool {
    let backup = path.with_extension("bak");
    if path.exists() || !backup.exists() {
        return false;
    }
    match fs::rename(&backup, path) {
        Ok(()) => {
            warn!(path = %path.display(), "Recovered .bak file from interrupted atomic write");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to recover .bak file: {e}");
            false
        }
    }
}

pub fn atomic_write(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: AtomicWriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = parent_or_cwd(path);

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    if options.file_sync == FileSyncPolicy::SyncAll {
        tmp.as_file().sync_all()?;
    }

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        let backup = path.with_extension("bak");
        let _ = fs::remove_file(&backup);
        fs::rename(path, &backup)?;
        if let Err(rename_err) = err.file.persist(path) {
            let _ = fs::rename(&backup, path);
            return Err(rename_err.error);
        }
        if let Err(e) = fs::remove_file(&backup) {
            warn!(path = %backup.display(), "Failed to remove .bak after atomic write: {e}");
        }
    }

    if options.parent_dir_sync == ParentDirSyncPolicy::SyncBestEffort {
        sync_dir_best_effort(parent);
    }
    Ok(())
}

fn parent_or_cwd(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_dir_best_effort(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        debug!(path = %dir.display(), "Directory sync failed (best-effort): {e}");
    }
}

#[cfg(not(unix))]
fn sync_dir_best_effort(dir: &Path) {
    debug!(path = %dir.display(), "Directory sync skipped on this platform");
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, atomic_write};

    fn fast() -> AtomicWriteOptions {
        AtomicWriteOptions {
            file_sync: FileSyncPolicy::SkipSync,
            parent_dir_sync: ParentDirSyncPolicy::SkipSync,
        }
    }

    #[test]
    fn overwrites_existing_and_cleans_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        atomic_write(&path, b"one", fast()).expect("write one");
        atomic_write(&path, b"two", AtomicWriteOptions::default()).expect("write two");

        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        assert!(!path.with_extension("bak").exists());
    }

    #[test]
    fn fails_when_parent_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("state.json");
        assert!(atomic_write(&path, b"x", fast()).is_err());
    }

    #[test]
    fn recovers_backup_when_target_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        fs::write(path.with_extension("bak"), b"saved").expect("write bak");

        assert!(super::recover_bak_file(&path));
        assert_eq!(fs::read_to_string(&path).expect("read"), "saved");
        assert!(!path.with_extension("bak").exists());
    }

    #[test]
    fn leaves_backup_alone_when_target_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        fs::write(&path, b"current").expect("write");
        fs::write(path.with_extension("bak"), b"stale").expect("write bak");

        assert!(!super::recover_bak_file(&path));
        assert_eq!(fs::read_to_string(&path).expect("read"), "current");
    }
}

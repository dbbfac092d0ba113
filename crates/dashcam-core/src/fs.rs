use crate::error::CaptureError;
use crate::filename::PARTIAL_SUFFIX;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem operations the capture loop and gallery rely on.
pub trait Filesystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> Result<(), CaptureError>;

    /// Move `from` to `to`. The target either appears complete or not at all,
    /// and an existing target is never replaced.
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), CaptureError>;

    fn copy_file(&self, from: &Path, to: &Path) -> Result<u64, CaptureError>;

    /// Entry names of a directory. Missing directories list as empty.
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, CaptureError>;

    /// Removing a missing file is not an error.
    fn remove_file(&self, path: &Path) -> Result<(), CaptureError>;

    /// Removing a missing directory is not an error.
    fn remove_dir_all(&self, path: &Path) -> Result<(), CaptureError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub len: u64,
}

/// [`Filesystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    fn partial_path(to: &Path) -> PathBuf {
        let name = to
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        to.with_file_name(format!(".{}{}", name, PARTIAL_SUFFIX))
    }

    /// Publish `from` under `to` without replacing anything already there.
    /// A hard link gives that atomically. Filesystems without hard links
    /// (FAT, exFAT) fall back to check-then-rename, which assumes one writer
    /// per session directory.
    fn link_into_place(from: &Path, to: &Path) -> io::Result<()> {
        match fs::hard_link(from, to) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(from) {
                    debug!("Linked {:?} but could not remove {:?}: {}", to, from, e);
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
            Err(_) if to.exists() => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "target already exists",
            )),
            Err(_) => fs::rename(from, to),
        }
    }

    /// Copy into a hidden sibling of `to`, then link it into place, so that
    /// listings of the target directory never see a half-written file.
    fn copy_then_link(from: &Path, to: &Path) -> io::Result<()> {
        let partial = Self::partial_path(to);
        if let Err(e) = fs::copy(from, &partial).and_then(|_| Self::link_into_place(&partial, to)) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        fs::remove_file(from)
    }
}

impl Filesystem for LocalFs {
    fn create_dir_all(&self, path: &Path) -> Result<(), CaptureError> {
        fs::create_dir_all(path).map_err(|e| CaptureError::storage(path, e))
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), CaptureError> {
        match Self::link_into_place(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(CaptureError::storage(to, e)),
            Err(e) if !from.exists() => Err(CaptureError::storage(from, e)),
            Err(e) => {
                // links and renames fail across mount points; fall back to copying
                debug!("move {:?} -> {:?} failed ({}), copying instead", from, to, e);
                Self::copy_then_link(from, to).map_err(|e| CaptureError::storage(to, e))
            }
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<u64, CaptureError> {
        fs::copy(from, to).map_err(|e| CaptureError::storage(to, e))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, CaptureError> {
        let iter = match fs::read_dir(path) {
            Ok(iter) => iter,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CaptureError::storage(path, e)),
        };

        let mut entries = Vec::new();
        for entry in iter {
            let entry = entry.map_err(|e| CaptureError::storage(path, e))?;
            // an entry may vanish between listing and stat
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                len: meta.len(),
            });
        }
        Ok(entries)
    }

    fn remove_file(&self, path: &Path) -> Result<(), CaptureError> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(CaptureError::storage(path, e)),
            _ => Ok(()),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), CaptureError> {
        match fs::remove_dir_all(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(CaptureError::storage(path, e)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_move_file_places_complete_file() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("frame.tmp");
        let target_dir = dir.path().join("session");
        fs::create_dir_all(&target_dir).unwrap();
        fs::write(&from, b"jpeg bytes").unwrap();

        let to = target_dir.join("1_lat1_000000_lng1_000000.jpg");
        LocalFs.move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"jpeg bytes");
        let names: Vec<_> = LocalFs
            .read_dir(&target_dir)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["1_lat1_000000_lng1_000000.jpg".to_string()]);
    }

    #[test]
    fn test_move_file_refuses_to_replace() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b.jpg");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let err = LocalFs.move_file(&from, &to).unwrap_err();
        assert!(matches!(err, CaptureError::StorageFailure { .. }));
        assert_eq!(fs::read(&to).unwrap(), b"old");
        assert!(from.exists());
    }

    #[test]
    fn test_move_file_missing_source_is_storage_failure() {
        let dir = tempdir().unwrap();
        let err = LocalFs
            .move_file(&dir.path().join("missing"), &dir.path().join("x.jpg"))
            .unwrap_err();
        assert!(matches!(err, CaptureError::StorageFailure { .. }));
    }

    #[test]
    fn test_copy_then_link_leaves_no_partial() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("src.jpg");
        let to = dir.path().join("dst.jpg");
        fs::write(&from, b"abc").unwrap();

        LocalFs::copy_then_link(&from, &to).unwrap();

        assert_eq!(fs::read(&to).unwrap(), b"abc");
        assert!(!from.exists());
        assert!(!LocalFs::partial_path(&to).exists());
    }

    #[test]
    fn test_copy_then_link_never_replaces() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("src.jpg");
        let to = dir.path().join("dst.jpg");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let err = LocalFs::copy_then_link(&from, &to).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&to).unwrap(), b"old");
        assert!(from.exists());
        assert!(!LocalFs::partial_path(&to).exists());
    }

    #[test]
    fn test_link_into_place_refuses_existing_target() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("frame.tmp");
        let to = dir.path().join("1_lat1_000000_lng1_000000.jpg");
        fs::write(&from, b"second").unwrap();
        fs::write(&to, b"first").unwrap();

        let err = LocalFs::link_into_place(&from, &to).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&to).unwrap(), b"first");
        assert_eq!(fs::read(&from).unwrap(), b"second");
    }

    #[test]
    fn test_removals_are_idempotent() {
        let dir = tempdir().unwrap();
        LocalFs.remove_file(&dir.path().join("nope.jpg")).unwrap();
        LocalFs.remove_dir_all(&dir.path().join("nope")).unwrap();
        assert!(LocalFs.read_dir(&dir.path().join("nope")).unwrap().is_empty());
    }
}

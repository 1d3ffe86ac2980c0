//! Disk space guard.
//!
//! Admission checks run synchronously before any write-heavy operation
//! (capture, archive creation). Required space is always expressed in bytes
//! and compared against free bytes on the disk holding the target path.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for disk space operations
#[derive(Debug, Error)]
pub enum DiskError {
    /// No disk could be resolved for the given path
    #[error("No disk found for path {0}")]
    UnknownDisk(PathBuf),

    /// Not enough free space for the requested write
    #[error("Insufficient space on {path}: {required} bytes required, {free} bytes free")]
    InsufficientSpace {
        required: u64,
        free: u64,
        path: PathBuf,
    },
}

/// Returns the available bytes on the disk holding `path`.
///
/// The disk is resolved by longest mount-point prefix match, so a relative
/// path is canonicalized against the current directory first.
pub fn free_space(path: &Path) -> Result<u64, DiskError> {
    use sysinfo::Disks;

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let disks = Disks::new_with_refreshed_list();
    let mut best: Option<(usize, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if absolute.starts_with(mount) {
            let depth = mount.components().count();
            if best.map(|(d, _)| depth > d).unwrap_or(true) {
                best = Some((depth, disk.available_space()));
            }
        }
    }

    best.map(|(_, free)| free)
        .ok_or_else(|| DiskError::UnknownDisk(absolute))
}

/// Admission check: fails when `required_bytes` exceeds the free space at `path`.
pub fn ensure_space(path: &Path, required_bytes: u64) -> Result<(), DiskError> {
    let free = free_space(path)?;
    if required_bytes > free {
        return Err(DiskError::InsufficientSpace {
            required: required_bytes,
            free,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Total byte size of all files under `path`, recursively.
///
/// A missing directory counts as empty.
pub fn dir_size(path: &Path) -> u64 {
    use walkdir::WalkDir;

    if !path.exists() {
        return 0;
    }

    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_free_space_resolves_tmp() {
        let free = free_space(Path::new("/tmp")).expect("should resolve disk for /tmp");
        assert!(free > 0);
    }

    #[test]
    fn test_ensure_space_zero_required_passes() {
        ensure_space(Path::new("/tmp"), 0).expect("zero bytes always fits");
    }

    #[test]
    fn test_ensure_space_absurd_requirement_fails() {
        let err = ensure_space(Path::new("/tmp"), u64::MAX).unwrap_err();
        match err {
            DiskError::InsufficientSpace { required, free, .. } => {
                assert_eq!(required, u64::MAX);
                assert!(free < u64::MAX);
            }
            other => panic!("expected InsufficientSpace, got {:?}", other),
        }
    }

    #[test]
    fn test_dir_size_missing_dir_is_zero() {
        assert_eq!(dir_size(Path::new("/nonexistent/snapcam/folder")), 0);
    }

    #[test]
    fn test_dir_size_counts_all_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("b.jpg"), vec![0u8; 250]).unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("c.jpg"), vec![0u8; 50]).unwrap();

        assert_eq!(dir_size(dir.path()), 400);
    }

    #[test]
    fn test_dir_size_empty_dir_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(dir_size(dir.path()), 0);
    }
}

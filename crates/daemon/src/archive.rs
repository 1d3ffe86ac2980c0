//! Archive lifecycle.
//!
//! On-demand zip bundles of a source's image folder, written to the temp
//! directory under disk-space admission. Archives are ephemeral: deletion is
//! idempotent, stale archives from a prior run are purged at startup, and
//! expiry scheduling lives in the daemon layer so this store has no
//! scheduler dependency.

use crate::disk::{self, DiskError};
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Error type for archive operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The source has no image folder to archive
    #[error("No image folder for source {0:?}")]
    MissingFolder(String),

    /// Disk-space admission failed
    #[error(transparent)]
    Disk(#[from] DiskError),

    /// Filesystem failure while archiving
    #[error("IO error during archiving: {0}")]
    Io(#[from] io::Error),

    /// Zip writer failure
    #[error("Zip failure: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Creates and removes per-source zip archives in the temp directory.
pub struct ArchiveStore {
    image_root: PathBuf,
    temp_dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(image_root: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            image_root,
            temp_dir,
        }
    }

    /// Path the archive for `name` lives at, whether or not it exists.
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.temp_dir.join(format!("{}.zip", name))
    }

    /// Builds `{temp_dir}/{name}.zip` from every file in the source's image
    /// folder, flat (no nested paths).
    ///
    /// Admission compares the folder's total byte size against free bytes on
    /// the temp path before any write.
    pub fn create(&self, name: &str) -> Result<PathBuf, ArchiveError> {
        let folder = self.image_root.join(name);
        if !folder.is_dir() {
            return Err(ArchiveError::MissingFolder(name.to_string()));
        }

        fs::create_dir_all(&self.temp_dir)?;
        let required = disk::dir_size(&folder);
        disk::ensure_space(&self.temp_dir, required)?;

        let path = self.archive_path(name);
        let mut writer = ZipWriter::new(File::create(&path)?);
        let options = SimpleFileOptions::default();

        for entry in fs::read_dir(&folder)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            writer.start_file(filename, options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut writer)?;
        }
        writer.finish()?;

        log::info!("Archived source {:?} to {}", name, path.display());
        Ok(path)
    }

    /// Removes the archive for `name` if present.
    ///
    /// Idempotent: returns `false` (never an error) when already absent.
    pub fn delete(&self, name: &str) -> bool {
        let path = self.archive_path(name);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                log::warn!("Failed to remove archive {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Removes every file under the temp directory.
    ///
    /// Run once at process start to discard archives from a prior run.
    pub fn purge_all(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.temp_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

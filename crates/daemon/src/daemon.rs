//! Daemon composition and collaborator-facing operations.
//!
//! Owns the configuration store, scheduler, stream job manager, and archive
//! store, and exposes the operations the web layer calls. Every config
//! mutation runs store-mutate, then scheduler reconciliation, then durable
//! save - a crash before the save leaves the prior durable state consistent
//! with the previous job set, never an orphaned job for a deleted config.

use crate::archive::{ArchiveError, ArchiveStore};
use crate::capture::{CaptureError, CaptureOutcome, CapturePipeline};
use crate::codec::ImageCodec;
use crate::jobs::StreamJobs;
use crate::scheduler::Scheduler;
use crate::source::SourceConfig;
use crate::store::{ConfigStore, StoreError};
use crate::video::{StreamInfo, VideoSource};
use serde::Serialize;
use snapcam_config::Config;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Capture pipeline error
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Archive lifecycle error
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}

/// One stored image as reported to the web layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredFile {
    pub filename: String,
    pub size: u64,
}

/// A config plus per-request runtime info for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    #[serde(flatten)]
    pub config: SourceConfig,
    /// Number of stored images in the source's folder
    pub screenshots: usize,
    /// Synchronous reachability probe; outside any latency budget
    pub info: StreamInfo,
}

/// Daemon state containing all runtime components.
pub struct Daemon {
    config: Config,
    store: ConfigStore,
    scheduler: Arc<Scheduler>,
    jobs: StreamJobs,
    archives: Arc<ArchiveStore>,
    pipeline: Arc<CapturePipeline>,
}

impl Daemon {
    /// Wires the daemon from settings and the two capability backends.
    pub fn new(
        config: Config,
        source: Arc<dyn VideoSource>,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        let scheduler = Arc::new(Scheduler::new(config.capture.max_concurrent_jobs));
        let pipeline = Arc::new(CapturePipeline::new(
            source,
            codec,
            config.storage.image_root.clone(),
            config.storage.min_free_bytes,
        ));
        let store = ConfigStore::new(
            config.storage.state_file.clone(),
            config.storage.image_root.clone(),
        );
        let archives = Arc::new(ArchiveStore::new(
            config.storage.image_root.clone(),
            config.storage.temp_dir.clone(),
        ));
        let jobs = StreamJobs::new(scheduler.clone(), pipeline.clone());

        Self {
            config,
            store,
            scheduler,
            jobs,
            archives,
            pipeline,
        }
    }

    /// Startup sequence: load durable state, discard stale archives from a
    /// prior run, and bring the scheduler into agreement with the store.
    ///
    /// Must run inside a tokio runtime; capture jobs spawn here.
    pub fn start(&self) {
        self.store.load();
        if let Err(e) = self.archives.purge_all() {
            log::warn!("Failed to purge stale archives: {}", e);
        }
        let configs = self.store.list();
        log::info!("Loaded {} source(s) from state", configs.len());
        self.jobs.register_all(&configs);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn archives(&self) -> &Arc<ArchiveStore> {
        &self.archives
    }

    /// Ordered configs plus runtime info, computed synchronously per request.
    pub fn list_sources(&self) -> Vec<SourceStatus> {
        self.store
            .list()
            .into_iter()
            .map(|config| {
                let screenshots = count_files(&self.store.folder_for(&config.name));
                let info = self.pipeline.probe(&config.url);
                SourceStatus {
                    config,
                    screenshots,
                    info,
                }
            })
            .collect()
    }

    pub fn add_source(&self, config: SourceConfig) -> Result<(), DaemonError> {
        self.store.add(config.clone())?;
        self.jobs.on_config_added(&config);
        self.store.save()?;
        log::info!(
            "Added source {:?} (url: {}, interval: {} min)",
            config.name,
            config.url,
            config.interval_minutes
        );
        Ok(())
    }

    pub fn update_source(&self, name: &str, config: SourceConfig) -> Result<(), DaemonError> {
        self.store.update(name, config.clone())?;
        self.jobs.on_config_updated(&config);
        self.store.save()?;
        log::info!("Updated source {:?}", name);
        Ok(())
    }

    /// Removes a source and its capture job. An in-flight firing completes;
    /// no future firing occurs.
    pub fn delete_source(&self, name: &str) -> Result<(), DaemonError> {
        self.store.remove(name)?;
        self.jobs.on_config_removed(name);
        self.store.save()?;
        log::info!("Deleted source {:?}", name);
        Ok(())
    }

    /// Manual one-off capture. Out-of-band: the periodic schedule is not
    /// reset or reordered.
    pub fn trigger_capture_now(&self, name: &str) -> Result<CaptureOutcome, DaemonError> {
        let config = self
            .store
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(self.pipeline.capture(&config)?)
    }

    /// Builds an archive of the source's folder and (re)schedules its
    /// expiry. A fresh request supersedes any pending deletion.
    pub fn create_archive_for(&self, name: &str) -> Result<PathBuf, DaemonError> {
        if self.store.get(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()).into());
        }
        self.jobs.cancel_archive_expiry(name);
        let path = self.archives.create(name)?;
        let delay = Duration::from_secs(self.config.archive.expiry_minutes * 60);
        self.jobs
            .schedule_archive_expiry(name, delay, self.archives.clone());
        Ok(path)
    }

    /// Stored images for one source, ordered by filename.
    pub fn list_stored_files(&self, name: &str) -> Result<Vec<StoredFile>, DaemonError> {
        if self.store.get(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()).into());
        }
        let folder = self.store.folder_for(name);
        let mut files = Vec::new();
        if folder.is_dir() {
            for entry in fs::read_dir(&folder)? {
                let entry = entry?;
                let metadata = entry.metadata()?;
                if metadata.is_file() {
                    files.push(StoredFile {
                        filename: entry.file_name().to_string_lossy().into_owned(),
                        size: metadata.len(),
                    });
                }
            }
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    /// Removes every stored image for one source, keeping the folder.
    pub fn clear_folder(&self, name: &str) -> Result<(), DaemonError> {
        if self.store.get(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()).into());
        }
        let folder = self.store.folder_for(name);
        if folder.is_dir() {
            for entry in fs::read_dir(&folder)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        log::info!("Cleared image folder for source {:?}", name);
        Ok(())
    }
}

fn count_files(folder: &std::path::Path) -> usize {
    match fs::read_dir(folder) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .count(),
        Err(_) => 0,
    }
}

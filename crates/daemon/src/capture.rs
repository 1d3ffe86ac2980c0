//! Capture pipeline.
//!
//! One invocation implements the per-firing policy for a single source:
//! enabled flag, time-of-day window, disk-space preflight, one-frame read,
//! best-effort resize, format-specific encode, timestamped write. Expected
//! conditions (disabled, out of window, no space, dead camera) are outcome
//! and error values, never panics; the scheduler logs them and the job stays
//! scheduled.

use crate::codec::{EncodeError, ImageCodec};
use crate::disk::{self, DiskError};
use crate::source::{ConfigInvalid, SourceConfig};
use crate::video::VideoSource;
use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Why a firing wrote nothing without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `save_images` is false for this source
    Disabled,
    /// Current time-of-day is outside the configured save window
    OutOfWindow,
}

/// Result of one capture invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A frame was encoded and written to this path
    Saved(PathBuf),
    /// Policy decided not to capture; no I/O happened
    Skipped(SkipReason),
}

/// Error type for capture operations
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Source config violates an invariant (window bounds missing)
    #[error(transparent)]
    Config(#[from] ConfigInvalid),

    /// Disk-space admission failed
    #[error(transparent)]
    Disk(#[from] DiskError),

    /// The source could not be opened or yielded no frame
    #[error("Capture unavailable for source {source_name} ({url})")]
    Unavailable { source_name: String, url: String },

    /// The encoder rejected the frame
    #[error("Encode failed for source {source_name}: {source}")]
    EncodeFailed {
        source_name: String,
        #[source]
        source: EncodeError,
    },

    /// Filesystem failure creating the folder or writing the image
    #[error("IO error during capture: {0}")]
    Io(#[from] std::io::Error),
}

/// Captures single frames from configured sources into per-source folders.
pub struct CapturePipeline {
    source: Arc<dyn VideoSource>,
    codec: Arc<dyn ImageCodec>,
    image_root: PathBuf,
    min_free_bytes: u64,
}

impl CapturePipeline {
    pub fn new(
        source: Arc<dyn VideoSource>,
        codec: Arc<dyn ImageCodec>,
        image_root: PathBuf,
        min_free_bytes: u64,
    ) -> Self {
        Self {
            source,
            codec,
            image_root,
            min_free_bytes,
        }
    }

    /// Folder holding a source's stored images.
    pub fn folder_for(&self, name: &str) -> PathBuf {
        self.image_root.join(name)
    }

    pub fn image_root(&self) -> &PathBuf {
        &self.image_root
    }

    /// Runtime reachability probe for one source URL.
    pub fn probe(&self, url: &str) -> crate::video::StreamInfo {
        self.source.probe(url)
    }

    /// Captures one frame for `config` at the current local time.
    pub fn capture(&self, config: &SourceConfig) -> Result<CaptureOutcome, CaptureError> {
        self.capture_at(config, Local::now().naive_local())
    }

    /// Captures one frame, with an explicit wall-clock instant.
    ///
    /// Separated from [`capture`](Self::capture) so window policy is testable
    /// without faking the system clock.
    pub fn capture_at(
        &self,
        config: &SourceConfig,
        now: NaiveDateTime,
    ) -> Result<CaptureOutcome, CaptureError> {
        if !config.save_images {
            return Ok(CaptureOutcome::Skipped(SkipReason::Disabled));
        }

        if config.use_save_time_interval {
            let (start, end) = match (config.save_time_start, config.save_time_end) {
                (Some(start), Some(end)) => (start, end),
                _ => return Err(ConfigInvalid::IncompleteWindow.into()),
            };
            let time = now.time();
            if !(start <= time && time <= end) {
                return Ok(CaptureOutcome::Skipped(SkipReason::OutOfWindow));
            }
        }

        disk::ensure_space(&self.image_root, self.min_free_bytes)?;

        let folder = self.folder_for(&config.name);
        fs::create_dir_all(&folder)?;

        let mut frame = {
            let mut handle =
                self.source
                    .open(&config.url)
                    .map_err(|_| CaptureError::Unavailable {
                        source_name: config.name.clone(),
                        url: config.url.clone(),
                    })?;
            handle.read_frame().ok_or_else(|| CaptureError::Unavailable {
                source_name: config.name.clone(),
                url: config.url.clone(),
            })?
            // handle drops here: source released before encoding
        };

        if config.resize {
            match config.resize_dimensions() {
                Some((width, height)) => match self.codec.resize(&frame, width, height) {
                    Ok(resized) => frame = resized,
                    Err(e) => {
                        log::error!(
                            "Resize to {}x{} failed for source {:?}, saving unresized: {}",
                            width,
                            height,
                            config.name,
                            e
                        );
                    }
                },
                None => {
                    log::error!(
                        "Resize enabled but dimensions invalid for source {:?}, saving unresized",
                        config.name
                    );
                }
            }
        }

        let params = config.encoder_params();
        let bytes =
            self.codec
                .encode(&frame, &params)
                .map_err(|e| CaptureError::EncodeFailed {
                    source_name: config.name.clone(),
                    source: e,
                })?;

        let filename = format!(
            "{}_{}{}",
            config.name,
            now.format("%Y-%m-%d_%H-%M-%S"),
            config.extension.extension()
        );
        let path = folder.join(filename);
        fs::write(&path, bytes)?;

        Ok(CaptureOutcome::Saved(path))
    }
}

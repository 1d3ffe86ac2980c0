//! Snapcam Daemon
//!
//! Background service that captures periodic snapshots from configured video
//! sources, stores them per-source on disk, and serves a management HTTP API.

pub mod archive;
pub mod capture;
pub mod codec;
pub mod daemon;
pub mod disk;
pub mod jobs;
pub mod scheduler;
pub mod server;
pub mod source;
pub mod store;
pub mod video;

pub use snapcam_config as config;
pub use snapcam_config::Config;

pub use archive::{ArchiveError, ArchiveStore};
pub use capture::{CaptureError, CaptureOutcome, CapturePipeline, SkipReason};
pub use codec::{EncodeError, ImageCodec, ImageRsCodec};
pub use daemon::{Daemon, DaemonError, SourceStatus, StoredFile};
pub use disk::{dir_size, ensure_space, free_space, DiskError};
pub use jobs::{archive_job_id, StreamJobs};
pub use scheduler::{JobKind, Scheduler};
pub use server::{create_router, run_server, ServerError};
pub use source::{ConfigInvalid, EncoderParams, ImageFormat, SourceConfig};
pub use store::{ConfigStore, StoreError};
pub use video::{
    Frame, SourceError, SourceHandle, StreamInfo, StubVideoSource, VideoSource,
};

//! Stream job manager.
//!
//! Binds configuration store entries to scheduler jobs: one periodic capture
//! job per enabled source (job id = source name), plus on-demand one-shot
//! archive-deletion jobs (`"{name}_delete_archive"`). Per-firing capture
//! failures are logged here and the job stays scheduled.

use crate::archive::ArchiveStore;
use crate::capture::{CaptureOutcome, CapturePipeline, SkipReason};
use crate::scheduler::{JobAction, Scheduler};
use crate::source::SourceConfig;
use std::sync::Arc;
use std::time::Duration;

/// Scheduler job id for a source's archive-deletion one-shot.
pub fn archive_job_id(name: &str) -> String {
    format!("{}_delete_archive", name)
}

/// Reconciles the scheduler's jobs with the configuration store.
pub struct StreamJobs {
    scheduler: Arc<Scheduler>,
    pipeline: Arc<CapturePipeline>,
}

impl StreamJobs {
    pub fn new(scheduler: Arc<Scheduler>, pipeline: Arc<CapturePipeline>) -> Self {
        Self {
            scheduler,
            pipeline,
        }
    }

    /// Schedules a periodic capture job for every enabled config.
    pub fn register_all(&self, configs: &[SourceConfig]) {
        for config in configs {
            self.reconcile(config);
        }
    }

    /// Reconciles one config: enabled sources get a (replaced) periodic job,
    /// disabled sources get any existing job removed.
    fn reconcile(&self, config: &SourceConfig) {
        if config.save_images {
            let action = self.capture_action(config.clone());
            self.scheduler
                .add_periodic(&config.name, config.interval_minutes, action);
            log::info!(
                "Scheduled capture job for source {:?} every {} min",
                config.name,
                config.interval_minutes
            );
        } else {
            self.scheduler.remove(&config.name);
            log::info!("Source {:?} disabled, no capture job", config.name);
        }
    }

    pub fn on_config_added(&self, config: &SourceConfig) {
        self.reconcile(config);
    }

    pub fn on_config_updated(&self, config: &SourceConfig) {
        self.reconcile(config);
    }

    /// Removes the capture job. Not-currently-scheduled is fine; config
    /// deletion must not fail on it.
    pub fn on_config_removed(&self, name: &str) {
        self.scheduler.remove(name);
    }

    /// Schedules archive deletion at now + `delay`, cancelling any pending
    /// deletion job first so a fresh archive request resets the expiry
    /// instead of stacking deletions.
    pub fn schedule_archive_expiry(
        &self,
        name: &str,
        delay: Duration,
        archives: Arc<ArchiveStore>,
    ) {
        let id = archive_job_id(name);
        let name = name.to_string();
        let action: JobAction = Arc::new(move || {
            if archives.delete(&name) {
                log::info!("Expired archive for source {:?}", name);
            }
        });
        // add_once replaces any pending job under the same id.
        self.scheduler.add_once(&id, delay, action);
    }

    /// Cancels a pending deletion job for this source's archive.
    pub fn cancel_archive_expiry(&self, name: &str) {
        self.scheduler.remove(&archive_job_id(name));
    }

    fn capture_action(&self, config: SourceConfig) -> JobAction {
        let pipeline = self.pipeline.clone();
        Arc::new(move || match pipeline.capture(&config) {
            Ok(CaptureOutcome::Saved(path)) => {
                log::info!("Saved image for source {:?}: {}", config.name, path.display());
            }
            Ok(CaptureOutcome::Skipped(SkipReason::Disabled)) => {
                log::debug!("Source {:?} disabled, capture skipped", config.name);
            }
            Ok(CaptureOutcome::Skipped(SkipReason::OutOfWindow)) => {
                log::debug!("Source {:?} outside save window, capture skipped", config.name);
            }
            Err(e) => {
                // Transient by assumption; the job stays scheduled.
                log::error!("Capture failed for source {:?}: {}", config.name, e);
            }
        })
    }
}

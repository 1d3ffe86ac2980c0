//! Generic named-job scheduler.
//!
//! An explicit instance owned by the process entry point; nothing here is a
//! process-wide global. Jobs are periodic ("every N minutes") or one-shot
//! ("after delay D"), keyed by id. Adding under an existing id replaces the
//! old job atomically under the registry lock, so no id ever has two live
//! schedules. Actions are blocking closures; each job task runs its action
//! on the blocking pool under a bounded semaphore and awaits completion
//! before the next tick, which gives per-id no-overlap for free.
//!
//! Cancellation is cooperative: the cancel flag is checked after a tick and
//! before the action starts, and a firing already running completes. A
//! panicking action fails only that firing; the job and the dispatcher
//! survive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

/// A job's action: a blocking closure run per firing.
pub type JobAction = Arc<dyn Fn() + Send + Sync + 'static>;

/// Schedule shape of a registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Periodic { period: Duration },
    Once,
}

struct JobEntry {
    generation: u64,
    kind: JobKind,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

type JobMap = Arc<Mutex<HashMap<String, JobEntry>>>;

/// Periodic/one-shot job runner with replace-by-id and cancel-by-id.
pub struct Scheduler {
    jobs: JobMap,
    workers: Arc<Semaphore>,
    next_generation: AtomicU64,
}

impl Scheduler {
    /// Creates a scheduler with a bounded action-worker pool.
    ///
    /// `max_workers == 0` derives the bound from the CPU count.
    pub fn new(max_workers: usize) -> Self {
        let permits = if max_workers == 0 {
            num_cpus::get().max(1)
        } else {
            max_workers
        };
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            workers: Arc::new(Semaphore::new(permits)),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Registers a periodic job firing every `every_minutes` minutes.
    ///
    /// The first firing happens one period after registration. An existing
    /// job with the same id is replaced.
    pub fn add_periodic(&self, id: &str, every_minutes: u32, action: JobAction) {
        self.add_periodic_every(
            id,
            Duration::from_secs(u64::from(every_minutes) * 60),
            action,
        );
    }

    /// Periodic registration with an explicit period.
    pub fn add_periodic_every(&self, id: &str, period: Duration, action: JobAction) {
        let entry = self.register(id, JobKind::Periodic { period });
        let id = id.to_string();
        let workers = self.workers.clone();
        let cancelled = entry.0;
        let notify = entry.1;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = notify.notified() => break,
                }
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                run_action(&id, &workers, &cancelled, &action).await;
            }
            log::debug!("Periodic job {:?} stopped", id);
        });
    }

    /// Registers a one-shot job firing once after `delay`.
    ///
    /// An existing job with the same id is replaced. The registry entry is
    /// cleared after the firing completes.
    pub fn add_once(&self, id: &str, delay: Duration, action: JobAction) {
        let (cancelled, notify, generation) = self.register_with_generation(id, JobKind::Once);
        let id = id.to_string();
        let workers = self.workers.clone();
        let jobs = self.jobs.clone();

        tokio::spawn(async move {
            let deadline = Instant::now() + delay;
            let fired = tokio::select! {
                _ = sleep_until(deadline) => true,
                _ = notify.notified() => false,
            };
            if fired && !cancelled.load(Ordering::SeqCst) {
                run_action(&id, &workers, &cancelled, &action).await;
            }
            // Unregister ourselves unless a replacement took the id.
            let mut jobs = jobs.lock().expect("scheduler registry lock poisoned");
            if jobs.get(&id).map(|e| e.generation) == Some(generation) {
                jobs.remove(&id);
            }
        });
    }

    /// Cancels the job with this id. Unknown ids are a no-op.
    pub fn remove(&self, id: &str) {
        let mut jobs = self.jobs.lock().expect("scheduler registry lock poisoned");
        if let Some(entry) = jobs.remove(id) {
            cancel_entry(&entry);
            log::debug!("Removed job {:?}", id);
        }
    }

    /// Whether a job with this id is currently registered.
    pub fn contains(&self, id: &str) -> bool {
        self.jobs
            .lock()
            .expect("scheduler registry lock poisoned")
            .contains_key(id)
    }

    /// Schedule shape for a registered id.
    pub fn job_kind(&self, id: &str) -> Option<JobKind> {
        self.jobs
            .lock()
            .expect("scheduler registry lock poisoned")
            .get(id)
            .map(|e| e.kind)
    }

    /// Number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.jobs
            .lock()
            .expect("scheduler registry lock poisoned")
            .len()
    }

    fn register(&self, id: &str, kind: JobKind) -> (Arc<AtomicBool>, Arc<Notify>) {
        let (cancelled, notify, _) = self.register_with_generation(id, kind);
        (cancelled, notify)
    }

    /// Inserts a fresh entry for `id`, cancelling any previous one under the
    /// same registry lock so old and new can never both fire.
    fn register_with_generation(
        &self,
        id: &str,
        kind: JobKind,
    ) -> (Arc<AtomicBool>, Arc<Notify>, u64) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        let mut jobs = self.jobs.lock().expect("scheduler registry lock poisoned");
        if let Some(old) = jobs.insert(
            id.to_string(),
            JobEntry {
                generation,
                kind,
                cancelled: cancelled.clone(),
                notify: notify.clone(),
            },
        ) {
            cancel_entry(&old);
            log::debug!("Replaced job {:?}", id);
        }

        (cancelled, notify, generation)
    }
}

fn cancel_entry(entry: &JobEntry) {
    entry.cancelled.store(true, Ordering::SeqCst);
    entry.notify.notify_one();
}

/// Runs one firing on the blocking pool, bounded by the worker semaphore.
async fn run_action(
    id: &str,
    workers: &Arc<Semaphore>,
    cancelled: &Arc<AtomicBool>,
    action: &JobAction,
) {
    let permit = workers
        .clone()
        .acquire_owned()
        .await
        .expect("worker semaphore closed");
    // A cancel that lands while waiting for a worker still wins.
    if cancelled.load(Ordering::SeqCst) {
        return;
    }
    let action = action.clone();
    let result = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        action();
    })
    .await;
    if let Err(e) = result {
        log::error!("Job {:?} firing panicked: {}", id, e);
    }
}

//! Periodic job scheduler.
//!
//! Each registered job gets its own interval loop. A job never overlaps with
//! itself: a tick or manual trigger that finds the previous invocation still
//! running is skipped. Different jobs run independently. Every invocation is
//! wrapped so that errors and panics end up in [`JobStats`] instead of the
//! scheduler loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::JobError;

/// A unit of periodic work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One invocation. The returned value is kept as the job's last result.
    async fn run(&self) -> Result<Value, JobError>;
}

/// Per-job counters and timestamps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub interval_secs: u64,
    pub runs: u64,
    pub errors: u64,
    pub running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_result: Option<Value>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Read-only view for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: BTreeMap<&'static str, JobStats>,
}

struct JobEntry {
    job: Arc<dyn Job>,
    interval: Duration,
    /// Held for the duration of one invocation
    guard: Arc<tokio::sync::Mutex<()>>,
    stats: RwLock<JobStats>,
}

impl JobEntry {
    fn name(&self) -> &'static str {
        self.job.name()
    }

    /// The run guard, or `None` while an invocation is in flight.
    fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.guard).try_lock_owned().ok()
    }

    /// Run once on a detached task that owns `guard` and the bookkeeping.
    /// Dropping the caller's future leaves the invocation running and the
    /// guard held until it finishes.
    async fn invoke(self: &Arc<Self>, guard: OwnedMutexGuard<()>) -> Result<Value, JobError> {
        let started = Instant::now();
        {
            let mut stats = self.stats.write();
            stats.runs += 1;
            stats.running = true;
            stats.last_run = Some(Utc::now());
        }
        debug!(job = self.name(), "Job started");

        let entry = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guard = guard;
            // Inner task so a panic surfaces as a JoinError
            let job = Arc::clone(&entry.job);
            let span = info_span!("job", job = entry.name());
            let run = async move { job.run().await }.instrument(span);
            let result = match tokio::spawn(run).await {
                Ok(result) => result,
                Err(e) => Err(JobError::Panicked(e.to_string())),
            };
            entry.finish(&result, started.elapsed());
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(JobError::Panicked(e.to_string())),
        }
    }

    fn finish(&self, result: &Result<Value, JobError>, elapsed: Duration) {
        let mut stats = self.stats.write();
        stats.running = false;
        stats.last_finished = Some(Utc::now());
        stats.last_duration_ms = Some(elapsed.as_millis() as u64);
        match result {
            Ok(value) => {
                stats.last_result = Some(value.clone());
                debug!(job = self.name(), duration_ms = elapsed.as_millis(), "Job finished");
            }
            Err(e) => {
                stats.errors += 1;
                stats.last_error = Some(e.to_string());
                error!(job = self.name(), error = %e, "Job failed");
            }
        }
    }

    fn set_next_run(&self, at: DateTime<Utc>) {
        self.stats.write().next_run = Some(at);
    }
}

pub struct Scheduler {
    jobs: RwLock<Vec<Arc<JobEntry>>>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register `job` to run every `interval`. Jobs registered after
    /// [`Scheduler::start`] can only be triggered manually.
    pub fn register(&self, job: Arc<dyn Job>, interval: Duration) {
        info!(job = job.name(), interval_secs = interval.as_secs(), "Job registered");
        let stats = JobStats {
            interval_secs: interval.as_secs(),
            ..Default::default()
        };
        self.jobs.write().push(Arc::new(JobEntry {
            job,
            interval,
            guard: Arc::new(tokio::sync::Mutex::new(())),
            stats: RwLock::new(stats),
        }));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn one interval loop per job. The first tick fires immediately.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        let entries = self.jobs.read().clone();
        let mut handles = self.handles.lock();
        for entry in entries {
            let mut shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(entry.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                entry.set_next_run(Utc::now());

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Some(guard) = entry.try_acquire() {
                                // Errors are already recorded in the stats
                                let _ = entry.invoke(guard).await;
                            } else {
                                debug!(job = entry.name(), "Previous run still in progress, tick skipped");
                            }
                            let next = chrono::Duration::from_std(entry.interval)
                                .map(|d| Utc::now() + d)
                                .unwrap_or_else(|_| Utc::now());
                            entry.set_next_run(next);
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!(job = entry.name(), "Job loop stopped");
            }));
        }
        info!(jobs = handles.len(), "Scheduler started");
    }

    /// Run `name` now through the same wrapper as scheduled runs.
    pub async fn run_now(&self, name: &str) -> Result<Value, JobError> {
        let entry = self
            .jobs
            .read()
            .iter()
            .find(|e| e.name() == name)
            .cloned()
            .ok_or_else(|| JobError::UnknownJob(name.to_string()))?;

        let Some(guard) = entry.try_acquire() else {
            return Err(JobError::AlreadyRunning(entry.name()));
        };
        info!(job = entry.name(), "Manual run");
        entry.invoke(guard).await
    }

    pub fn status(&self) -> SchedulerStatus {
        let jobs = self
            .jobs
            .read()
            .iter()
            .map(|e| (e.name(), e.stats.read().clone()))
            .collect();
        SchedulerStatus {
            running: self.is_running(),
            jobs,
        }
    }

    /// Stop all loops. In-flight invocations finish before this returns.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping scheduler");
        let _ = self.shutdown.send(true);

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Job loop ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

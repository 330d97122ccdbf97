//! Named background jobs with unique-work policies and retry backoff.
//!
//! Each job name maps to at most one live tokio task. Runs of the same name
//! are serialized by a per-name lock that survives `Replace`, so a manual
//! `run_now` and a scheduled run never overlap.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use migraineme_core::sync::{BackoffPolicy, HEALTH_SYNC_INTERVAL_JITTER_SECS};

/// Result of a single job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    /// Run again after the backoff delay.
    Retry(String),
    /// Give up on this run; periodic jobs wait for the next period.
    Failure(String),
}

#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> JobOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Periodic(Duration),
    OneTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingJobPolicy {
    /// Leave an active job with the same name alone.
    Keep,
    /// Cancel the existing job and schedule the new one.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Enqueued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Enqueued | JobState::Running)
    }
}

/// Snapshot of a job for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub name: String,
    pub state: JobState,
    /// Consecutive `Retry` outcomes since the last success or failure.
    pub attempt: u32,
    pub last_run_at: Option<String>,
    pub last_error: Option<String>,
}

/// Description of a job to schedule.
#[derive(Clone)]
pub struct JobSpec {
    pub name: String,
    pub kind: JobKind,
    pub job: Arc<dyn Job>,
    pub initial_delay: Duration,
    pub backoff: BackoffPolicy,
    /// Upper bound of the random delay added to each periodic interval.
    pub max_jitter: Duration,
}

impl JobSpec {
    pub fn periodic(name: &str, interval: Duration, job: Arc<dyn Job>) -> Self {
        Self {
            name: name.to_string(),
            kind: JobKind::Periodic(interval),
            job,
            initial_delay: Duration::ZERO,
            backoff: BackoffPolicy::default(),
            max_jitter: Duration::from_secs(HEALTH_SYNC_INTERVAL_JITTER_SECS),
        }
    }

    pub fn one_time(name: &str, job: Arc<dyn Job>) -> Self {
        Self {
            name: name.to_string(),
            kind: JobKind::OneTime,
            job,
            initial_delay: Duration::ZERO,
            backoff: BackoffPolicy::default(),
            max_jitter: Duration::ZERO,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }
}

struct JobEntry {
    generation: u64,
    job: Arc<dyn Job>,
    run_lock: Arc<Mutex<()>>,
    handle: Option<JoinHandle<()>>,
    status: JobStatus,
}

impl JobEntry {
    /// A task that ended without reaching a terminal state has crashed.
    fn effective_state(&self) -> JobState {
        let finished = self
            .handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true);
        if finished && self.status.state.is_active() {
            JobState::Failed
        } else {
            self.status.state
        }
    }

    fn snapshot(&self) -> JobStatus {
        JobStatus {
            state: self.effective_state(),
            ..self.status.clone()
        }
    }
}

#[derive(Default)]
struct SchedulerInner {
    jobs: HashMap<String, JobEntry>,
    next_generation: u64,
}

/// In-process replacement for the platform job scheduler.
#[derive(Clone, Default)]
pub struct JobScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
}

fn jitter(max_jitter: Duration) -> Duration {
    let bound = max_jitter.as_millis() as u64;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue_periodic(&self, spec: JobSpec, policy: ExistingJobPolicy) -> bool {
        debug_assert!(matches!(spec.kind, JobKind::Periodic(_)));
        self.enqueue(spec, policy).await
    }

    pub async fn enqueue_once(&self, spec: JobSpec, policy: ExistingJobPolicy) -> bool {
        debug_assert!(matches!(spec.kind, JobKind::OneTime));
        self.enqueue(spec, policy).await
    }

    /// Schedules `spec`. Returns `false` when `Keep` left an active job in place.
    pub async fn enqueue(&self, spec: JobSpec, policy: ExistingJobPolicy) -> bool {
        let mut inner = self.inner.lock().await;

        let mut run_lock = Arc::new(Mutex::new(()));
        if let Some(existing) = inner.jobs.get_mut(&spec.name) {
            if policy == ExistingJobPolicy::Keep && existing.effective_state().is_active() {
                debug!("[Scheduler] Keeping active job '{}'", spec.name);
                return false;
            }
            if let Some(handle) = existing.handle.take() {
                handle.abort();
            }
            run_lock = Arc::clone(&existing.run_lock);
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let handle = tokio::spawn(Self::drive(
            self.clone(),
            generation,
            spec.clone(),
            Arc::clone(&run_lock),
        ));

        info!("[Scheduler] Enqueued job '{}' ({:?})", spec.name, spec.kind);
        inner.jobs.insert(
            spec.name.clone(),
            JobEntry {
                generation,
                job: spec.job,
                run_lock,
                handle: Some(handle),
                status: JobStatus {
                    name: spec.name,
                    state: JobState::Enqueued,
                    attempt: 0,
                    last_run_at: None,
                    last_error: None,
                },
            },
        );
        true
    }

    /// Aborts the job's task. Rows a cancelled run did not finish stay queued.
    pub async fn cancel(&self, name: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.jobs.get_mut(name) else {
            return false;
        };
        if let Some(handle) = entry.handle.take() {
            handle.abort();
        }
        entry.status.state = JobState::Cancelled;
        info!("[Scheduler] Cancelled job '{}'", name);
        true
    }

    pub async fn state(&self, name: &str) -> Option<JobState> {
        let inner = self.inner.lock().await;
        inner.jobs.get(name).map(JobEntry::effective_state)
    }

    pub async fn status(&self, name: &str) -> Option<JobStatus> {
        let inner = self.inner.lock().await;
        inner.jobs.get(name).map(JobEntry::snapshot)
    }

    pub async fn statuses(&self) -> Vec<JobStatus> {
        let inner = self.inner.lock().await;
        let mut statuses: Vec<JobStatus> = inner.jobs.values().map(JobEntry::snapshot).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub async fn cancel_all(&self) {
        let names: Vec<String> = {
            let inner = self.inner.lock().await;
            inner.jobs.keys().cloned().collect()
        };
        for name in names {
            self.cancel(&name).await;
        }
    }

    /// Runs a registered job now on the caller's task.
    ///
    /// Returns `None` if the job is unknown or a run of it is already in flight.
    pub async fn run_now(&self, name: &str) -> Option<JobOutcome> {
        let (job, run_lock) = {
            let inner = self.inner.lock().await;
            let entry = inner.jobs.get(name)?;
            (Arc::clone(&entry.job), Arc::clone(&entry.run_lock))
        };

        let Ok(_guard) = run_lock.try_lock() else {
            debug!("[Scheduler] Job '{}' already running; skipping manual run", name);
            return None;
        };
        let outcome = job.run().await;
        self.record_manual_outcome(name, &outcome).await;
        Some(outcome)
    }

    async fn record_manual_outcome(&self, name: &str, outcome: &JobOutcome) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.jobs.get_mut(name) {
            entry.status.last_run_at = Some(Utc::now().to_rfc3339());
            entry.status.last_error = match outcome {
                JobOutcome::Success => None,
                JobOutcome::Retry(reason) | JobOutcome::Failure(reason) => Some(reason.clone()),
            };
        }
    }

    /// Applies `update` only if `generation` still owns the name.
    async fn update_status(
        &self,
        name: &str,
        generation: u64,
        update: impl FnOnce(&mut JobStatus),
    ) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.jobs.get_mut(name) {
            if entry.generation == generation {
                update(&mut entry.status);
            }
        }
    }

    async fn drive(self, generation: u64, spec: JobSpec, run_lock: Arc<Mutex<()>>) {
        let name = spec.name.as_str();
        let mut delay = spec.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let outcome = {
                let _guard = run_lock.lock().await;
                self.update_status(name, generation, |status| {
                    status.state = JobState::Running;
                    status.last_run_at = Some(Utc::now().to_rfc3339());
                })
                .await;
                spec.job.run().await
            };

            let next = match &outcome {
                JobOutcome::Success => {
                    attempt = 0;
                    None
                }
                JobOutcome::Retry(reason) => {
                    attempt += 1;
                    match spec.backoff.delay_for(attempt) {
                        Some(backoff) => {
                            warn!(
                                "[Scheduler] Job '{}' attempt {} will retry in {:?}: {}",
                                name, attempt, backoff, reason
                            );
                            Some(backoff)
                        }
                        None => {
                            warn!(
                                "[Scheduler] Job '{}' gave up after {} attempts: {}",
                                name, attempt, reason
                            );
                            attempt = 0;
                            None
                        }
                    }
                }
                JobOutcome::Failure(reason) => {
                    warn!("[Scheduler] Job '{}' failed: {}", name, reason);
                    attempt = 0;
                    None
                }
            };

            let error = match &outcome {
                JobOutcome::Success => None,
                JobOutcome::Retry(reason) | JobOutcome::Failure(reason) => Some(reason.clone()),
            };

            if let Some(backoff) = next {
                self.update_status(name, generation, |status| {
                    status.state = JobState::Enqueued;
                    status.attempt = attempt;
                    status.last_error = error;
                })
                .await;
                delay = backoff;
                continue;
            }

            match spec.kind {
                JobKind::Periodic(interval) => {
                    self.update_status(name, generation, |status| {
                        status.state = JobState::Enqueued;
                        status.attempt = 0;
                        status.last_error = error;
                    })
                    .await;
                    delay = interval + jitter(spec.max_jitter);
                }
                JobKind::OneTime => {
                    let terminal = if outcome == JobOutcome::Success {
                        JobState::Succeeded
                    } else {
                        JobState::Failed
                    };
                    self.update_status(name, generation, |status| {
                        status.state = terminal;
                        status.attempt = 0;
                        status.last_error = error;
                    })
                    .await;
                    return;
                }
            }
        }
    }
}

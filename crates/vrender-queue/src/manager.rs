//! Job queue manager.
//!
//! Owns the scheduling loop: picks dispatchable pending jobs by priority,
//! runs at most `max_concurrent` of them as independent tokio tasks and
//! drives each job through its state machine when the attempt finishes.
//! Every status transition happens under the scheduler lock.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tracing::{debug, error, info, warn};
use vrender_models::{JobId, JobStatus, ProgressUpdate};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::handler::{JobContext, JobFailure, JobHandler};
use crate::job::{FailureOutcome, Job, JobOutput};
use crate::metrics;
use crate::progress::{JobEvent, ProgressHub};
use crate::store::JobStore;

/// Point-in-time queue statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub paused: bool,
    /// completed / (completed + failed), 0 when nothing finished
    pub success_rate: f64,
    pub avg_processing_ms: f64,
    /// Jobs completed during the last hour
    pub throughput_per_hour: f64,
}

struct InFlight {
    cancel: watch::Sender<bool>,
    started: Instant,
}

#[derive(Default)]
struct SchedulerState {
    in_flight: HashMap<JobId, InFlight>,
    paused: bool,
}

struct Inner {
    config: QueueConfig,
    store: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    hub: Arc<ProgressHub>,
    state: Mutex<SchedulerState>,
    wake: Notify,
    shutdown: watch::Sender<bool>,
    sequence: AtomicU64,
}

/// Bounded-concurrency job scheduler.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

impl QueueManager {
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn JobStore>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let hub = Arc::new(ProgressHub::new(
            config.progress_capacity,
            config.event_capacity,
        ));
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                handler,
                hub,
                state: Mutex::new(SchedulerState::default()),
                wake: Notify::new(),
                shutdown,
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn progress_hub(&self) -> Arc<ProgressHub> {
        Arc::clone(&self.inner.hub)
    }

    /// Enqueue a job in `pending`.
    ///
    /// A job without its own attempt budget takes the configured one. Jobs
    /// that are not pending or have no attempts left are rejected, since
    /// the scheduler could never start them.
    pub async fn submit(&self, mut job: Job) -> QueueResult<JobId> {
        if self.is_shutting_down() {
            return Err(QueueError::ShuttingDown);
        }
        if job.status != JobStatus::Pending {
            return Err(QueueError::invalid_job(format!(
                "job {} is {}, only pending jobs can be submitted",
                job.id, job.status
            )));
        }
        let budget = job
            .max_attempts
            .unwrap_or(self.inner.config.max_attempts)
            .max(1);
        job.max_attempts = Some(budget);
        if !job.has_attempts_left() {
            return Err(QueueError::invalid_job(format!(
                "job {} already used {} of {} attempts",
                job.id, job.attempts, budget
            )));
        }
        job.sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);

        self.inner.store.save(&job).await?;
        self.inner.hub.open(&job.id);

        info!(job_id = %job.id, kind = %job.kind, priority = job.priority, "Job submitted");
        metrics::record_submitted(job.kind);
        self.inner.hub.emit(JobEvent::Added {
            job_id: job.id.clone(),
            kind: job.kind,
            priority: job.priority,
        });
        self.inner.wake.notify_one();

        Ok(job.id)
    }

    /// Current snapshot of a job, with live progress while it runs.
    pub async fn status(&self, id: &JobId) -> QueueResult<Job> {
        let mut job = self
            .inner
            .store
            .load(id)
            .await?
            .ok_or_else(|| QueueError::not_found(id))?;

        if job.status == JobStatus::Processing {
            if let Some(latest) = self.inner.hub.latest(id) {
                job.progress = latest.percent;
                job.stage = Some(latest.stage);
            }
        }
        Ok(job)
    }

    /// Cancel a job.
    ///
    /// Returns `true` when a pending job was moved to `failed`. For a
    /// processing job the cancel signal is sent and `false` is returned;
    /// the attempt ends as `failed` only if the handler honours the signal.
    pub async fn cancel(&self, id: &JobId) -> QueueResult<bool> {
        let state = self.inner.state.lock().await;
        let mut job = self
            .inner
            .store
            .load(id)
            .await?
            .ok_or_else(|| QueueError::not_found(id))?;

        match job.status {
            JobStatus::Pending => {
                job.cancel()?;
                self.inner.store.save(&job).await?;
                drop(state);

                info!(job_id = %id, "Pending job cancelled");
                metrics::record_cancelled(job.kind);
                self.inner.hub.emit(JobEvent::Cancelled { job_id: id.clone() });
                self.inner.hub.close(id);
                Ok(true)
            }
            JobStatus::Processing => {
                if let Some(flight) = state.in_flight.get(id) {
                    debug!(job_id = %id, "Signalling cancellation to running job");
                    let _ = flight.cancel.send(true);
                }
                Ok(false)
            }
            JobStatus::Completed | JobStatus::Failed => Ok(false),
        }
    }

    /// Stop dispatching new jobs. Running jobs continue.
    pub async fn pause(&self) {
        self.inner.state.lock().await.paused = true;
        info!("Queue paused");
    }

    pub async fn resume(&self) {
        self.inner.state.lock().await.paused = false;
        info!("Queue resumed");
        self.inner.wake.notify_one();
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.state.lock().await.paused
    }

    pub async fn stats(&self) -> QueueResult<QueueStats> {
        let (in_flight, paused) = {
            let state = self.inner.state.lock().await;
            (state.in_flight.len(), state.paused)
        };
        let jobs = self.inner.store.list().await?;
        let hour_ago = Utc::now() - chrono::Duration::hours(1);

        let mut stats = QueueStats {
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            in_flight,
            paused,
            success_rate: 0.0,
            avg_processing_ms: 0.0,
            throughput_per_hour: 0.0,
        };
        let mut total_ms = 0i64;
        let mut timed = 0usize;

        for job in &jobs {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Completed => {
                    stats.completed += 1;
                    if let Some(ms) = job.processing_time_ms() {
                        total_ms += ms;
                        timed += 1;
                    }
                    if job.finished_at.is_some_and(|at| at >= hour_ago) {
                        stats.throughput_per_hour += 1.0;
                    }
                }
            }
        }

        let finished = stats.completed + stats.failed;
        if finished > 0 {
            stats.success_rate = stats.completed as f64 / finished as f64;
        }
        if timed > 0 {
            stats.avg_processing_ms = total_ms as f64 / timed as f64;
        }
        Ok(stats)
    }

    /// Delete terminal jobs that finished at least `older_than` ago.
    pub async fn cleanup(&self, older_than: Duration) -> QueueResult<usize> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| QueueError::store(format!("invalid cleanup age: {e}")))?;
        let cutoff = Utc::now() - age;

        let mut removed = 0;
        for job in self.inner.store.list().await? {
            let finished = job.finished_at.unwrap_or(job.updated_at);
            if job.is_terminal() && finished <= cutoff && self.inner.store.delete(&job.id).await? {
                self.inner.hub.close(&job.id);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Cleaned up finished jobs");
        }
        Ok(removed)
    }

    pub fn subscribe_progress(&self, id: &JobId) -> broadcast::Receiver<ProgressUpdate> {
        self.inner.hub.subscribe(id)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.hub.subscribe_events()
    }

    /// Ask `run` to stop dispatching and return once in-flight jobs drain.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
        self.inner.wake.notify_one();
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Run the scheduler until `shutdown` is called.
    pub async fn run(&self) -> QueueResult<()> {
        info!(
            max_concurrent = self.inner.config.max_concurrent,
            "Starting queue manager"
        );
        let mut shutdown_rx = self.inner.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping dispatch");
                break;
            }

            if let Err(e) = self.inner.dispatch_ready().await {
                error!("Error dispatching jobs: {}", e);
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = self.inner.wake.notified() => {}
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {}
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.inner.config.shutdown_grace, self.wait_for_in_flight())
            .await
            .is_err()
        {
            warn!("Shutdown grace period elapsed with jobs still running");
        }

        info!("Queue manager stopped");
        Ok(())
    }

    /// Run the scheduler until nothing is pending and nothing is in flight.
    ///
    /// Returns early when the queue is paused with nothing running, or when
    /// shutdown was requested and in-flight jobs have drained.
    pub async fn run_until_idle(&self) -> QueueResult<()> {
        loop {
            self.inner.dispatch_ready().await?;

            let (in_flight, paused) = {
                let state = self.inner.state.lock().await;
                (state.in_flight.len(), state.paused)
            };
            if in_flight == 0 {
                if paused || self.is_shutting_down() {
                    return Ok(());
                }
                if self.inner.store.list_pending().await?.is_empty() {
                    return Ok(());
                }
            }

            tokio::select! {
                _ = self.inner.wake.notified() => {}
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {}
            }
        }
    }

    async fn wait_for_in_flight(&self) {
        loop {
            if self.inner.state.lock().await.in_flight.is_empty() {
                return;
            }
            tokio::select! {
                _ = self.inner.wake.notified() => {}
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {}
            }
        }
    }
}

impl Inner {
    /// Start as many dispatchable jobs as there are free slots.
    async fn dispatch_ready(self: &Arc<Self>) -> QueueResult<usize> {
        let mut state = self.state.lock().await;
        if state.paused || *self.shutdown.borrow() {
            return Ok(0);
        }

        let free = self.config.max_concurrent.saturating_sub(state.in_flight.len());
        if free == 0 {
            return Ok(0);
        }

        let now = Utc::now();
        let mut ready: Vec<Job> = self
            .store
            .list_pending()
            .await?
            .into_iter()
            .filter(|job| job.is_dispatchable(now))
            .collect();
        ready.sort_by(Job::dispatch_order);

        let mut started = 0;
        for mut job in ready.into_iter().take(free) {
            if let Err(e) = job.start() {
                warn!(job_id = %job.id, "Skipping job: {}", e);
                continue;
            }
            // A fresh attempt starts from zero progress.
            self.hub.open(&job.id);
            self.hub.reset(&job.id);
            self.store.save(&job).await?;

            let (cancel_tx, cancel_rx) = watch::channel(false);
            state.in_flight.insert(
                job.id.clone(),
                InFlight {
                    cancel: cancel_tx,
                    started: Instant::now(),
                },
            );

            info!(job_id = %job.id, attempt = job.attempts, max_attempts = job.attempt_budget(), "Dispatching job");
            self.hub.emit(JobEvent::Processing {
                job_id: job.id.clone(),
                attempt: job.attempts,
            });

            tokio::spawn(Self::execute(Arc::clone(self), job, cancel_rx));
            started += 1;
        }

        metrics::set_in_flight(state.in_flight.len());
        Ok(started)
    }

    async fn execute(self: Arc<Self>, job: Job, cancel_rx: watch::Receiver<bool>) {
        let ctx = JobContext::new(
            job.id.clone(),
            job.attempts,
            self.hub.reporter(job.id.clone()),
            cancel_rx,
        );
        let handler = Arc::clone(&self.handler);
        let attempt_job = job.clone();
        let mut task = tokio::spawn(async move { handler.handle(&attempt_job, ctx).await });

        let joined = match self.config.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(job_id = %job.id, timeout_secs = limit.as_secs_f64(), "Job timed out");
                    task.abort();
                    Ok(Err(JobFailure::timeout()))
                }
            },
            None => task.await,
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                error!(job_id = %job.id, "Job handler panicked");
                Err(JobFailure::retryable("handler panicked"))
            }
            Err(_) => Err(JobFailure::cancelled()),
        };

        self.finalize(&job.id, result).await;
        self.wake.notify_one();
    }

    async fn finalize(self: &Arc<Self>, id: &JobId, result: Result<JobOutput, JobFailure>) {
        let mut state = self.state.lock().await;
        let elapsed = state
            .in_flight
            .remove(id)
            .map(|flight| flight.started.elapsed())
            .unwrap_or_default();
        metrics::set_in_flight(state.in_flight.len());

        let mut job = match self.store.load(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %id, "Finished job no longer in store");
                return;
            }
            Err(e) => {
                error!(job_id = %id, "Failed to load finished job: {}", e);
                return;
            }
        };
        if let Some(latest) = self.hub.latest(id) {
            job.progress = latest.percent;
            job.stage = Some(latest.stage);
        }

        let mut terminal = true;
        match result {
            Ok(output) => {
                if let Err(e) = job.complete(output) {
                    error!(job_id = %id, "Cannot complete job: {}", e);
                    return;
                }
                info!(job_id = %id, elapsed_ms = elapsed.as_millis() as u64, "Job completed");
                metrics::record_completed(job.kind, elapsed.as_secs_f64());
                self.hub.emit(JobEvent::Completed { job_id: id.clone() });
            }
            Err(failure) => {
                let delay = self.config.retry.delay_for_attempt(job.attempts);
                let retry_at = if delay.is_zero() {
                    None
                } else {
                    chrono::Duration::from_std(delay).ok().map(|d| Utc::now() + d)
                };

                match job.fail(failure.message.clone(), failure.retryable, retry_at) {
                    Ok(FailureOutcome::Retry) => {
                        terminal = false;
                        warn!(
                            job_id = %id,
                            attempt = job.attempts,
                            max_attempts = job.attempt_budget(),
                            delay_ms = delay.as_millis() as u64,
                            "Job attempt failed, will retry: {}",
                            failure
                        );
                        metrics::record_retried(job.kind);
                        self.hub.emit(JobEvent::Retrying {
                            job_id: id.clone(),
                            attempt: job.attempts,
                            error: failure.message.clone(),
                            delay_ms: delay.as_millis() as u64,
                        });
                        if !delay.is_zero() {
                            let inner = Arc::clone(self);
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                inner.wake.notify_one();
                            });
                        }
                    }
                    Ok(FailureOutcome::Failed) if failure.cancelled => {
                        info!(job_id = %id, "Job cancelled while processing");
                        metrics::record_cancelled(job.kind);
                        self.hub.emit(JobEvent::Cancelled { job_id: id.clone() });
                    }
                    Ok(FailureOutcome::Failed) => {
                        error!(job_id = %id, attempts = job.attempts, "Job failed: {}", failure);
                        metrics::record_failed(job.kind);
                        self.hub.emit(JobEvent::Failed {
                            job_id: id.clone(),
                            error: failure.message.clone(),
                        });
                    }
                    Err(e) => {
                        error!(job_id = %id, "Cannot record failure: {}", e);
                        return;
                    }
                }
            }
        }

        if let Err(e) = self.store.save(&job).await {
            error!(job_id = %id, "Failed to persist job: {}", e);
        }
        drop(state);

        if terminal {
            self.hub.close(id);
        }
    }
}

//! Per-job progress channels and queue lifecycle events.
//!
//! Running jobs push updates through a [`ProgressReporter`]; callers subscribe
//! per job id on the [`ProgressHub`] and get a typed broadcast receiver.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::trace;
use vrender_models::{JobId, JobKind, ProgressUpdate};

/// Queue lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Added {
        job_id: JobId,
        kind: JobKind,
        priority: i32,
    },
    Processing {
        job_id: JobId,
        attempt: u32,
    },
    Progress(ProgressUpdate),
    Completed {
        job_id: JobId,
    },
    Retrying {
        job_id: JobId,
        attempt: u32,
        error: String,
        delay_ms: u64,
    },
    Failed {
        job_id: JobId,
        error: String,
    },
    Cancelled {
        job_id: JobId,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Added { job_id, .. }
            | JobEvent::Processing { job_id, .. }
            | JobEvent::Completed { job_id }
            | JobEvent::Retrying { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id } => job_id,
            JobEvent::Progress(update) => &update.job_id,
        }
    }
}

#[derive(Default)]
struct HubState {
    channels: HashMap<JobId, broadcast::Sender<ProgressUpdate>>,
    latest: HashMap<JobId, ProgressUpdate>,
}

/// Fan-out point for progress updates and lifecycle events.
pub struct ProgressHub {
    state: Mutex<HubState>,
    events: broadcast::Sender<JobEvent>,
    channel_capacity: usize,
}

impl ProgressHub {
    pub fn new(channel_capacity: usize, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Mutex::new(HubState::default()),
            events,
            channel_capacity: channel_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // State stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start tracking a job. Idempotent.
    pub fn open(&self, job_id: &JobId) {
        let capacity = self.channel_capacity;
        self.lock()
            .channels
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(capacity).0);
    }

    /// Receive progress updates for one job.
    ///
    /// For a job that is not tracked (unknown or already finished) the
    /// receiver is closed from the start.
    pub fn subscribe(&self, job_id: &JobId) -> broadcast::Receiver<ProgressUpdate> {
        match self.lock().channels.get(job_id) {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub fn is_tracked(&self, job_id: &JobId) -> bool {
        self.lock().channels.contains_key(job_id)
    }

    /// Receive every lifecycle event.
    pub fn subscribe_events(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, update: ProgressUpdate) {
        {
            let mut state = self.lock();
            let Some(tx) = state.channels.get(&update.job_id) else {
                trace!(job_id = %update.job_id, "Dropping progress for untracked job");
                return;
            };
            // No receivers is fine.
            let _ = tx.send(update.clone());
            state.latest.insert(update.job_id.clone(), update.clone());
        }
        trace!(job_id = %update.job_id, percent = update.percent, stage = %update.stage, "Progress");
        self.emit(JobEvent::Progress(update));
    }

    pub fn emit(&self, event: JobEvent) {
        let _ = self.events.send(event);
    }

    /// Most recent update for a job still being tracked.
    pub fn latest(&self, job_id: &JobId) -> Option<ProgressUpdate> {
        self.lock().latest.get(job_id).cloned()
    }

    /// Forget the latest update, keeping subscribers attached.
    pub fn reset(&self, job_id: &JobId) {
        self.lock().latest.remove(job_id);
    }

    /// Stop tracking a job. Subscribers see the channel close.
    pub fn close(&self, job_id: &JobId) {
        let mut state = self.lock();
        state.channels.remove(job_id);
        state.latest.remove(job_id);
    }

    pub fn reporter(self: &Arc<Self>, job_id: JobId) -> ProgressReporter {
        ProgressReporter {
            job_id,
            hub: Arc::clone(self),
        }
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(64, 256)
    }
}

/// Handle a running job uses to publish progress.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    hub: Arc<ProgressHub>,
}

impl ProgressReporter {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Publish `percent` (clamped to 0-100) with a human-readable stage.
    pub fn report(&self, percent: f64, stage: impl Into<String>) {
        self.hub
            .publish(ProgressUpdate::new(self.job_id.clone(), percent, stage));
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_updates_for_their_job() {
        let hub = Arc::new(ProgressHub::default());
        let a = JobId::from_string("a");
        let b = JobId::from_string("b");

        hub.open(&a);
        hub.open(&b);
        let mut rx_a = hub.subscribe(&a);
        let mut rx_b = hub.subscribe(&b);

        hub.reporter(a.clone()).report(25.0, "encoding");
        hub.reporter(b.clone()).report(150.0, "encoding");

        let update = rx_a.recv().await.unwrap();
        assert_eq!(update.job_id, a);
        assert_eq!(update.percent, 25.0);

        let update = rx_b.recv().await.unwrap();
        assert_eq!(update.percent, 100.0);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_ends_subscription() {
        let hub = Arc::new(ProgressHub::default());
        let id = JobId::from_string("done");
        hub.open(&id);
        let mut rx = hub.subscribe(&id);

        hub.reporter(id.clone()).report(10.0, "compiling");
        assert!(hub.latest(&id).is_some());
        hub.close(&id);

        assert!(rx.recv().await.is_ok());
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(hub.latest(&id).is_none());
    }

    #[tokio::test]
    async fn test_untracked_jobs_get_closed_receivers() {
        let hub = Arc::new(ProgressHub::default());
        let id = JobId::from_string("ghost");

        let mut rx = hub.subscribe(&id);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(!hub.is_tracked(&id));

        hub.reporter(id.clone()).report(40.0, "encoding");
        assert!(hub.latest(&id).is_none());
    }

    #[test]
    fn test_reset_clears_latest() {
        let hub = Arc::new(ProgressHub::default());
        let id = JobId::from_string("retry");
        hub.open(&id);

        hub.reporter(id.clone()).report(50.0, "encoding");
        hub.reset(&id);
        assert!(hub.latest(&id).is_none());
        assert!(hub.is_tracked(&id));
    }

    #[tokio::test]
    async fn test_progress_is_mirrored_as_event() {
        let hub = Arc::new(ProgressHub::default());
        let mut events = hub.subscribe_events();
        let id = JobId::from_string("x");
        hub.open(&id);

        hub.reporter(id.clone()).report(50.0, "encoding");
        match events.recv().await.unwrap() {
            JobEvent::Progress(update) => assert_eq!(update.job_id, id),
            other => panic!("unexpected event {other:?}"),
        }
    }
}

//! Persistence boundary for jobs and timelines.
//!
//! The queue only ever talks to these traits, so a durable backend can be
//! swapped in without touching scheduling. The in-memory stores are the
//! default.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use vrender_models::{JobId, JobStatus, Timeline};

use crate::error::QueueResult;
use crate::job::Job;

/// Storage for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a job.
    async fn save(&self, job: &Job) -> QueueResult<()>;

    async fn load(&self, id: &JobId) -> QueueResult<Option<Job>>;

    /// Remove a job, returning whether it existed.
    async fn delete(&self, id: &JobId) -> QueueResult<bool>;

    /// Every job currently in `pending`, in no particular order.
    async fn list_pending(&self) -> QueueResult<Vec<Job>>;

    async fn list(&self) -> QueueResult<Vec<Job>>;
}

/// Storage for timelines referenced by id.
#[async_trait]
pub trait TimelineStore: Send + Sync {
    async fn save_timeline(&self, id: &str, timeline: &Timeline) -> QueueResult<()>;

    async fn load_timeline(&self, id: &str) -> QueueResult<Option<Timeline>>;
}

/// Job store backed by a map.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &Job) -> QueueResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load(&self, id: &JobId) -> QueueResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &JobId) -> QueueResult<bool> {
        Ok(self.jobs.write().await.remove(id).is_some())
    }

    async fn list_pending(&self) -> QueueResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect())
    }

    async fn list(&self) -> QueueResult<Vec<Job>> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }
}

/// Timeline store backed by a map.
#[derive(Default)]
pub struct InMemoryTimelineStore {
    timelines: RwLock<HashMap<String, Timeline>>,
}

impl InMemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimelineStore for InMemoryTimelineStore {
    async fn save_timeline(&self, id: &str, timeline: &Timeline) -> QueueResult<()> {
        self.timelines
            .write()
            .await
            .insert(id.to_string(), timeline.clone());
        Ok(())
    }

    async fn load_timeline(&self, id: &str) -> QueueResult<Option<Timeline>> {
        Ok(self.timelines.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AncillaryTask, Job};
    use vrender_models::TimelineSettings;

    fn job() -> Job {
        Job::ancillary(AncillaryTask::Thumbnail {
            video_url: "file:///out.mp4".to_string(),
            at_secs: 1.0,
        })
    }

    #[tokio::test]
    async fn test_job_store_roundtrip() {
        let store = InMemoryJobStore::new();
        let mut a = job();
        let b = job();
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();
        assert_eq!(store.len().await, 2);

        a.start().unwrap();
        store.save(&a).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        assert_eq!(store.load(&a.id).await.unwrap().unwrap().attempts, 1);
        assert!(store.delete(&a.id).await.unwrap());
        assert!(!store.delete(&a.id).await.unwrap());
        assert!(store.load(&a.id).await.unwrap().is_none());
    }

    #[test]
    fn test_timeline_store() {
        tokio_test::block_on(async {
            let store = InMemoryTimelineStore::new();
            let timeline = Timeline::new(vec![], TimelineSettings::default());
            store.save_timeline("project-1", &timeline).await.unwrap();

            assert_eq!(
                store.load_timeline("project-1").await.unwrap(),
                Some(timeline)
            );
            assert!(store.load_timeline("missing").await.unwrap().is_none());
        });
    }
}

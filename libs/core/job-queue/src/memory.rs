//! In-process queue store for tests and single-process deployments.

use crate::error::{QueueError, QueueResult};
use crate::job::{JobId, JobStatus, NewJob, QueueCounts, StoredJob};
use crate::store::{QueueStore, Retention};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    next_id: JobId,
    jobs: HashMap<JobId, StoredJob>,
    /// Ordered by `(ready_at_ms, id)`
    waiting: BTreeSet<(i64, JobId)>,
    /// Claimed id to lease deadline
    active: HashMap<JobId, i64>,
    /// Oldest first
    completed: VecDeque<JobId>,
    failed: VecDeque<JobId>,
    paused: bool,
}

impl State {
    fn take_active(&mut self, id: JobId) -> QueueResult<&mut StoredJob> {
        if self.active.remove(&id).is_none() {
            return Err(QueueError::NotFound(id));
        }
        self.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))
    }

    fn prune(jobs: &mut HashMap<JobId, StoredJob>, list: &mut VecDeque<JobId>, keep: usize) {
        while list.len() > keep {
            if let Some(id) = list.pop_front() {
                jobs.remove(&id);
            }
        }
    }
}

pub struct MemoryQueueStore {
    name: String,
    retention: Retention,
    state: Mutex<State>,
}

impl MemoryQueueStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_retention(name, Retention::default())
    }

    pub fn with_retention(name: impl Into<String>, retention: Retention) -> Self {
        Self {
            name: name.into(),
            retention,
            state: Mutex::new(State::default()),
        }
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, job: NewJob) -> QueueResult<JobId> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        let stored = job.into_stored(id);
        state.waiting.insert((stored.ready_at_ms, id));
        state.jobs.insert(id, stored);
        Ok(id)
    }

    async fn claim(&self, now_ms: i64, lease_until_ms: i64) -> QueueResult<Option<StoredJob>> {
        let mut state = self.state.lock().await;
        if state.paused {
            return Ok(None);
        }

        let next = match state.waiting.first() {
            Some(&(ready_at, id)) if ready_at <= now_ms => (ready_at, id),
            _ => return Ok(None),
        };
        state.waiting.remove(&next);
        state.active.insert(next.1, lease_until_ms);

        let job = state
            .jobs
            .get_mut(&next.1)
            .ok_or(QueueError::NotFound(next.1))?;
        job.status = JobStatus::Active;
        Ok(Some(job.clone()))
    }

    async fn reclaim_stalled(
        &self,
        now_ms: i64,
        lease_until_ms: i64,
        limit: usize,
    ) -> QueueResult<Vec<StoredJob>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut expired: Vec<(i64, JobId)> = state
            .active
            .iter()
            .filter(|(_, deadline)| **deadline <= now_ms)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        expired.sort_unstable();
        expired.truncate(limit);

        let mut reclaimed = Vec::with_capacity(expired.len());
        for (_, id) in expired {
            state.active.insert(id, lease_until_ms);
            if let Some(job) = state.jobs.get(&id) {
                reclaimed.push(job.clone());
            }
        }
        Ok(reclaimed)
    }

    async fn complete(&self, id: JobId, finished_at_ms: i64) -> QueueResult<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let job = state.take_active(id)?;
        job.status = JobStatus::Completed;
        job.finished_at_ms = Some(finished_at_ms);
        state.completed.push_back(id);
        State::prune(&mut state.jobs, &mut state.completed, self.retention.keep_completed);
        Ok(())
    }

    async fn retry_later(
        &self,
        id: JobId,
        attempts_made: u32,
        error: &str,
        ready_at_ms: i64,
    ) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let job = state.take_active(id)?;
        job.status = JobStatus::Waiting;
        job.attempts_made = attempts_made;
        job.last_error = Some(error.to_string());
        job.ready_at_ms = ready_at_ms;
        state.waiting.insert((ready_at_ms, id));
        Ok(())
    }

    async fn fail(
        &self,
        id: JobId,
        attempts_made: u32,
        error: &str,
        finished_at_ms: i64,
    ) -> QueueResult<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let job = state.take_active(id)?;
        job.status = JobStatus::Failed;
        job.attempts_made = attempts_made;
        job.last_error = Some(error.to_string());
        job.finished_at_ms = Some(finished_at_ms);
        state.failed.push_back(id);
        State::prune(&mut state.jobs, &mut state.failed, self.retention.keep_failed);
        Ok(())
    }

    async fn counts(&self, now_ms: i64) -> QueueResult<QueueCounts> {
        let state = self.state.lock().await;
        let waiting = state
            .waiting
            .iter()
            .take_while(|(ready_at, _)| *ready_at <= now_ms)
            .count() as u64;

        Ok(QueueCounts {
            waiting,
            delayed: state.waiting.len() as u64 - waiting,
            active: state.active.len() as u64,
            completed: state.completed.len() as u64,
            failed: state.failed.len() as u64,
        })
    }

    async fn set_paused(&self, paused: bool) -> QueueResult<()> {
        self.state.lock().await.paused = paused;
        Ok(())
    }

    async fn is_paused(&self) -> QueueResult<bool> {
        Ok(self.state.lock().await.paused)
    }

    async fn drain(&self) -> QueueResult<u64> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let drained = std::mem::take(&mut state.waiting);
        for (_, id) in &drained {
            state.jobs.remove(id);
        }
        Ok(drained.len() as u64)
    }

    async fn retry_failed(&self, now_ms: i64) -> QueueResult<u64> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let failed = std::mem::take(&mut state.failed);
        let mut retried = 0;

        for id in failed {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.status = JobStatus::Waiting;
                job.attempts_made = 0;
                job.last_error = None;
                job.finished_at_ms = None;
                job.ready_at_ms = now_ms;
                state.waiting.insert((now_ms, id));
                retried += 1;
            }
        }
        Ok(retried)
    }

    async fn failed(&self, limit: usize) -> QueueResult<Vec<StoredJob>> {
        let state = self.state.lock().await;
        Ok(state
            .failed
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.jobs.get(id).cloned())
            .collect())
    }

    async fn get(&self, id: JobId) -> QueueResult<Option<StoredJob>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOptions;

    const LEASE: i64 = 60_000;

    fn new_job(ready_at_ms: i64) -> NewJob {
        NewJob {
            kind: "test".to_string(),
            payload: serde_json::json!({}),
            options: JobOptions::default(),
            enqueued_at_ms: 0,
            ready_at_ms,
        }
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let store = MemoryQueueStore::new("test");
        let a = store.insert(new_job(0)).await.unwrap();
        let b = store.insert(new_job(0)).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_claim_orders_by_ready_time_then_id() {
        let store = MemoryQueueStore::new("test");
        let late = store.insert(new_job(50)).await.unwrap();
        let first = store.insert(new_job(10)).await.unwrap();
        let second = store.insert(new_job(10)).await.unwrap();

        assert_eq!(store.claim(100, LEASE).await.unwrap().unwrap().id, first);
        assert_eq!(store.claim(100, LEASE).await.unwrap().unwrap().id, second);
        assert_eq!(store.claim(100, LEASE).await.unwrap().unwrap().id, late);
        assert!(store.claim(100, LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_skips_jobs_not_ready() {
        let store = MemoryQueueStore::new("test");
        store.insert(new_job(1_000)).await.unwrap();
        assert!(store.claim(999, LEASE).await.unwrap().is_none());
        assert!(store.claim(1_000, LEASE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_paused_store_claims_nothing() {
        let store = MemoryQueueStore::new("test");
        store.insert(new_job(0)).await.unwrap();
        store.set_paused(true).await.unwrap();
        assert!(store.claim(10, LEASE).await.unwrap().is_none());
        store.set_paused(false).await.unwrap();
        assert!(store.claim(10, LEASE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retention_prunes_oldest_completed() {
        let store = MemoryQueueStore::with_retention(
            "test",
            Retention {
                keep_completed: 2,
                keep_failed: 1,
            },
        );
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.insert(new_job(0)).await.unwrap());
        }
        for id in &ids {
            store.claim(0, LEASE).await.unwrap();
            store.complete(*id, 1).await.unwrap();
        }

        assert_eq!(store.counts(0).await.unwrap().completed, 2);
        assert!(store.get(ids[0]).await.unwrap().is_none());
        assert!(store.get(ids[2]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_complete_requires_active_job() {
        let store = MemoryQueueStore::new("test");
        let id = store.insert(new_job(0)).await.unwrap();
        let err = store.complete(id, 1).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(found) if found == id));
    }

    #[tokio::test]
    async fn test_claim_marks_record_active() {
        let store = MemoryQueueStore::new("test");
        let id = store.insert(new_job(0)).await.unwrap();
        let claimed = store.claim(0, LEASE).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Active);
        assert_eq!(store.get(id).await.unwrap().unwrap().status, JobStatus::Active);
    }

    #[tokio::test]
    async fn test_reclaim_only_expired_leases() {
        let store = MemoryQueueStore::new("test");
        let early = store.insert(new_job(0)).await.unwrap();
        let late = store.insert(new_job(0)).await.unwrap();
        store.claim(0, 100).await.unwrap();
        store.claim(0, 500).await.unwrap();

        assert!(store.reclaim_stalled(99, 1_000, 10).await.unwrap().is_empty());

        let reclaimed = store.reclaim_stalled(100, 1_100, 10).await.unwrap();
        assert_eq!(reclaimed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![early]);

        // The fresh lease hides it from the next sweep
        let reclaimed = store.reclaim_stalled(500, 1_500, 10).await.unwrap();
        assert_eq!(reclaimed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![late]);
        assert_eq!(store.counts(500).await.unwrap().active, 2);
    }

    #[tokio::test]
    async fn test_reclaim_respects_limit() {
        let store = MemoryQueueStore::new("test");
        for _ in 0..3 {
            store.insert(new_job(0)).await.unwrap();
            store.claim(0, 10).await.unwrap();
        }
        assert_eq!(store.reclaim_stalled(10, 100, 2).await.unwrap().len(), 2);
        assert_eq!(store.reclaim_stalled(10, 100, 2).await.unwrap().len(), 1);
    }
}

//! In-memory job store for tests
//!
//! Records the full sequence of states each job passes through so tests can
//! assert status and counter monotonicity over the observed history.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{JobStoreError, JobStoreResult};
use crate::models::{IngestionJob, JobFilter, JobPage, JobPatch};
use crate::traits::{JobStore, MAX_PAGE_SIZE};

/// In-memory [`JobStore`] double with transition history
#[derive(Default)]
pub struct MockJobStore {
    jobs: Mutex<HashMap<Uuid, IngestionJob>>,
    history: Mutex<HashMap<Uuid, Vec<IngestionJob>>>,
    fail_updates: AtomicBool,
}

impl MockJobStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `update_job` fail, to exercise the
    /// orchestrator's best-effort handling of mid-pipeline storage errors
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Snapshots of the job after creation and after every applied update,
    /// in order
    pub fn history(&self, job_id: &Uuid) -> Vec<IngestionJob> {
        self.history
            .lock()
            .map(|h| h.get(job_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn record(&self, job: &IngestionJob) {
        if let Ok(mut history) = self.history.lock() {
            history.entry(job.job_id).or_default().push(job.clone());
        }
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn create_job(&self, job: &IngestionJob) -> JobStoreResult<()> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|e| JobStoreError::Pool(e.to_string()))?;
        if jobs.contains_key(&job.job_id) {
            return Err(JobStoreError::Conflict { job_id: job.job_id });
        }
        jobs.insert(job.job_id, job.clone());
        drop(jobs);
        self.record(job);
        Ok(())
    }

    async fn get_job(&self, job_id: &Uuid) -> JobStoreResult<Option<IngestionJob>> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|e| JobStoreError::Pool(e.to_string()))?;
        Ok(jobs.get(job_id).cloned())
    }

    async fn update_job(
        &self,
        job_id: &Uuid,
        patch: JobPatch,
    ) -> JobStoreResult<Option<IngestionJob>> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(JobStoreError::Pool("simulated storage failure".to_string()));
        }
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|e| JobStoreError::Pool(e.to_string()))?;
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(None);
        };
        job.apply(&patch);
        let updated = job.clone();
        drop(jobs);
        self.record(&updated);
        Ok(Some(updated))
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: u32,
        page_size: u32,
    ) -> JobStoreResult<JobPage> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|e| JobStoreError::Pool(e.to_string()))?;
        let mut matching: Vec<IngestionJob> = jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        drop(jobs);

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;

        let page_size = page_size.clamp(1, MAX_PAGE_SIZE) as usize;
        let offset = (page.max(1) as usize - 1) * page_size;
        let jobs = matching.into_iter().skip(offset).take(page_size).collect();

        Ok(JobPage { jobs, total })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

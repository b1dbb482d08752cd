//! The authoritative in-memory map of job records.
//!
//! Every component reads and mutates records through these accessors; the
//! map itself is never exposed. Lock hold times stay short and never span
//! I/O or awaits.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use crate::job::{Job, JobId, JobSnapshot, JobStatus, SynthesisRequest};

#[derive(Debug, Default)]
pub(crate) struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub(crate) fn insert(&self, job: Job) {
        self.jobs.lock().insert(job.id, job);
    }

    pub(crate) fn contains(&self, job_id: JobId) -> bool {
        self.jobs.lock().contains_key(&job_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub(crate) fn snapshot(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.jobs.lock().get(&job_id).map(Job::snapshot)
    }

    pub(crate) fn snapshots(&self) -> Vec<JobSnapshot> {
        self.jobs.lock().values().map(Job::snapshot).collect()
    }

    /// Age of the record if it is still `Queued`.
    ///
    /// `None` means the queue reference is stale: the record was deleted, or
    /// it has already been dispatched.
    pub(crate) fn pending_age(&self, job_id: JobId) -> Option<Duration> {
        let jobs = self.jobs.lock();
        let job = jobs.get(&job_id)?;
        (job.status == JobStatus::Queued).then(|| job.age())
    }

    /// Transition to `Processing`, stamping `started_at`.
    ///
    /// Returns the request to execute, or `None` when the record was deleted
    /// between dispatch and execution.
    pub(crate) fn mark_processing(&self, job_id: JobId) -> Option<SynthesisRequest> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(&job_id)?;
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        Some(job.request.clone())
    }

    /// Terminal `Completed` transition, stamping `ended_at`.
    ///
    /// Returns the processing time when the record still exists.
    pub(crate) fn mark_completed(&self, job_id: JobId) -> Option<Duration> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(&job_id)?;
        job.status = JobStatus::Completed;
        job.ended_at = Some(Utc::now());
        job.processing_time()
    }

    /// Terminal `Failed` transition, recording the error detail.
    pub(crate) fn mark_failed(&self, job_id: JobId, error: String) -> bool {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(&job_id) else {
            return false;
        };
        job.status = JobStatus::Failed;
        job.ended_at = Some(Utc::now());
        job.error = Some(error);
        true
    }

    pub(crate) fn remove(&self, job_id: JobId) -> bool {
        self.jobs.lock().remove(&job_id).is_some()
    }

    /// Ids matching `predicate`, snapshotted under the lock so callers can
    /// remove them one at a time while other tasks keep mutating the map.
    pub(crate) fn ids_where(&self, predicate: impl Fn(&Job) -> bool) -> Vec<JobId> {
        self.jobs
            .lock()
            .values()
            .filter(|job| predicate(job))
            .map(|job| job.id)
            .collect()
    }
}

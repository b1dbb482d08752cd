//! The job engine: submission, the dispatch loop, and the operations the
//! HTTP layer consumes.

use std::io;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::EngineConfig;
use crate::errors::{JobNotFound, SubmitError};
use crate::job::{Job, JobId, JobSnapshot, JobStatus, StatusReport, SynthesisRequest};
use crate::notifier::Notifier;
use crate::producer::{ProducerAdapter, SpeechProducer};
use crate::queue::{DispatchQueue, PRIORITY_BOOSTED, PRIORITY_NORMAL};
use crate::reaper::Reaper;
use crate::registry::JobRegistry;
use crate::storage::ArtifactStore;
use crate::worker;

pub(crate) struct EngineCore {
    pub(crate) config: EngineConfig,
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) queue: Arc<DispatchQueue>,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) adapter: ProducerAdapter,
    pub(crate) notifier: Arc<Notifier>,
    pub(crate) store: Arc<ArtifactStore>,
    pub(crate) reaper: Arc<Reaper>,
}

/// The job lifecycle engine.
///
/// Owns the registry, the pending queue, and the concurrency budget. Cheap
/// to clone; all clones share the same state.
#[derive(Clone)]
pub struct JobEngine {
    core: Arc<EngineCore>,
}

impl JobEngine {
    /// Creates an engine over `producer`, ensuring the artifact directory
    /// exists.
    pub fn new(config: EngineConfig, producer: impl SpeechProducer) -> io::Result<Self> {
        let registry = Arc::new(JobRegistry::default());
        let store = Arc::new(ArtifactStore::new(config.audio_dir.clone())?);
        let notifier = Arc::new(Notifier::new(config.webhook.clone()));
        let reaper = Arc::new(Reaper::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&notifier),
            &config,
        ));
        let adapter = ProducerAdapter::new(Arc::new(producer), config.synthesis_timeout);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));

        Ok(Self {
            core: Arc::new(EngineCore {
                config,
                registry,
                queue: Arc::new(DispatchQueue::default()),
                semaphore,
                adapter,
                notifier,
                store,
                reaper,
            }),
        })
    }

    /// Starts the dispatch loop and the periodic cleanup sweep.
    pub fn start(&self) -> RunHandle {
        info!(
            "Starting job engine with {} concurrent executions",
            self.core.config.max_concurrency
        );
        let dispatcher = tokio::spawn(dispatch_loop(Arc::clone(&self.core)));
        let sweeper = tokio::spawn(Arc::clone(&self.core.reaper).run());
        RunHandle {
            handles: vec![dispatcher, sweeper],
        }
    }

    /// Validates and enqueues a synthesis request.
    ///
    /// Returns the new job's identifier immediately; execution happens on
    /// the worker pool. Fails only on malformed input.
    pub fn submit(&self, mut request: SynthesisRequest) -> Result<JobId, SubmitError> {
        request.text = request.text.trim().to_owned();
        if request.text.is_empty() {
            return Err(SubmitError::EmptyText);
        }
        let limit = self.core.config.max_text_length;
        if request.text.chars().count() > limit {
            return Err(SubmitError::TextTooLong { limit });
        }

        let job = Job::new(request);
        let job_id = job.id;
        self.core.registry.insert(job);
        self.core.queue.push(job_id, PRIORITY_NORMAL);
        debug!(job.id = %job_id, "Added job to queue, current depth {}", self.queue_depth());
        Ok(job_id)
    }

    /// Status and a human-readable message for a job.
    pub fn get_status(&self, job_id: JobId) -> Result<StatusReport, JobNotFound> {
        let snapshot = self
            .core
            .registry
            .snapshot(job_id)
            .ok_or(JobNotFound(job_id))?;
        let message = match snapshot.status {
            JobStatus::Queued => "Waiting in queue".to_owned(),
            JobStatus::Processing => "Audio is being processed".to_owned(),
            JobStatus::Completed => "Audio is ready".to_owned(),
            JobStatus::Failed => snapshot
                .error
                .unwrap_or_else(|| "Synthesis failed".to_owned()),
        };
        Ok(StatusReport {
            job_id,
            status: snapshot.status,
            message,
        })
    }

    /// Removes the registry entry for `job_id`.
    ///
    /// Pre-dispatch removal prevents execution; a job already in flight runs
    /// to completion. Artifact files are the caller's to remove on explicit
    /// deletes — the reaper only cleans up after automatic ones.
    pub fn delete(&self, job_id: JobId) -> Result<(), JobNotFound> {
        if self.core.registry.remove(job_id) {
            debug!(job.id = %job_id, "Removed job after explicit deletion");
            Ok(())
        } else {
            Err(JobNotFound(job_id))
        }
    }

    /// Number of pending (not yet dispatched) queue references.
    pub fn queue_depth(&self) -> usize {
        self.core.queue.depth()
    }

    /// Read-only copy of one job record.
    pub fn snapshot(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.core.registry.snapshot(job_id)
    }

    /// Snapshots of all tracked jobs, newest first.
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        let mut jobs = self.core.registry.snapshots();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Operational counters for health reporting.
    pub async fn stats(&self) -> io::Result<EngineStats> {
        Ok(EngineStats {
            queue_depth: self.queue_depth(),
            tracked_jobs: self.core.registry.len(),
            artifact_count: self.core.store.count().await?,
        })
    }
}

/// Pops pending references in priority order, applies aging promotion, and
/// hands jobs to the worker pool under the concurrency budget. Acquiring a
/// permit is the loop's only blocking point — queue depth is unbounded,
/// in-flight work is not.
async fn dispatch_loop(core: Arc<EngineCore>) {
    info!("Dispatcher started");
    loop {
        let entry = core.queue.pop().await;
        let job_id = entry.job_id;

        let Some(age) = core.registry.pending_age(job_id) else {
            debug!(job.id = %job_id, "Dropping stale queue reference");
            continue;
        };

        // A job that sat in the queue past the aging threshold is re-queued
        // at boosted rank instead of dispatched; it goes out on the next pop.
        if entry.rank == PRIORITY_NORMAL && age > core.config.aging_threshold {
            debug!(job.id = %job_id, "Promoting job queued for {age:?}");
            core.queue.push(job_id, PRIORITY_BOOSTED);
            continue;
        }

        let permit = match Arc::clone(&core.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Concurrency semaphore closed, stopping dispatcher");
                break;
            }
        };

        let span = info_span!("job", job.id = %job_id);
        tokio::spawn(worker::execute(Arc::clone(&core), job_id, permit).instrument(span));
    }
}

/// Handle to the engine's background tasks.
#[derive(Debug)]
pub struct RunHandle {
    handles: Vec<JoinHandle<()>>,
}

impl RunHandle {
    /// Stops the dispatch loop and the sweep.
    ///
    /// Jobs already handed to the worker pool keep running to completion on
    /// the runtime.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Counters reported by [`JobEngine::stats`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStats {
    /// Pending queue references.
    pub queue_depth: usize,
    /// Job records currently in the registry.
    pub tracked_jobs: usize,
    /// Audio artifacts on disk.
    pub artifact_count: usize,
}

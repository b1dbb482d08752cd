//! Garbage collection for completed work.
//!
//! Two independent paths, both required: a per-job deletion timer armed on
//! successful completion, and a periodic sweep that catches whatever the
//! timers miss (orphaned artifacts, failed jobs, records stuck in flight).
//! Both tolerate records disappearing underneath them.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::job::JobId;
use crate::notifier::{JobEvent, Notifier};
use crate::registry::JobRegistry;
use crate::storage::{self, ArtifactStore};

pub(crate) struct Reaper {
    registry: Arc<JobRegistry>,
    store: Arc<ArtifactStore>,
    notifier: Arc<Notifier>,
    delete_delay: Duration,
    sweep_interval: Duration,
    terminal_retention: Duration,
    max_job_age: Duration,
}

impl Reaper {
    pub(crate) fn new(
        registry: Arc<JobRegistry>,
        store: Arc<ArtifactStore>,
        notifier: Arc<Notifier>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            notifier,
            delete_delay: config.delete_delay,
            sweep_interval: config.sweep_interval,
            terminal_retention: config.terminal_retention,
            max_job_age: config.max_job_age,
        }
    }

    /// Arms the delayed deletion of a successfully completed job.
    pub(crate) fn arm(self: Arc<Self>, job_id: JobId) {
        debug!(job.id = %job_id, "Scheduling deletion in {:?}", self.delete_delay);
        tokio::spawn(async move {
            sleep(self.delete_delay).await;
            self.delete_job(job_id).await;
        });
    }

    async fn delete_job(&self, job_id: JobId) {
        if !self.registry.contains(job_id) {
            debug!(job.id = %job_id, "Job already removed, skipping deletion");
            return;
        }
        if !self.store.remove(job_id).await {
            warn!(job.id = %job_id, "Artifact not found during deletion");
        }
        self.registry.remove(job_id);
        debug!(job.id = %job_id, "Deleted job and artifact");

        let notifier = Arc::clone(&self.notifier);
        let event = JobEvent::deleted(job_id);
        tokio::spawn(async move {
            if let Err(error) = notifier.notify(&event).await {
                warn!(job.id = %event.job_id, "Failed to deliver deletion notification: {error}");
            }
        });
    }

    /// Periodic safety net; runs until the engine is shut down.
    pub(crate) async fn run(self: Arc<Self>) {
        info!("Starting cleanup sweep every {:?}", self.sweep_interval);
        let mut ticker = interval(self.sweep_interval);
        // interval's first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(error) = self.sweep().await {
                warn!("Cleanup sweep failed: {error}");
            }
        }
    }

    pub(crate) async fn sweep(&self) -> io::Result<()> {
        // Orphaned artifacts past the deletion delay. Covers files whose
        // deletion timer never fired (failed jobs scrub their own output, so
        // anything here belonged to a completed or abandoned job).
        let stale = self.store.scan_older_than(self.delete_delay).await?;
        let mut files_removed = 0usize;
        for (path, job_id) in stale {
            if storage::remove_artifact_file(&path).await {
                files_removed += 1;
            }
            if let Some(job_id) = job_id {
                self.registry.remove(job_id);
            }
        }

        // Terminal records past retention, and anything past the absolute
        // age bound regardless of status.
        let expired = self.registry.ids_where(|job| {
            let past_retention = job.status.is_terminal()
                && job
                    .time_since_end()
                    .is_some_and(|since| since > self.terminal_retention);
            past_retention || job.age() > self.max_job_age
        });
        for job_id in &expired {
            self.store.remove(*job_id).await;
            self.registry.remove(*job_id);
        }

        if files_removed > 0 || !expired.is_empty() {
            info!(
                "Sweep removed {files_removed} stale artifacts and {} job records",
                expired.len()
            );
        }
        debug!("{} jobs tracked after sweep", self.registry.len());
        Ok(())
    }
}

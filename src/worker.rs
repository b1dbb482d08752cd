use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::engine::EngineCore;
use crate::errors::ProductionError;
use crate::job::JobId;
use crate::notifier::JobEvent;
use crate::storage;

/// Drives one dispatched job through the state machine to a terminal state.
///
/// The semaphore permit is released exactly once on every path — success,
/// failure, timeout, or panic — because it is an owned permit dropped before
/// the bounded notification wait.
pub(crate) async fn execute(core: Arc<EngineCore>, job_id: JobId, permit: OwnedSemaphorePermit) {
    let Some(request) = core.registry.mark_processing(job_id) else {
        debug!("Job removed before execution, dropping");
        drop(permit);
        return;
    };

    debug!("Running job…");
    let dest = core.store.path_for(job_id);
    let produce = core.adapter.produce(&request, &dest);
    let outcome = match timeout(core.config.job_timeout, AssertUnwindSafe(produce).catch_unwind())
        .await
    {
        Err(_) => {
            // The adapter future was dropped mid-flight, so it could not
            // scrub its own partial output.
            storage::remove_artifact_file(&dest).await;
            Err(ProductionError::Timeout(core.config.job_timeout))
        }
        Ok(Err(panic)) => {
            storage::remove_artifact_file(&dest).await;
            Err(ProductionError::Internal(panic_message(&*panic)))
        }
        Ok(Ok(result)) => result,
    };

    let event = match outcome {
        Ok(()) => {
            let processing_time = core.registry.mark_completed(job_id).unwrap_or_default();
            debug!("Job completed in {processing_time:?}");
            Arc::clone(&core.reaper).arm(job_id);
            JobEvent::completed(job_id, processing_time)
        }
        Err(error) => {
            warn!("Failed to run job: {error}");
            core.registry.mark_failed(job_id, error.to_string());
            JobEvent::failed(job_id, error.to_string())
        }
    };

    drop(permit);

    let notifier = Arc::clone(&core.notifier);
    let delivery = tokio::spawn(async move {
        if let Err(error) = notifier.notify(&event).await {
            warn!(job.id = %event.job_id, "Failed to deliver outcome notification: {error}");
        }
    });
    // Bounded wait so delivery failures surface while the job span is still
    // current; the task keeps running on its own if it outlives the window.
    if timeout(core.config.notify_wait, delivery).await.is_err() {
        debug!("Notification still in flight, detaching");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else {
        "job task panicked".to_owned()
    }
}

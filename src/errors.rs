use std::path::PathBuf;
use std::time::Duration;

use crate::job::JobId;

/// Rejection reasons for [`JobEngine::submit`](crate::JobEngine::submit).
///
/// Submission only fails on malformed input; it never fails because the
/// queue is busy.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The request text was empty after trimming.
    #[error("text is required")]
    EmptyText,
    /// The request text exceeded the configured maximum length.
    #[error("text exceeds maximum length of {limit} characters")]
    TextTooLong {
        /// The configured limit the text exceeded.
        limit: usize,
    },
}

/// Failure of one synthesis attempt.
///
/// Recorded on the job record as its error detail; a production error marks
/// the job `Failed` and never affects other jobs or the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum ProductionError {
    /// The producer did not finish within its deadline.
    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),
    /// The producer reported success but the artifact is missing or empty.
    #[error("no audio was produced at {}", .0.display())]
    MissingArtifact(PathBuf),
    /// The producer panicked or failed in an unexpected way.
    #[error("internal error: {0}")]
    Internal(String),
    /// The producer returned an error.
    #[error(transparent)]
    Synthesis(anyhow::Error),
}

/// The queried identifier is unknown to the registry.
#[derive(Debug, thiserror::Error)]
#[error("job {0} not found")]
pub struct JobNotFound(pub JobId);

/// Notification delivery failed after exhausting the retry budget.
///
/// Logged by the engine and never propagated into job state.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The sink answered with a non-success status code.
    #[error("webhook returned status {0}")]
    Status(reqwest::StatusCode),
    /// The request itself failed (connect error, per-attempt timeout, ...).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

//! Webhook delivery of job outcome events.
//!
//! Delivery is best-effort: a bounded number of attempts with exponential
//! backoff, each under its own request timeout. Exhausting the budget is
//! logged and reported to the caller, but never touches job state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::WebhookConfig;
use crate::errors::NotifyError;
use crate::job::JobId;

/// Outcome kinds reported to the webhook sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The artifact was produced and is ready to fetch.
    Completed,
    /// Production failed; the message carries the error detail.
    Failed,
    /// The job and its artifact were automatically deleted.
    Deleted,
}

/// The outbound event record delivered for each job outcome.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    /// The job the event is about.
    pub job_id: JobId,
    /// What happened.
    #[serde(rename = "status")]
    pub kind: EventKind,
    /// Optional human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Execution duration in seconds, present for completed jobs.
    #[serde(rename = "processing_time_seconds", skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Event for a successfully produced artifact.
    pub fn completed(job_id: JobId, processing_time: Duration) -> Self {
        Self {
            job_id,
            kind: EventKind::Completed,
            message: Some("Audio file is ready".to_owned()),
            processing_time: Some(processing_time.as_secs_f64()),
            timestamp: Utc::now(),
        }
    }

    /// Event for a failed job.
    pub fn failed(job_id: JobId, message: String) -> Self {
        Self {
            job_id,
            kind: EventKind::Failed,
            message: Some(message),
            processing_time: None,
            timestamp: Utc::now(),
        }
    }

    /// Event for an automatically deleted job.
    pub fn deleted(job_id: JobId) -> Self {
        Self {
            job_id,
            kind: EventKind::Deleted,
            message: Some("Job and audio file automatically deleted after timeout".to_owned()),
            processing_time: None,
            timestamp: Utc::now(),
        }
    }
}

/// Best-effort webhook notifier with bounded retries.
///
/// An unconfigured sink makes every delivery a successful no-op.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    config: WebhookConfig,
}

impl Notifier {
    /// Builds a notifier from webhook settings.
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Whether a sink is configured.
    pub fn is_configured(&self) -> bool {
        self.config.url.is_some()
    }

    /// Delivers `event`, retrying with exponential backoff on non-2xx
    /// responses and transport errors.
    pub async fn notify(&self, event: &JobEvent) -> Result<(), NotifyError> {
        let Some(url) = self.config.url.as_deref() else {
            debug!(job.id = %event.job_id, "No webhook URL configured, skipping notification");
            return Ok(());
        };

        let mut last_error = None;
        for attempt in 0..self.config.attempts {
            if attempt > 0 {
                sleep(self.backoff(attempt - 1)).await;
            }
            debug!(
                job.id = %event.job_id,
                "Sending webhook, attempt {}/{}",
                attempt + 1,
                self.config.attempts
            );
            match self
                .client
                .post(url)
                .json(event)
                .timeout(self.config.request_timeout)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    debug!(job.id = %event.job_id, "Webhook notification delivered");
                    return Ok(());
                }
                Ok(response) => {
                    warn!(
                        job.id = %event.job_id,
                        "Webhook attempt {} returned status {}",
                        attempt + 1,
                        response.status()
                    );
                    last_error = Some(NotifyError::Status(response.status()));
                }
                Err(error) => {
                    warn!(
                        job.id = %event.job_id,
                        "Webhook attempt {} failed: {error}",
                        attempt + 1
                    );
                    last_error = Some(NotifyError::Transport(error));
                }
            }
        }

        match last_error {
            Some(error) => {
                warn!(job.id = %event.job_id, "Giving up on webhook delivery: {error}");
                Err(error)
            }
            None => Ok(()),
        }
    }

    /// Backoff before the retry following 0-based attempt `failed`, with
    /// random jitter to avoid retry bunching.
    fn backoff(&self, failed: u32) -> Duration {
        let base = self
            .config
            .backoff_base
            .saturating_mul(2u32.saturating_pow(failed));
        let jitter_millis = u64::try_from(self.config.backoff_jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_millis == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_millis);
        base + Duration::from_millis(jitter)
    }
}

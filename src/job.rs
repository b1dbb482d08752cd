//! Job records and the types derived from them.
//!
//! This module contains the data model for the job lifecycle engine: the
//! submitted request, the registry record, and the read-only views handed to
//! callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// The voice used when a request does not specify one.
pub const DEFAULT_VOICE: &str = "en-US-AriaNeural";

/// Opaque unique identifier for a submitted job.
///
/// Generated at submission and never reused; the artifact for a job is named
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the pending queue.
    Queued,
    /// Currently being executed by the worker pool.
    Processing,
    /// The artifact was produced successfully.
    Completed,
    /// Production failed; the error detail is recorded on the job.
    Failed,
}

impl JobStatus {
    /// Whether this state is terminal (`Completed` or `Failed`).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text-to-speech synthesis request.
///
/// Validated at submission; the engine otherwise treats the payload as opaque
/// and passes it to the producer together with the normalized prosody knobs
/// (see [`SynthesisRequest::prosody`](crate::SynthesisRequest::prosody)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Text to synthesize.
    pub text: String,
    /// Voice name, e.g. `en-US-AriaNeural`.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Pitch shift in Hz around the voice baseline; `0.0` is neutral.
    #[serde(default)]
    pub pitch: f32,
    /// Speaking rate multiplier; `1.0` is the voice's natural rate.
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Volume percentage; `100.0` is unattenuated.
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_owned()
}

fn default_speed() -> f32 {
    1.0
}

fn default_volume() -> f32 {
    100.0
}

impl SynthesisRequest {
    /// Request for `text` with the default voice and neutral prosody.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: default_voice(),
            pitch: 0.0,
            speed: default_speed(),
            volume: default_volume(),
        }
    }
}

/// The registry record for one job.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub(crate) id: JobId,
    pub(crate) request: SynthesisRequest,
    pub(crate) status: JobStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) error: Option<String>,
}

const PREVIEW_CHARS: usize = 100;

impl Job {
    pub(crate) fn new(request: SynthesisRequest) -> Self {
        Self {
            id: JobId::new(),
            request,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    /// Time since submission, clamped to zero if the clock went backwards.
    pub(crate) fn age(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or_default()
    }

    /// Execution duration, defined only once both timestamps are set.
    pub(crate) fn processing_time(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => Some((ended - started).to_std().unwrap_or_default()),
            _ => None,
        }
    }

    /// Time since the job reached a terminal state.
    pub(crate) fn time_since_end(&self) -> Option<Duration> {
        self.ended_at
            .map(|ended| (Utc::now() - ended).to_std().unwrap_or_default())
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        let text = if self.request.text.chars().count() > PREVIEW_CHARS {
            let preview: String = self.request.text.chars().take(PREVIEW_CHARS).collect();
            format!("{preview}...")
        } else {
            self.request.text.clone()
        };

        JobSnapshot {
            job_id: self.id,
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            error: self.error.clone(),
            processing_time_seconds: self.processing_time().map(|d| d.as_secs_f64()),
            text,
        }
    }
}

/// Read-only copy of a job record, suitable for job listings.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// The job's identifier.
    pub job_id: JobId,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When the worker pool picked the job up, if it has been dispatched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Error detail, present only for failed jobs.
    pub error: Option<String>,
    /// Execution duration in seconds, once the job has ended.
    pub processing_time_seconds: Option<f64>,
    /// The request text, truncated to a display-friendly preview.
    pub text: String,
}

/// Status plus a human-readable message, as returned by
/// [`JobEngine::get_status`](crate::JobEngine::get_status).
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// The queried identifier.
    pub job_id: JobId,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Human-readable summary; for failed jobs, the error detail.
    pub message: String,
}

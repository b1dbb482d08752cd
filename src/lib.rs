#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod engine;
mod errors;
mod job;
mod notifier;
mod producer;
mod queue;
mod registry;
mod reaper;
mod storage;
mod worker;

/// Engine tuning and webhook settings.
pub use self::config::{EngineConfig, WebhookConfig};
/// The engine itself and the handle to its background tasks.
pub use self::engine::{EngineStats, JobEngine, RunHandle};
pub use self::errors::{JobNotFound, NotifyError, ProductionError, SubmitError};
pub use self::job::{JobId, JobSnapshot, JobStatus, StatusReport, SynthesisRequest, DEFAULT_VOICE};
/// Outcome events and the webhook notifier that delivers them.
pub use self::notifier::{EventKind, JobEvent, Notifier};
/// The synthesis seam implemented by audio backends.
pub use self::producer::{Prosody, SpeechProducer};

//! The synthesis seam: the [`SpeechProducer`] trait and the adapter that
//! wraps it with a hard deadline and artifact post-conditions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::timeout;
use tracing::debug;

use crate::errors::ProductionError;
use crate::job::SynthesisRequest;
use crate::storage;

/// Prosody knobs normalized into the encoding speech services expect:
/// signed deltas around the neutral baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prosody {
    /// Rate delta, e.g. `+25%` for a `1.25` speed multiplier.
    pub rate: String,
    /// Volume delta, e.g. `-20%` for volume `80.0`.
    pub volume: String,
    /// Pitch delta in Hz, e.g. `+0Hz`.
    pub pitch: String,
}

impl SynthesisRequest {
    /// Normalized production parameters for this request.
    ///
    /// Speed `1.0`, volume `100.0`, and pitch `0.0` all map to a `+0` delta.
    pub fn prosody(&self) -> Prosody {
        let rate = ((self.speed - 1.0) * 100.0).round() as i32;
        let volume = (self.volume - 100.0).round() as i32;
        let pitch = self.pitch.round() as i32;
        Prosody {
            rate: format!("{rate:+}%"),
            volume: format!("{volume:+}%"),
            pitch: format!("{pitch:+}Hz"),
        }
    }
}

/// An asynchronous speech synthesis backend.
///
/// Implementations write the finished audio to `dest` and return `Ok`. Any
/// error, a deadline overrun, or an artifact that ends up missing or empty
/// marks the job failed; the engine removes whatever was written.
pub trait SpeechProducer: Send + Sync + 'static {
    /// Synthesize `request` into an audio file at `dest`.
    fn produce<'a>(
        &'a self,
        request: &'a SynthesisRequest,
        dest: &'a Path,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Wraps the producer with its own deadline and post-condition checks.
///
/// A failed call never leaves a partial artifact behind that would later
/// pass the existence check.
pub(crate) struct ProducerAdapter {
    producer: Arc<dyn SpeechProducer>,
    synthesis_timeout: Duration,
}

impl ProducerAdapter {
    pub(crate) fn new(producer: Arc<dyn SpeechProducer>, synthesis_timeout: Duration) -> Self {
        Self {
            producer,
            synthesis_timeout,
        }
    }

    pub(crate) async fn produce(
        &self,
        request: &SynthesisRequest,
        dest: &Path,
    ) -> Result<(), ProductionError> {
        let result = match timeout(self.synthesis_timeout, self.producer.produce(request, dest))
            .await
        {
            Err(_) => Err(ProductionError::Timeout(self.synthesis_timeout)),
            Ok(Err(error)) => Err(ProductionError::Synthesis(error)),
            Ok(Ok(())) => check_artifact(dest).await,
        };
        if result.is_err() {
            storage::remove_artifact_file(dest).await;
        }
        result
    }
}

async fn check_artifact(dest: &Path) -> Result<(), ProductionError> {
    match tokio::fs::metadata(dest).await {
        Ok(metadata) if metadata.len() > 0 => {
            debug!(
                "Artifact written to {} ({} bytes)",
                dest.display(),
                metadata.len()
            );
            Ok(())
        }
        _ => Err(ProductionError::MissingArtifact(dest.to_path_buf())),
    }
}

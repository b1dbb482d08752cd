#![allow(missing_docs)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]

use std::time::Duration;

use claims::{assert_err, assert_none, assert_ok, assert_some};
use tokio::time::Instant;
use tts_workers::{JobStatus, SubmitError, SynthesisRequest};

use crate::test_utils::{artifact_path, request, test_config, wait_for, Behavior, StubProducer};

/// Test utilities and common setup
mod test_utils {
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use tokio::sync::Semaphore;
    use tokio::time::{sleep, Instant};
    use tts_workers::{EngineConfig, SpeechProducer, SynthesisRequest};

    /// Engine defaults tuned down for fast tests: background intervals are
    /// pushed out of the way so individual tests opt into the paths they
    /// exercise.
    pub(super) fn test_config(dir: &Path) -> EngineConfig {
        EngineConfig::default()
            .audio_dir(dir)
            .delete_delay(Duration::from_secs(3600))
            .sweep_interval(Duration::from_secs(3600))
            .notify_wait(Duration::from_millis(100))
    }

    pub(super) fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest::new(text)
    }

    pub(super) fn artifact_path(dir: &Path, job_id: impl std::fmt::Display) -> PathBuf {
        dir.join(format!("{job_id}.mp3"))
    }

    /// Polls `condition` every 10ms until it holds or `deadline` passes.
    pub(super) async fn wait_for(mut condition: impl FnMut() -> bool, deadline: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[derive(Debug, Clone, Copy)]
    pub(super) enum Behavior {
        /// Sleep, then write a valid artifact.
        Succeed(Duration),
        /// Report success without writing anything.
        SucceedEmpty,
        /// Wait for a gate permit, then write a valid artifact.
        Gated,
        /// Return an error.
        Fail,
        /// Sleep far past any test's job timeout.
        Hang,
        /// Panic mid-synthesis.
        Panic,
    }

    /// A scripted producer: each call pops the next behavior, falling back
    /// to the default. Records dispatch and completion order by request
    /// text, and tracks peak concurrency.
    #[derive(Clone)]
    pub(super) struct StubProducer {
        default: Behavior,
        script: Arc<Mutex<VecDeque<Behavior>>>,
        started: Arc<Mutex<Vec<String>>>,
        finished: Arc<Mutex<Vec<String>>>,
        gate: Arc<Semaphore>,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl StubProducer {
        pub(super) fn new(default: Behavior) -> Self {
            Self {
                default,
                script: Arc::new(Mutex::new(VecDeque::new())),
                started: Arc::new(Mutex::new(Vec::new())),
                finished: Arc::new(Mutex::new(Vec::new())),
                gate: Arc::new(Semaphore::new(0)),
                running: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(super) fn script(self, behaviors: impl IntoIterator<Item = Behavior>) -> Self {
            self.script.lock().unwrap().extend(behaviors);
            self
        }

        /// Lets `n` gated calls proceed.
        pub(super) fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        pub(super) fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }

        pub(super) fn finished(&self) -> Vec<String> {
            self.finished.lock().unwrap().clone()
        }

        pub(super) fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    /// Decrements the running counter even when the call is cancelled or
    /// panics.
    struct RunningGuard(Arc<AtomicUsize>);

    impl Drop for RunningGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl SpeechProducer for StubProducer {
        fn produce<'a>(
            &'a self,
            request: &'a SynthesisRequest,
            dest: &'a Path,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            async move {
                let behavior = self
                    .script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(self.default);
                self.started.lock().unwrap().push(request.text.clone());

                let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(running, Ordering::SeqCst);
                let _guard = RunningGuard(Arc::clone(&self.running));

                match behavior {
                    Behavior::Succeed(delay) => {
                        if !delay.is_zero() {
                            sleep(delay).await;
                        }
                        tokio::fs::write(dest, b"synthesized-audio").await?;
                    }
                    Behavior::SucceedEmpty => {}
                    Behavior::Gated => {
                        let permit = self.gate.acquire().await?;
                        permit.forget();
                        tokio::fs::write(dest, b"synthesized-audio").await?;
                    }
                    Behavior::Fail => anyhow::bail!("synthesis exploded"),
                    Behavior::Hang => sleep(Duration::from_secs(30)).await,
                    Behavior::Panic => panic!("producer panicked"),
                }

                self.finished.lock().unwrap().push(request.text.clone());
                Ok(())
            }
            .boxed()
        }
    }
}

#[tokio::test]
async fn submitted_job_completes_and_writes_artifact() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::ZERO));
    let engine = tts_workers::JobEngine::new(test_config(dir.path()), producer)?;
    let _running = engine.start();

    let job_id = assert_ok!(engine.submit(request("hello")));

    assert!(
        wait_for(
            || {
                engine
                    .get_status(job_id)
                    .map(|report| report.status == JobStatus::Completed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );

    let report = assert_ok!(engine.get_status(job_id));
    assert_eq!(report.message, "Audio is ready");

    let metadata = tokio::fs::metadata(artifact_path(dir.path(), job_id)).await?;
    assert!(metadata.len() > 0);

    Ok(())
}

#[tokio::test]
async fn malformed_submissions_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::ZERO));
    let config = test_config(dir.path()).max_text_length(10);
    let engine = tts_workers::JobEngine::new(config, producer)?;

    let error = assert_err!(engine.submit(request("   ")));
    assert!(matches!(error, SubmitError::EmptyText));

    let error = assert_err!(engine.submit(request("this text is too long")));
    assert!(matches!(error, SubmitError::TextTooLong { limit: 10 }));

    // Nothing was tracked for the rejected submissions.
    assert_eq!(engine.list_jobs().len(), 0);
    assert_eq!(engine.queue_depth(), 0);

    Ok(())
}

#[tokio::test]
async fn jobs_complete_in_submission_order_under_single_concurrency() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::from_millis(100)));
    let config = test_config(dir.path()).max_concurrency(1);
    let engine = tts_workers::JobEngine::new(config, producer.clone())?;
    let _running = engine.start();

    let start = Instant::now();
    let first = assert_ok!(engine.submit(request("first")));
    let second = assert_ok!(engine.submit(request("second")));
    let third = assert_ok!(engine.submit(request("third")));

    for job_id in [first, second, third] {
        assert!(
            wait_for(
                || {
                    engine
                        .get_status(job_id)
                        .map(|report| report.status == JobStatus::Completed)
                        .unwrap_or(false)
                },
                Duration::from_secs(5),
            )
            .await
        );
    }

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(producer.finished(), vec!["first", "second", "third"]);

    Ok(())
}

#[tokio::test]
async fn processing_never_exceeds_concurrency_limit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::from_millis(50)));
    let config = test_config(dir.path()).max_concurrency(2);
    let engine = tts_workers::JobEngine::new(config, producer.clone())?;
    let _running = engine.start();

    let mut job_ids = Vec::new();
    for i in 0..8 {
        job_ids.push(assert_ok!(engine.submit(request(&format!("job-{i}")))));
    }

    assert!(
        wait_for(
            || {
                job_ids.iter().all(|job_id| {
                    engine
                        .get_status(*job_id)
                        .map(|report| report.status == JobStatus::Completed)
                        .unwrap_or(false)
                })
            },
            Duration::from_secs(5),
        )
        .await
    );

    assert!(producer.peak() <= 2, "peak concurrency was {}", producer.peak());

    Ok(())
}

#[tokio::test]
async fn pool_survives_mixed_outcomes_without_leaking_permits() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::from_millis(20))).script([
        Behavior::Fail,
        Behavior::Succeed(Duration::from_millis(10)),
        Behavior::Hang,
        Behavior::Panic,
        Behavior::Fail,
        Behavior::Succeed(Duration::from_millis(10)),
    ]);
    let config = test_config(dir.path())
        .max_concurrency(2)
        .job_timeout(Duration::from_millis(200));
    let engine = tts_workers::JobEngine::new(config, producer.clone())?;
    let _running = engine.start();

    let mut first_batch = Vec::new();
    for i in 0..6 {
        first_batch.push(assert_ok!(engine.submit(request(&format!("mixed-{i}")))));
    }

    assert!(
        wait_for(
            || {
                first_batch.iter().all(|job_id| {
                    engine
                        .get_status(*job_id)
                        .map(|report| report.status.is_terminal())
                        .unwrap_or(false)
                })
            },
            Duration::from_secs(5),
        )
        .await
    );

    // Every permit made it back: a fresh batch still runs to completion at
    // full concurrency.
    let mut second_batch = Vec::new();
    for i in 0..4 {
        second_batch.push(assert_ok!(engine.submit(request(&format!("after-{i}")))));
    }

    assert!(
        wait_for(
            || {
                second_batch.iter().all(|job_id| {
                    engine
                        .get_status(*job_id)
                        .map(|report| report.status == JobStatus::Completed)
                        .unwrap_or(false)
                })
            },
            Duration::from_secs(5),
        )
        .await
    );

    assert!(producer.peak() <= 2);

    Ok(())
}

#[tokio::test]
async fn aged_jobs_are_promoted_once_and_never_starved() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Gated);
    let config = test_config(dir.path())
        .max_concurrency(1)
        .aging_threshold(Duration::from_millis(150));
    let engine = tts_workers::JobEngine::new(config, producer.clone())?;
    let _running = engine.start();

    let blocker = assert_ok!(engine.submit(request("blocker")));
    assert!(wait_for(|| producer.started().len() == 1, Duration::from_secs(2)).await);

    let early_one = assert_ok!(engine.submit(request("early-one")));
    let early_two = assert_ok!(engine.submit(request("early-two")));

    // Let the queued jobs cross the aging threshold behind the blocker.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let fresh = assert_ok!(engine.submit(request("fresh")));

    producer.release(4);

    for job_id in [blocker, early_one, early_two, fresh] {
        assert!(
            wait_for(
                || {
                    engine
                        .get_status(job_id)
                        .map(|report| report.status == JobStatus::Completed)
                        .unwrap_or(false)
                },
                Duration::from_secs(5),
            )
            .await
        );
    }

    // Promotion re-queues rather than re-dispatches: every job ran exactly
    // once, and the aged jobs went out ahead of the fresh one.
    assert_eq!(
        producer.started(),
        vec!["blocker", "early-one", "early-two", "fresh"]
    );
    assert_eq!(engine.queue_depth(), 0);

    Ok(())
}

#[tokio::test]
async fn deleting_pending_job_prevents_execution() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Gated);
    let config = test_config(dir.path()).max_concurrency(1);
    let engine = tts_workers::JobEngine::new(config, producer.clone())?;
    let _running = engine.start();

    let blocker = assert_ok!(engine.submit(request("blocker")));
    assert!(wait_for(|| producer.started().len() == 1, Duration::from_secs(2)).await);

    let victim = assert_ok!(engine.submit(request("victim")));
    assert_ok!(engine.delete(victim));

    producer.release(2);
    assert!(
        wait_for(
            || {
                engine
                    .get_status(blocker)
                    .map(|report| report.status == JobStatus::Completed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(producer.started(), vec!["blocker"]);
    assert_err!(engine.get_status(victim));

    Ok(())
}

#[tokio::test]
async fn unknown_job_is_not_found() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::ZERO));
    let engine = tts_workers::JobEngine::new(test_config(dir.path()), producer)?;

    let unknown = "123e4567-e89b-12d3-a456-426614174000".parse()?;

    let error = assert_err!(engine.get_status(unknown));
    assert_eq!(error.0, unknown);
    assert_err!(engine.delete(unknown));

    Ok(())
}

#[tokio::test]
async fn job_timeout_marks_failed_and_frees_the_pool() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::from_millis(10)))
        .script([Behavior::Hang]);
    let config = test_config(dir.path())
        .max_concurrency(1)
        .job_timeout(Duration::from_millis(150));
    let engine = tts_workers::JobEngine::new(config, producer)?;
    let _running = engine.start();

    let start = Instant::now();
    let slow = assert_ok!(engine.submit(request("slow")));
    let after = assert_ok!(engine.submit(request("after")));

    assert!(
        wait_for(
            || {
                engine
                    .get_status(slow)
                    .map(|report| report.status == JobStatus::Failed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );
    let report = assert_ok!(engine.get_status(slow));
    assert!(
        report.message.contains("timed out"),
        "unexpected message: {}",
        report.message
    );

    // The permit came back at the timeout, not after the stub's full sleep.
    assert!(
        wait_for(
            || {
                engine
                    .get_status(after)
                    .map(|report| report.status == JobStatus::Completed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );
    assert!(start.elapsed() < Duration::from_secs(5));

    // The timed-out job's partial artifact was scrubbed.
    assert!(tokio::fs::metadata(artifact_path(dir.path(), slow))
        .await
        .is_err());

    Ok(())
}

#[tokio::test]
async fn failed_job_reports_error_detail() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::ZERO)).script([Behavior::Fail]);
    let engine = tts_workers::JobEngine::new(test_config(dir.path()), producer)?;
    let _running = engine.start();

    let job_id = assert_ok!(engine.submit(request("doomed")));

    assert!(
        wait_for(
            || {
                engine
                    .get_status(job_id)
                    .map(|report| report.status == JobStatus::Failed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );

    let report = assert_ok!(engine.get_status(job_id));
    assert!(report.message.contains("synthesis exploded"));

    let snapshot = assert_some!(engine.snapshot(job_id));
    assert!(assert_some!(snapshot.error).contains("synthesis exploded"));

    Ok(())
}

#[tokio::test]
async fn panicking_producer_marks_job_failed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::ZERO)).script([Behavior::Panic]);
    let config = test_config(dir.path()).max_concurrency(1);
    let engine = tts_workers::JobEngine::new(config, producer)?;
    let _running = engine.start();

    let panicked = assert_ok!(engine.submit(request("boom")));
    let after = assert_ok!(engine.submit(request("after")));

    assert!(
        wait_for(
            || {
                engine
                    .get_status(panicked)
                    .map(|report| report.status == JobStatus::Failed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );
    let report = assert_ok!(engine.get_status(panicked));
    assert!(report.message.contains("producer panicked"));

    // The panic neither tore down the pool nor leaked its permit.
    assert!(
        wait_for(
            || {
                engine
                    .get_status(after)
                    .map(|report| report.status == JobStatus::Completed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );

    Ok(())
}

#[tokio::test]
async fn empty_artifact_marks_job_failed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer =
        StubProducer::new(Behavior::Succeed(Duration::ZERO)).script([Behavior::SucceedEmpty]);
    let engine = tts_workers::JobEngine::new(test_config(dir.path()), producer)?;
    let _running = engine.start();

    let job_id = assert_ok!(engine.submit(request("silent")));

    assert!(
        wait_for(
            || {
                engine
                    .get_status(job_id)
                    .map(|report| report.status == JobStatus::Failed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );

    let report = assert_ok!(engine.get_status(job_id));
    assert!(report.message.contains("no audio was produced"));

    Ok(())
}

#[tokio::test]
async fn registry_tracks_exactly_one_record_per_submission() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::ZERO));
    let engine = tts_workers::JobEngine::new(test_config(dir.path()), producer)?;
    // Engine deliberately not started: everything stays queued.

    let mut job_ids = Vec::new();
    for i in 0..5 {
        job_ids.push(assert_ok!(engine.submit(request(&format!("pending-{i}")))));
    }

    let jobs = engine.list_jobs();
    assert_eq!(jobs.len(), 5);
    for job_id in &job_ids {
        assert_eq!(
            jobs.iter().filter(|job| job.job_id == *job_id).count(),
            1,
            "expected exactly one record for {job_id}"
        );
        assert_eq!(
            assert_some!(engine.snapshot(*job_id)).status,
            JobStatus::Queued
        );
    }
    assert_eq!(engine.queue_depth(), 5);

    Ok(())
}

#[tokio::test]
async fn queue_depth_reflects_pending_jobs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Gated);
    let config = test_config(dir.path()).max_concurrency(1);
    let engine = tts_workers::JobEngine::new(config, producer.clone())?;
    let _running = engine.start();

    let blocker = assert_ok!(engine.submit(request("blocker")));
    assert!(wait_for(|| producer.started().len() == 1, Duration::from_secs(2)).await);

    let mut waiting = vec![blocker];
    for i in 0..3 {
        waiting.push(assert_ok!(engine.submit(request(&format!("waiting-{i}")))));
    }

    // One of the three is already popped and parked at the semaphore; the
    // other two are still queued.
    assert!(wait_for(|| engine.queue_depth() == 2, Duration::from_secs(2)).await);

    producer.release(4);
    assert!(
        wait_for(
            || {
                waiting.iter().all(|job_id| {
                    engine
                        .get_status(*job_id)
                        .map(|report| report.status == JobStatus::Completed)
                        .unwrap_or(false)
                })
            },
            Duration::from_secs(5),
        )
        .await
    );
    assert_eq!(engine.queue_depth(), 0);

    let stats = engine.stats().await?;
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.tracked_jobs, 4);
    assert_eq!(stats.artifact_count, 4);

    Ok(())
}

#[tokio::test]
async fn timestamps_are_monotonic_and_processing_time_nonnegative() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::from_millis(50)));
    let engine = tts_workers::JobEngine::new(test_config(dir.path()), producer)?;
    let _running = engine.start();

    let job_id = assert_ok!(engine.submit(request("timed")));

    assert!(
        wait_for(
            || {
                engine
                    .get_status(job_id)
                    .map(|report| report.status == JobStatus::Completed)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await
    );

    let snapshot = assert_some!(engine.snapshot(job_id));
    let started_at = assert_some!(snapshot.started_at);
    let ended_at = assert_some!(snapshot.ended_at);
    assert!(snapshot.created_at <= started_at);
    assert!(started_at <= ended_at);
    assert!(assert_some!(snapshot.processing_time_seconds) >= 0.0);
    assert_none!(snapshot.error);

    Ok(())
}

#[tokio::test]
async fn long_request_text_is_truncated_in_snapshots() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let producer = StubProducer::new(Behavior::Succeed(Duration::ZERO));
    let engine = tts_workers::JobEngine::new(test_config(dir.path()), producer)?;

    let long_text = "x".repeat(500);
    let job_id = assert_ok!(engine.submit(SynthesisRequest::new(long_text)));

    let snapshot = assert_some!(engine.snapshot(job_id));
    assert_eq!(snapshot.text.chars().count(), 103);
    assert!(snapshot.text.ends_with("..."));

    Ok(())
}

#[test]
fn prosody_normalizes_to_signed_deltas() {
    let neutral = SynthesisRequest::new("hi");
    let prosody = neutral.prosody();
    assert_eq!(prosody.rate, "+0%");
    assert_eq!(prosody.volume, "+0%");
    assert_eq!(prosody.pitch, "+0Hz");

    let mut tuned = SynthesisRequest::new("hi");
    tuned.speed = 1.25;
    tuned.volume = 80.0;
    tuned.pitch = -2.0;
    let prosody = tuned.prosody();
    assert_eq!(prosody.rate, "+25%");
    assert_eq!(prosody.volume, "-20%");
    assert_eq!(prosody.pitch, "-2Hz");

    let mut slowed = SynthesisRequest::new("hi");
    slowed.speed = 0.8;
    let prosody = slowed.prosody();
    assert_eq!(prosody.rate, "-20%");
}

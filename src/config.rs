//! Engine configuration.
//!
//! [`EngineConfig::default`] matches the original deployment's tuning;
//! [`EngineConfig::from_env`] layers the environment variables the service
//! has historically honored on top of the defaults. Individual knobs can be
//! adjusted with the chained setters.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Webhook delivery settings for the notifier.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Sink URL; `None` disables notifications entirely.
    pub url: Option<String>,
    /// Maximum delivery attempts per event.
    pub attempts: u32,
    /// Base of the exponential backoff between attempts.
    pub backoff_base: Duration,
    /// Upper bound of the random jitter added to each backoff.
    pub backoff_jitter: Duration,
    /// Timeout applied to each individual delivery attempt.
    pub request_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_jitter: Duration::from_millis(100),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Tunables for the job engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of simultaneous synthesis executions.
    pub max_concurrency: usize,
    /// Queue age beyond which a pending job is promoted to boosted priority.
    pub aging_threshold: Duration,
    /// Overall deadline for one job's execution, including adapter overhead.
    pub job_timeout: Duration,
    /// The producer adapter's own deadline for the synthesis call.
    pub synthesis_timeout: Duration,
    /// Delay between successful completion and automatic deletion.
    pub delete_delay: Duration,
    /// Interval of the periodic cleanup sweep.
    pub sweep_interval: Duration,
    /// How long terminal job records are retained past their end time.
    pub terminal_retention: Duration,
    /// Absolute age bound after which any record is dropped regardless of state.
    pub max_job_age: Duration,
    /// How long a worker waits on the outcome notification before detaching it.
    pub notify_wait: Duration,
    /// Maximum accepted request text length, in characters.
    pub max_text_length: usize,
    /// Directory where produced audio artifacts are written.
    pub audio_dir: PathBuf,
    /// Outcome notification settings.
    pub webhook: WebhookConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 50,
            aging_threshold: Duration::from_secs(300),
            job_timeout: Duration::from_secs(60),
            synthesis_timeout: Duration::from_secs(45),
            delete_delay: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            terminal_retention: Duration::from_secs(3600),
            max_job_age: Duration::from_secs(7200),
            notify_wait: Duration::from_secs(5),
            max_text_length: 14_000,
            audio_dir: PathBuf::from("audio_files"),
            webhook: WebhookConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with the deployment environment variables:
    /// `MAX_CONCURRENT_REQUESTS`, `WEBHOOK_URL`, `MAX_TEXT_LENGTH`,
    /// `AUDIO_DIR`, and `AUTO_DELETE_DELAY_SECS`.
    ///
    /// Unset or unparsable variables leave the default in place.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = parse_var("MAX_CONCURRENT_REQUESTS") {
            config.max_concurrency = n;
        }
        if let Ok(url) = env::var("WEBHOOK_URL") {
            if !url.trim().is_empty() {
                config.webhook.url = Some(url);
            }
        }
        if let Some(n) = parse_var("MAX_TEXT_LENGTH") {
            config.max_text_length = n;
        }
        if let Ok(dir) = env::var("AUDIO_DIR") {
            if !dir.is_empty() {
                config.audio_dir = PathBuf::from(dir);
            }
        }
        if let Some(secs) = parse_var("AUTO_DELETE_DELAY_SECS") {
            config.delete_delay = Duration::from_secs(secs);
        }
        config
    }

    /// Set the maximum number of simultaneous executions.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the queue age that triggers priority promotion.
    pub fn aging_threshold(mut self, aging_threshold: Duration) -> Self {
        self.aging_threshold = aging_threshold;
        self
    }

    /// Set the overall per-job execution deadline.
    pub fn job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Set the producer adapter's synthesis deadline.
    pub fn synthesis_timeout(mut self, synthesis_timeout: Duration) -> Self {
        self.synthesis_timeout = synthesis_timeout;
        self
    }

    /// Set the delay between completion and automatic deletion.
    pub fn delete_delay(mut self, delete_delay: Duration) -> Self {
        self.delete_delay = delete_delay;
        self
    }

    /// Set the periodic sweep interval.
    pub fn sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Set how long terminal records are retained past their end time.
    pub fn terminal_retention(mut self, terminal_retention: Duration) -> Self {
        self.terminal_retention = terminal_retention;
        self
    }

    /// Set the absolute record age bound.
    pub fn max_job_age(mut self, max_job_age: Duration) -> Self {
        self.max_job_age = max_job_age;
        self
    }

    /// Set the bounded wait applied to outcome notifications.
    pub fn notify_wait(mut self, notify_wait: Duration) -> Self {
        self.notify_wait = notify_wait;
        self
    }

    /// Set the maximum accepted text length.
    pub fn max_text_length(mut self, max_text_length: usize) -> Self {
        self.max_text_length = max_text_length;
        self
    }

    /// Set the artifact directory.
    pub fn audio_dir(mut self, audio_dir: impl Into<PathBuf>) -> Self {
        self.audio_dir = audio_dir.into();
        self
    }

    /// Set the webhook sink URL.
    pub fn webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook.url = Some(url.into());
        self
    }

    /// Replace the webhook settings wholesale.
    pub fn webhook(mut self, webhook: WebhookConfig) -> Self {
        self.webhook = webhook;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok()?.parse().ok()
}

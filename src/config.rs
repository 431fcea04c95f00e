use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub message_bus: MessageBusConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub flusher: FlusherConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Path to the metrics catalog JSON.
    pub catalog_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Monitoring server host (optionally with port); requests go to `https://<host>/`.
    pub host: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: BackoffStrategy,
    /// Upper bound on a single inter-attempt delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff() -> BackoffStrategy {
    BackoffStrategy::Exponential
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff: default_backoff(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, where `attempt` counts failures so far (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let ms = match self.backoff {
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                let shift = attempt.saturating_sub(1).min(32);
                base.saturating_mul(1u64 << shift)
            }
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageBusConfig {
    /// RabbitMQ management API base URL, e.g. `http://localhost:15672`.
    pub url: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default = "default_metric_data_queue")]
    pub queue: String,
    /// Samples per published message.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_vhost() -> String {
    "/".into()
}

fn default_metric_data_queue() -> String {
    "taurus.metric.custom.data".into()
}

fn default_batch_size() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlusherConfig {
    #[serde(default = "default_flusher_prefix")]
    pub metric_prefix: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_flush_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_flusher_prefix() -> String {
    "TAURUS.DATA-PATH-FLUSHER.".into()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_flush_timeout_secs() -> u64 {
    900
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self {
            metric_prefix: default_flusher_prefix(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_flush_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    /// Ask the operator before deleting companies.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_confirmation_timeout_secs() -> u64 {
    30
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_confirmation_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.api.host.is_empty(), "api.host must be non-empty");
        anyhow::ensure!(
            !self.api.host.contains("://"),
            "api.host must be a bare host (scheme is always https), got {}",
            self.api.host
        );
        anyhow::ensure!(!self.api.api_key.is_empty(), "api.api_key must be non-empty");
        anyhow::ensure!(
            self.retry.max_attempts > 0,
            "retry.max_attempts must be > 0, got {}",
            self.retry.max_attempts
        );
        anyhow::ensure!(
            self.retry.max_delay_ms >= self.retry.base_delay_ms,
            "retry.max_delay_ms must be >= retry.base_delay_ms, got {} < {}",
            self.retry.max_delay_ms,
            self.retry.base_delay_ms
        );
        anyhow::ensure!(
            !self.message_bus.url.is_empty(),
            "message_bus.url must be non-empty"
        );
        anyhow::ensure!(
            !self.message_bus.queue.is_empty(),
            "message_bus.queue must be non-empty"
        );
        anyhow::ensure!(
            self.message_bus.batch_size > 0,
            "message_bus.batch_size must be > 0, got {}",
            self.message_bus.batch_size
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            !self.flusher.metric_prefix.is_empty(),
            "flusher.metric_prefix must be non-empty"
        );
        anyhow::ensure!(
            self.flusher.poll_interval_secs > 0,
            "flusher.poll_interval_secs must be > 0, got {}",
            self.flusher.poll_interval_secs
        );
        anyhow::ensure!(
            self.flusher.timeout_secs >= self.flusher.poll_interval_secs,
            "flusher.timeout_secs must be >= flusher.poll_interval_secs, got {}",
            self.flusher.timeout_secs
        );
        anyhow::ensure!(
            self.confirmation.timeout_secs > 0,
            "confirmation.timeout_secs must be > 0, got {}",
            self.confirmation.timeout_secs
        );
        anyhow::ensure!(!self.catalog_path.is_empty(), "catalog_path must be non-empty");
        Ok(())
    }
}

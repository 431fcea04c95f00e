// Data-path flush barrier.
//
// The metric pipeline offers no "flush" call, so we push a sentinel sample
// (`<prefix><ordinal>`) through the same queue as the real samples and wait until the
// monitoring server registers it. Queue delivery is FIFO per producer, so once the sentinel
// shows up every sample we published before it has been consumed. Older sentinels left by
// crashed runs are deleted as they are seen.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::api_client::MonitoringApi;
use crate::config::FlusherConfig;
use crate::error::{CollectorError, Result};
use crate::publisher::{MessageBus, with_batch_writer};

/// Last ordinal handed out by this process.
static LAST_ORDINAL: AtomicU64 = AtomicU64::new(0);

/// Wall-clock microseconds, bumped past anything already issued in-process.
fn next_ordinal() -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);
    let prev = LAST_ORDINAL
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(0);
    now.max(prev + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushState {
    Sent,
    Polling,
    Confirmed,
    TimedOut,
    GcDone,
}

/// Result of a confirmed flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub sentinel: String,
    /// Registry polls made, including the one that saw the sentinel.
    pub polls: u32,
    /// Stale sentinels from earlier runs that were deleted.
    pub collected: Vec<String>,
}

pub struct DataPathFlusher {
    api: Arc<dyn MonitoringApi>,
    bus: Arc<dyn MessageBus>,
    queue: String,
    batch_size: usize,
    prefix: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl DataPathFlusher {
    pub fn new(
        api: Arc<dyn MonitoringApi>,
        bus: Arc<dyn MessageBus>,
        queue: impl Into<String>,
        batch_size: usize,
        config: &FlusherConfig,
    ) -> Self {
        Self {
            api,
            bus,
            queue: queue.into(),
            batch_size,
            prefix: config.metric_prefix.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn sentinel_name(&self, ordinal: u64) -> String {
        format!("{}{}", self.prefix, ordinal)
    }

    /// Ordinal of a sentinel metric name; `None` for anything else.
    pub fn sentinel_ordinal(&self, metric_name: &str) -> Option<u64> {
        metric_name.strip_prefix(&self.prefix)?.parse().ok()
    }

    /// Pushes a fresh sentinel through the pipeline and waits for it to come out the other end.
    /// `FlusherMetricNotFound` means the pipeline could not be shown to be drained.
    #[instrument(skip(self), fields(prefix = %self.prefix))]
    pub async fn flush_and_garbage_collect(&self) -> Result<FlushReport> {
        // The timeout covers the publish as well as the polling.
        let deadline = Instant::now() + self.timeout;
        let sentinel = self.sentinel_name(next_ordinal());
        self.inject_sentinel(&sentinel).await?;
        info!(sentinel = %sentinel, "data path sentinel published");
        self.poll_until(&sentinel, deadline).await
    }

    async fn inject_sentinel(&self, sentinel: &str) -> Result<()> {
        let name = sentinel.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        with_batch_writer(
            self.bus.clone(),
            &self.queue,
            self.batch_size,
            move |writer| Box::pin(async move { writer.put(&name, 0.0, timestamp).await }),
        )
        .await
    }

    /// Polls the registry until `sentinel` appears (then deletes it) or the timeout elapses.
    #[instrument(skip(self), fields(timeout_secs = self.timeout.as_secs()))]
    pub async fn wait_for_sentinel_and_garbage_collect(&self, sentinel: &str) -> Result<FlushReport> {
        self.poll_until(sentinel, Instant::now() + self.timeout)
            .await
    }

    async fn poll_until(&self, sentinel: &str, deadline: Instant) -> Result<FlushReport> {
        let target = self.sentinel_ordinal(sentinel).ok_or_else(|| {
            CollectorError::InvalidFilter(format!("{} is not a flusher metric name", sentinel))
        })?;

        let mut polls: u32 = 0;
        let mut collected = Vec::new();
        let mut state = FlushState::Sent;

        loop {
            state = match state {
                FlushState::Sent => FlushState::Polling,
                FlushState::Polling => {
                    polls += 1;
                    let roster = self.api.list_custom_metrics().await?;
                    let mut found = false;
                    for metric in &roster {
                        if metric.name == sentinel {
                            found = true;
                        } else if let Some(ordinal) = self.sentinel_ordinal(&metric.name)
                            && ordinal < target
                        {
                            match self.api.delete_metric(&metric.name).await {
                                Ok(()) => {
                                    info!(stale = %metric.name, "stale flusher metric deleted");
                                    collected.push(metric.name.clone());
                                }
                                Err(e) => {
                                    warn!(stale = %metric.name, error = %e, "failed to delete stale flusher metric");
                                }
                            }
                        }
                    }

                    if found {
                        FlushState::Confirmed
                    } else {
                        let now = Instant::now();
                        if now >= deadline {
                            FlushState::TimedOut
                        } else {
                            debug!(polls, "flusher metric not registered yet");
                            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
                            FlushState::Polling
                        }
                    }
                }
                FlushState::Confirmed => {
                    self.api.delete_metric(sentinel).await?;
                    FlushState::GcDone
                }
                FlushState::TimedOut => {
                    warn!(polls, sentinel, "flusher metric never registered");
                    return Err(CollectorError::FlusherMetricNotFound {
                        metric: sentinel.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
                FlushState::GcDone => {
                    info!(polls, collected = collected.len(), "data path flushed");
                    return Ok(FlushReport {
                        sentinel: sentinel.to_string(),
                        polls,
                        collected,
                    });
                }
            };
        }
    }
}

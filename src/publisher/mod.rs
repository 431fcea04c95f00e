// Batched metric sample publishing onto the metric data queue.
// Samples are buffered and sent as one `{"protocol":"plain","data":[...]}` message per batch.
// The final partial batch goes out when the publisher is closed.

pub mod rabbitmq;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::{CollectorError, Result};
use crate::models::{MetricDataMessage, MetricSample};

pub use rabbitmq::RabbitMqHttpBus;

/// Asynchronous message channel. Messages from one producer are delivered in publish order.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, queue: &str, body: &str, persistent: bool) -> Result<()>;

    /// Releases the underlying connection.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Totals for one publisher session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub samples: u64,
    pub batches: u64,
}

pub struct BatchedSamplePublisher {
    bus: Arc<dyn MessageBus>,
    queue: String,
    batch_size: usize,
    buffer: Vec<MetricSample>,
    stats: PublishStats,
    closed: bool,
}

impl BatchedSamplePublisher {
    pub fn open(bus: Arc<dyn MessageBus>, queue: impl Into<String>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            bus,
            queue: queue.into(),
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            stats: PublishStats::default(),
            closed: false,
        }
    }

    /// Buffers one sample; publishes the whole buffer once it reaches the batch size.
    /// A buffer still full from a failed publish is retried first, so no message
    /// exceeds the batch size; if that retry fails the new sample is not buffered.
    pub async fn put(&mut self, metric: &str, value: f64, timestamp: i64) -> Result<()> {
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        self.buffer.push(MetricSample::new(metric, value, timestamp));
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let message = MetricDataMessage::from_samples(&self.buffer);
        let body =
            serde_json::to_string(&message).map_err(|e| CollectorError::Publish(e.to_string()))?;
        self.bus.publish(&self.queue, &body, true).await?;
        let n = self.buffer.len();
        self.buffer.clear();
        self.stats.samples += n as u64;
        self.stats.batches += 1;
        debug!(
            queue = %self.queue,
            samples_count = n,
            "metric data batch published"
        );
        Ok(())
    }

    /// Publishes whatever is still buffered, then releases the bus connection.
    pub async fn close(mut self) -> Result<PublishStats> {
        let flushed = self.flush().await;
        self.closed = true;
        let released = self.bus.close().await;
        flushed?;
        released?;
        Ok(self.stats)
    }
}

impl Drop for BatchedSamplePublisher {
    fn drop(&mut self) {
        if !self.closed && !self.buffer.is_empty() {
            warn!(
                queue = %self.queue,
                dropped_samples = self.buffer.len(),
                "publisher dropped without close; buffered samples were not published"
            );
        }
    }
}

/// Scoped publisher: runs `body`, then closes the publisher whether `body` succeeded or not.
/// An error from `body` wins over an error from the final flush.
///
/// `body` must own what it captures (the future may outlive any borrow passed in).
pub async fn with_batch_writer<T, F>(
    bus: Arc<dyn MessageBus>,
    queue: &str,
    batch_size: usize,
    body: F,
) -> Result<T>
where
    F: for<'w> FnOnce(&'w mut BatchedSamplePublisher) -> BoxFuture<'w, Result<T>>,
{
    let mut writer = BatchedSamplePublisher::open(bus, queue, batch_size);
    let outcome = body(&mut writer).await;
    let closed = writer.close().await;
    match (outcome, closed) {
        (Ok(value), Ok(_)) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "final flush failed after writer body error");
            Err(e)
        }
        (Err(e), Ok(_)) => Err(e),
    }
}

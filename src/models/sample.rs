// Metric samples and the wire message carrying a batch of them.

use serde::{Deserialize, Serialize};

/// Wire protocol tag understood by the metric data consumer.
pub const PLAIN_PROTOCOL: &str = "plain";

/// One data point for a custom metric. Timestamp is epoch seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric: String,
    pub value: f64,
    pub timestamp: i64,
}

impl MetricSample {
    pub fn new(metric: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            metric: metric.into(),
            value,
            timestamp,
        }
    }

    /// `"<metric> <value> <timestamp>"`. Values keep a fractional part (`3.0`, not `3`).
    pub fn to_line(&self) -> String {
        format!("{} {:?} {}", self.metric, self.value, self.timestamp)
    }
}

/// One published message: a whole batch, serialized atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataMessage {
    pub protocol: String,
    pub data: Vec<String>,
}

impl MetricDataMessage {
    pub fn from_samples(samples: &[MetricSample]) -> Self {
        Self {
            protocol: PLAIN_PROTOCOL.to_string(),
            data: samples.iter().map(MetricSample::to_line).collect(),
        }
    }
}

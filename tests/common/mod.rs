// Shared test helpers: an in-memory monitoring server that is also the message bus feeding it.
// Metrics published on the bus become visible in the registry after a configurable number of polls.

#![allow(dead_code)]

use async_trait::async_trait;
use metric_collectors::api_client::MonitoringApi;
use metric_collectors::collector_repo::CollectorRepo;
use metric_collectors::config::{BackoffStrategy, FlusherConfig, RetryConfig};
use metric_collectors::error::{CollectorError, Result};
use metric_collectors::models::{
    CreateModelRequest, CustomMetric, MetricDataMessage, MetricsCatalog, ModelDescriptor,
};
use metric_collectors::publisher::MessageBus;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;

pub const FLUSHER_PREFIX: &str = "TEST.FLUSHER.";

#[derive(Debug, Clone)]
pub struct Published {
    pub queue: String,
    pub persistent: bool,
    pub message: MetricDataMessage,
}

#[derive(Default)]
pub struct State {
    /// Live custom metrics, in registration order.
    pub registry: Vec<String>,
    /// Published but not yet registered.
    pub pending: Vec<String>,
    /// Pending metrics land once this many registry polls have happened.
    pub register_after_polls: usize,
    /// Pipeline swallows everything (never registers).
    pub stalled: bool,
    pub list_calls: usize,
    pub deleted: Vec<String>,
    pub delete_calls: Vec<String>,
    pub not_found: HashSet<String>,
    pub published: Vec<Published>,
    pub fail_publish: bool,
    pub bus_closes: usize,
    pub created: Vec<CreateModelRequest>,
    pub quota_exceeded_on: Option<String>,
    /// Names that join the registry on the given (1-based) registry poll.
    pub appear_on_poll: Vec<(usize, String)>,
    /// Time each publish takes before it is accepted.
    pub publish_delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeServer {
    state: Mutex<State>,
}

impl FakeServer {
    pub fn with_registry(names: &[&str]) -> Self {
        let server = Self::default();
        server.state().registry = names.iter().map(|s| s.to_string()).collect();
        server
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl MonitoringApi for FakeServer {
    fn server(&self) -> &str {
        "fake-server"
    }

    async fn create_model(&self, request: &CreateModelRequest) -> Result<ModelDescriptor> {
        let mut state = self.state();
        let metric = request.metric_spec.metric.clone();
        if state.quota_exceeded_on.as_deref() == Some(metric.as_str()) {
            return Err(CollectorError::ModelQuotaExceeded(
                "Server limit exceeded".into(),
            ));
        }
        state.created.push(request.clone());
        Ok(ModelDescriptor {
            uid: format!("uid-{}", metric),
            name: Some(metric),
            extra: Default::default(),
        })
    }

    async fn get_model(&self, uid: &str) -> Result<ModelDescriptor> {
        Ok(ModelDescriptor {
            uid: uid.to_string(),
            name: None,
            extra: Default::default(),
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(vec![])
    }

    async fn list_custom_metrics(&self) -> Result<Vec<CustomMetric>> {
        let mut state = self.state();
        state.list_calls += 1;
        let poll = state.list_calls;
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut state.appear_on_poll)
            .into_iter()
            .partition(|(on, _)| *on <= poll);
        state.appear_on_poll = later;
        state.registry.extend(due.into_iter().map(|(_, name)| name));
        if !state.stalled && state.list_calls > state.register_after_polls {
            let pending = std::mem::take(&mut state.pending);
            state.registry.extend(pending);
        }
        Ok(state
            .registry
            .iter()
            .map(|name| CustomMetric {
                name: name.clone(),
                uid: None,
            })
            .collect())
    }

    async fn delete_model(&self, _uid: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_metric(&self, metric_name: &str) -> Result<()> {
        let mut state = self.state();
        state.delete_calls.push(metric_name.to_string());
        if state.not_found.contains(metric_name) {
            return Err(CollectorError::MetricNotFound("metric not found".into()));
        }
        state.registry.retain(|n| n != metric_name);
        state.deleted.push(metric_name.to_string());
        Ok(())
    }
}

#[async_trait]
impl MessageBus for FakeServer {
    async fn publish(&self, queue: &str, body: &str, persistent: bool) -> Result<()> {
        let delay = self.state().publish_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        if state.fail_publish {
            return Err(CollectorError::Publish("broker unavailable".into()));
        }
        let message: MetricDataMessage = serde_json::from_str(body).unwrap();
        for line in &message.data {
            let name = line.split(' ').next().unwrap().to_string();
            if !state.registry.contains(&name) && !state.pending.contains(&name) {
                state.pending.push(name);
            }
        }
        state.published.push(Published {
            queue: queue.to_string(),
            persistent,
            message,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state().bus_closes += 1;
        Ok(())
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 1,
        backoff: BackoffStrategy::Linear,
        max_delay_ms: 5,
    }
}

pub fn flusher_config(poll_interval_secs: u64, timeout_secs: u64) -> FlusherConfig {
    FlusherConfig {
        metric_prefix: FLUSHER_PREFIX.into(),
        poll_interval_secs,
        timeout_secs,
    }
}

pub async fn temp_repo() -> (TempDir, CollectorRepo) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("collectors.db");
    let repo = CollectorRepo::connect(path.to_str().unwrap(), 2).await.unwrap();
    repo.init().await.unwrap();
    (dir, repo)
}

pub const CATALOG_JSON: &str = r#"
{
  "3M": {
    "metrics": {
      "TWITTER.TWEET.HANDLE.MMM.VOLUME": {
        "metricType": "TwitterVolume",
        "metricTypeName": "Twitter Volume",
        "modelParams": { "minResolution": 0.6 },
        "provider": "twitter",
        "screenNames": ["3M"]
      },
      "XIGNITE.MMM.VOLUME": {
        "metricType": "StockVolume",
        "metricTypeName": "Stock Volume",
        "modelParams": { "minResolution": 0.2 },
        "provider": "xignite",
        "sampleKey": "Volume"
      }
    },
    "stockExchange": "NYSE",
    "symbol": "MMM"
  },
  "ACE Ltd": {
    "metrics": {
      "TWITTER.TWEET.HANDLE.ACE.VOLUME": {
        "metricType": "TwitterVolume",
        "metricTypeName": "Twitter Volume",
        "modelParams": { "minResolution": 0.6 },
        "provider": "twitter",
        "screenNames": []
      },
      "XIGNITE.ACE.CLOSINGPRICE": {
        "metricType": "StockPrice",
        "metricTypeName": "Stock Price",
        "modelParams": { "minResolution": 0.2 },
        "provider": "xignite",
        "sampleKey": "Close"
      }
    },
    "stockExchange": "NYSE",
    "symbol": "ACE"
  },
  "Acme Feeds": {
    "metrics": {
      "TWITTER.TWEET.HANDLE.ACMF.VOLUME": {
        "metricType": "TwitterVolume",
        "metricTypeName": "Twitter Volume",
        "provider": "twitter",
        "screenNames": ["acme"]
      }
    },
    "stockExchange": "NASDAQ",
    "symbol": "ACMF"
  }
}
"#;

pub fn catalog() -> MetricsCatalog {
    MetricsCatalog::from_json_str(CATALOG_JSON).unwrap()
}

// Monitoring API client (models + custom metrics) with retry/backoff.
// Every request carries basic auth (user = API key, empty password); TLS verification stays on.

pub mod retry;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::config::RetryConfig;
use crate::error::{CollectorError, Result};
use crate::models::{CreateModelRequest, CustomMetric, ModelDescriptor};
use crate::version::user_agent;
use retry::{AttemptError, with_retries};

/// Body marker the server uses when no more models may be created.
const QUOTA_EXCEEDED_MARKER: &str = "Server limit exceeded";

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Operations the collectors need from the monitoring server.
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// Server identity used in logs and operator prompts.
    fn server(&self) -> &str;

    async fn create_model(&self, request: &CreateModelRequest) -> Result<ModelDescriptor>;

    async fn get_model(&self, uid: &str) -> Result<ModelDescriptor>;

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>>;

    async fn list_model_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .list_models()
            .await?
            .into_iter()
            .map(|m| m.uid)
            .collect())
    }

    /// Live custom-metric registry.
    async fn list_custom_metrics(&self) -> Result<Vec<CustomMetric>>;

    async fn delete_model(&self, uid: &str) -> Result<()>;

    /// Stops monitoring (deletes the model) but leaves the metric registered.
    async fn unmonitor_metric(&self, uid: &str) -> Result<()> {
        self.delete_model(uid).await
    }

    /// Removes the metric, its model and its stored data. `MetricNotFound` if unknown.
    async fn delete_metric(&self, metric_name: &str) -> Result<()>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl ApiClient {
    /// Client for `https://<host>`.
    pub fn new(host: &str, api_key: impl Into<String>, retry: RetryConfig) -> Result<Self> {
        Self::with_base_url(format!("https://{}", host), api_key, retry)
    }

    /// Client for an explicit base URL (scheme included).
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<(StatusCode, String), AttemptError> {
        let response = request
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("request error: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(format!("read body: {}", e)))?;
        Ok((status, body))
    }

    /// GET `path`, expect 200, decode JSON body.
    async fn get_json<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T> {
        let url = self.url(path);
        let (this, url) = (self, url.as_str());
        with_retries(&self.retry, operation, move || async move {
            let (status, body) = this.execute(this.http.get(url)).await?;
            if status != StatusCode::OK {
                return Err(unexpected_status(status, &body));
            }
            decode(&body)
        })
        .await
    }
}

fn unexpected_status(status: StatusCode, body: &str) -> AttemptError {
    AttemptError::Transient(format!("unexpected status {}: {}", status, body))
}

fn decode<T: DeserializeOwned>(body: &str) -> std::result::Result<T, AttemptError> {
    serde_json::from_str(body).map_err(|e| AttemptError::Transient(format!("decode: {}", e)))
}

/// Model endpoints answer with a JSON array; the model is its first element.
fn first_model(body: &str) -> std::result::Result<ModelDescriptor, AttemptError> {
    let mut models: Vec<ModelDescriptor> = decode(body)?;
    if models.is_empty() {
        return Err(AttemptError::Transient("empty model list in response".into()));
    }
    Ok(models.swap_remove(0))
}

#[async_trait]
impl MonitoringApi for ApiClient {
    fn server(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, request), fields(api = "models", operation = "create_model", metric = %request.metric_spec.metric))]
    async fn create_model(&self, request: &CreateModelRequest) -> Result<ModelDescriptor> {
        let url = self.url("/_models");
        let (this, url) = (self, url.as_str());
        let model = with_retries(&self.retry, "create_model", move || async move {
            let (status, body) = this.execute(this.http.post(url).json(request)).await?;
            if status == StatusCode::CREATED {
                // The model exists now; resending the POST would create another.
                return first_model(&body).map_err(|e| match e {
                    AttemptError::Transient(msg) => {
                        AttemptError::Fatal(CollectorError::UnexpectedResponse(msg))
                    }
                    fatal => fatal,
                });
            }
            if body.contains(QUOTA_EXCEEDED_MARKER) {
                return Err(AttemptError::Fatal(CollectorError::ModelQuotaExceeded(body)));
            }
            Err(unexpected_status(status, &body))
        })
        .await?;
        info!(uid = %model.uid, "model created");
        Ok(model)
    }

    #[instrument(skip(self), fields(api = "models", operation = "get_model"))]
    async fn get_model(&self, uid: &str) -> Result<ModelDescriptor> {
        let url = self.url(&format!("/_models/{}", uid));
        let (this, url) = (self, url.as_str());
        with_retries(&self.retry, "get_model", move || async move {
            let (status, body) = this.execute(this.http.get(url)).await?;
            if status != StatusCode::OK {
                return Err(unexpected_status(status, &body));
            }
            first_model(&body)
        })
        .await
    }

    #[instrument(skip(self), fields(api = "models", operation = "list_models"))]
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        self.get_json("list_models", "/_models").await
    }

    #[instrument(skip(self), fields(api = "metrics", operation = "list_custom_metrics"))]
    async fn list_custom_metrics(&self) -> Result<Vec<CustomMetric>> {
        self.get_json("list_custom_metrics", "/_metrics/custom")
            .await
    }

    #[instrument(skip(self), fields(api = "models", operation = "delete_model"))]
    async fn delete_model(&self, uid: &str) -> Result<()> {
        let url = self.url(&format!("/_models/{}", uid));
        let (this, url) = (self, url.as_str());
        with_retries(&self.retry, "delete_model", move || async move {
            let (status, body) = this.execute(this.http.delete(url)).await?;
            if status != StatusCode::OK {
                return Err(unexpected_status(status, &body));
            }
            Ok(())
        })
        .await?;
        debug!("model deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(api = "metrics", operation = "delete_metric"))]
    async fn delete_metric(&self, metric_name: &str) -> Result<()> {
        let url = self.url(&format!("/_metrics/custom/{}", metric_name));
        let (this, url) = (self, url.as_str());
        with_retries(&self.retry, "delete_metric", move || async move {
            let (status, body) = this.execute(this.http.delete(url)).await?;
            match status {
                StatusCode::OK => Ok(()),
                StatusCode::NOT_FOUND => {
                    Err(AttemptError::Fatal(CollectorError::MetricNotFound(body)))
                }
                _ => Err(unexpected_status(status, &body)),
            }
        })
        .await?;
        info!("metric deleted");
        Ok(())
    }
}

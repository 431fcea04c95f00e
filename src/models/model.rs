// Monitoring API payloads: model descriptors, create requests, registry roster entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model as returned by the monitoring API. Only `uid` is interpreted; every
/// other field is kept as-is so callers can inspect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of the live custom-metric registry (`GET /_metrics/custom`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMetric {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricUserInfo {
    pub metric_type: String,
    pub metric_type_name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub metric: String,
    pub resource: String,
    #[serde(rename = "userInfo")]
    pub user_info: MetricUserInfo,
}

/// Body of `POST /_models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModelRequest {
    pub datasource: String,
    pub metric_spec: MetricSpec,
    pub model_params: Value,
}

impl CreateModelRequest {
    pub fn custom(metric_spec: MetricSpec, model_params: Value) -> Self {
        Self {
            datasource: "custom".to_string(),
            metric_spec,
            model_params,
        }
    }
}

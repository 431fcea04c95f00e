// Known companies and their metrics, as shipped in the metrics configuration JSON.
// Iteration order is stable (sorted by company, then metric name).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfig {
    pub metric_type: String,
    pub metric_type_name: String,
    pub provider: String,
    #[serde(default)]
    pub model_params: Value,
    /// Twitter provider only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_names: Option<Vec<String>>,
    /// Xignite provider only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyConfig {
    pub symbol: String,
    pub stock_exchange: String,
    pub metrics: BTreeMap<String, MetricConfig>,
}

/// A catalog entry resolved for one metric name.
#[derive(Debug, Clone, Copy)]
pub struct CatalogMetric<'a> {
    pub name: &'a str,
    pub company: &'a str,
    pub symbol: &'a str,
    pub config: &'a MetricConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsCatalog {
    companies: BTreeMap<String, CompanyConfig>,
}

impl MetricsCatalog {
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&s)
    }

    pub fn companies(&self) -> impl Iterator<Item = (&str, &CompanyConfig)> {
        self.companies.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn metrics(&self) -> impl Iterator<Item = CatalogMetric<'_>> {
        self.companies.iter().flat_map(|(company, c)| {
            c.metrics.iter().map(move |(name, config)| CatalogMetric {
                name,
                company,
                symbol: &c.symbol,
                config,
            })
        })
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics().map(|m| m.name.to_string()).collect()
    }

    pub fn find(&self, metric_name: &str) -> Option<CatalogMetric<'_>> {
        self.metrics().find(|m| m.name == metric_name)
    }

    /// `(symbol, exchange)` for every company.
    pub fn all_securities(&self) -> Vec<(String, String)> {
        self.companies
            .values()
            .map(|c| (c.symbol.clone(), c.stock_exchange.clone()))
            .collect()
    }

    /// `(symbol, exchange)` for companies with at least one metric from `provider`.
    pub fn symbols_for_provider(&self, provider: &str) -> Vec<(String, String)> {
        self.companies
            .values()
            .filter(|c| c.metrics.values().any(|m| m.provider == provider))
            .map(|c| (c.symbol.clone(), c.stock_exchange.clone()))
            .collect()
    }
}

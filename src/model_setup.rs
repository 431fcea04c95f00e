// Model provisioning for catalog metrics.

use std::collections::{BTreeSet, HashSet};

use tracing::{info, instrument};

use crate::api_client::MonitoringApi;
use crate::error::{CollectorError, Result};
use crate::models::{
    CatalogMetric, CreateModelRequest, MetricSpec, MetricUserInfo, MetricsCatalog,
    ModelDescriptor,
};

/// Rejects an empty filter, duplicate names, or names missing from the catalog.
pub fn validate_metric_filter(catalog: &MetricsCatalog, only_metric_names: &[String]) -> Result<()> {
    if only_metric_names.is_empty() {
        return Err(CollectorError::InvalidFilter(
            "metric name filter is empty".into(),
        ));
    }

    let unique: HashSet<&str> = only_metric_names.iter().map(String::as_str).collect();
    if unique.len() != only_metric_names.len() {
        return Err(CollectorError::InvalidFilter(
            "metric name filter contains duplicates".into(),
        ));
    }

    let known: HashSet<String> = catalog.metric_names().into_iter().collect();
    let unknown: BTreeSet<&str> = unique
        .into_iter()
        .filter(|name| !known.contains(*name))
        .collect();
    if !unknown.is_empty() {
        return Err(CollectorError::InvalidFilter(format!(
            "elements in metric name filter are not in metrics configuration: {:?}",
            unknown
        )));
    }
    Ok(())
}

pub fn create_model_request(metric: &CatalogMetric<'_>) -> CreateModelRequest {
    CreateModelRequest::custom(
        MetricSpec {
            metric: metric.name.to_string(),
            resource: metric.company.to_string(),
            user_info: MetricUserInfo {
                metric_type: metric.config.metric_type.clone(),
                metric_type_name: metric.config.metric_type_name.clone(),
                symbol: metric.symbol.to_string(),
            },
        },
        metric.config.model_params.clone(),
    )
}

/// Creates one model per catalog metric (or per name in `only_metric_names`), in catalog order.
/// The filter is checked before any request; the first failed creation stops the batch and
/// models created so far are left in place.
#[instrument(skip_all, fields(filtered = only_metric_names.is_some()))]
pub async fn create_all_models(
    api: &dyn MonitoringApi,
    catalog: &MetricsCatalog,
    only_metric_names: Option<&[String]>,
) -> Result<Vec<ModelDescriptor>> {
    let wanted: Option<HashSet<&str>> = match only_metric_names {
        Some(names) => {
            validate_metric_filter(catalog, names)?;
            Some(names.iter().map(String::as_str).collect())
        }
        None => None,
    };

    let mut created = Vec::new();
    for metric in catalog.metrics() {
        if let Some(wanted) = &wanted
            && !wanted.contains(metric.name)
        {
            continue;
        }
        let model = api.create_model(&create_model_request(&metric)).await?;
        info!(metric = metric.name, uid = %model.uid, "model enabled");
        created.push(model);
    }
    info!(models = created.len(), "models created");
    Ok(created)
}

// Domain models

mod catalog;
mod model;
mod sample;

pub use catalog::{CatalogMetric, CompanyConfig, MetricConfig, MetricsCatalog};
pub use model::{CreateModelRequest, CustomMetric, MetricSpec, MetricUserInfo, ModelDescriptor};
pub use sample::{MetricDataMessage, MetricSample, PLAIN_PROTOCOL};

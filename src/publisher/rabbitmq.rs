// RabbitMQ publish through the management HTTP API (default exchange, routing key = queue).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::MessageBus;
use crate::config::MessageBusConfig;
use crate::error::{CollectorError, Result};

const DELIVERY_MODE_PERSISTENT: u8 = 2;
const DELIVERY_MODE_TRANSIENT: u8 = 1;

#[derive(Debug, Serialize)]
struct PublishProperties {
    delivery_mode: u8,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    properties: PublishProperties,
    routing_key: &'a str,
    payload: &'a str,
    payload_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

pub struct RabbitMqHttpBus {
    http: reqwest::Client,
    publish_url: String,
    username: String,
    password: String,
}

impl RabbitMqHttpBus {
    pub fn new(config: &MessageBusConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let vhost = config.vhost.replace('/', "%2F");
        Ok(Self {
            http,
            publish_url: format!(
                "{}/api/exchanges/{}/amq.default/publish",
                config.url.trim_end_matches('/'),
                vhost
            ),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl MessageBus for RabbitMqHttpBus {
    #[instrument(skip(self, body), fields(bus = "rabbitmq", body_len = body.len()))]
    async fn publish(&self, queue: &str, body: &str, persistent: bool) -> Result<()> {
        let request = PublishRequest {
            properties: PublishProperties {
                delivery_mode: if persistent {
                    DELIVERY_MODE_PERSISTENT
                } else {
                    DELIVERY_MODE_TRANSIENT
                },
            },
            routing_key: queue,
            payload: body,
            payload_encoding: "string",
        };
        let response = self
            .http
            .post(&self.publish_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CollectorError::Publish(format!(
                "status {}: {}",
                status, text
            )));
        }
        let published: PublishResponse = response.json().await?;
        if !published.routed {
            return Err(CollectorError::Publish(format!(
                "message not routed to queue {}",
                queue
            )));
        }
        Ok(())
    }
}

//! Webhook delivery of finished-job results.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use super::{JobDelivery, ResultsSink};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts the delivery payload as JSON to a fixed endpoint. Delivery is
/// best-effort; callers log failures and move on.
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ResultsSink for WebhookSink {
    async fn deliver(&self, delivery: &JobDelivery) -> anyhow::Result<()> {
        let response = self
            .http
            .post(&self.url)
            .timeout(DELIVERY_TIMEOUT)
            .json(delivery)
            .send()
            .await
            .context("webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("webhook returned {status}");
        }
        debug!(job_id = %delivery.job_id, "results delivered");
        Ok(())
    }
}

use async_trait::async_trait;
use reqwest::Client;

use crate::{error::SinkError, models::NotificationJob};

/// Hands a job to whatever actually notifies the user. Implementations may
/// block or fail; the dispatcher bounds and retries every call.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, job: &NotificationJob) -> Result<(), SinkError>;
}

/// Used when no webhook is configured.
#[derive(Clone, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, job: &NotificationJob) -> Result<(), SinkError> {
        tracing::info!(
            alert_id = %job.alert_id.to_hex(),
            listing_id = %job.listing_id,
            owner_id = %job.owner_id,
            title = %job.listing.title,
            "deal matched"
        );
        Ok(())
    }
}

/// POSTs each job as JSON to an external notifier.
#[derive(Clone)]
pub struct WebhookSink {
    http: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            http: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, job: &NotificationJob) -> Result<(), SinkError> {
        let body = serde_json::json!({
            "alertId": job.alert_id.to_hex(),
            "listingId": job.listing_id,
            "ownerId": job.owner_id,
            "firstMatchedAt": job.first_matched_at,
            "listing": job.listing,
        });

        let res = self
            .http
            .post(&self.url)
            // receivers can dedupe retried handoffs on this
            .header("Idempotency-Key", format!("{}:{}", job.alert_id.to_hex(), job.listing_id))
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(SinkError::Rejected { status, body });
        }
        Ok(())
    }
}

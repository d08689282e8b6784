//! SQS-backed [`Publish`], grounded on
//! `original_source/antenna/ext/sqs/crashpublish.py` (`SQSCrashPublish`).

use async_trait::async_trait;
use aws_sdk_sqs::Client;

use crate::health::HealthCheck;
use crate::sink::Publish;

pub struct SqsPublish {
    client: Client,
    queue_url: String,
}

impl SqsPublish {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl Publish for SqsPublish {
    async fn publish(&self, crash_id: &str) -> anyhow::Result<()> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(crash_id)
            .send()
            .await?;
        Ok(())
    }

    /// Publish the literal probe message `"test"` (spec.md §4.4). Downstream
    /// consumers are required to discard this reserved payload on sight.
    async fn verify_topic(&self) -> anyhow::Result<()> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body("test")
            .send()
            .await?;
        Ok(())
    }

    async fn check_health(&self) -> anyhow::Result<()> {
        self.client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for SqsPublish {
    fn name(&self) -> &'static str {
        "crashpublish"
    }

    async fn check_health(&self) -> anyhow::Result<()> {
        Publish::check_health(self).await
    }
}

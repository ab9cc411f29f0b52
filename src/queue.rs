//! Long-poll receive, delete, and message-body access over the cloud
//! queue API. Grounded in the original source's thin `SQS` wrapper
//! (`aws/sqsconsumer.go`), generalized to a trait so the pipeline and its
//! tests don't depend on a live queue.

use async_trait::async_trait;
use aws_sdk_sqs::Client;

use crate::errors::QueueError;

/// The long-poll receive batch size the original source hardcodes
/// (`MaxNumberOfMessages`); kept fixed rather than exposed in
/// configuration (resolved as a non-configurable default, see DESIGN.md).
pub const SQS_BATCH_MAX: i32 = 10;
pub const SQS_WAIT_TIME_SECONDS: i32 = 20;

#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message_id: String,
    pub body: String,
    pub receipt_handle: String,
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn receive_messages(&self) -> Result<Vec<RawMessage>, QueueError>;
    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueError>;
    fn url(&self) -> &str;
}

pub struct SqsQueueClient {
    client: Client,
    queue_url: String,
}

impl SqsQueueClient {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn receive_messages(&self) -> Result<Vec<RawMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(SQS_BATCH_MAX)
            .wait_time_seconds(SQS_WAIT_TIME_SECONDS)
            .send()
            .await
            .map_err(|err| QueueError::Receive(err.to_string()))?;

        Ok(output
            .messages()
            .iter()
            .filter_map(|message| {
                let body = message.body()?.to_string();
                let receipt_handle = message.receipt_handle()?.to_string();
                let message_id = message.message_id().unwrap_or_default().to_string();
                Some(RawMessage {
                    message_id,
                    body,
                    receipt_handle,
                })
            })
            .collect())
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|err| QueueError::Delete(err.to_string()))?;
        Ok(())
    }

    fn url(&self) -> &str {
        &self.queue_url
    }
}

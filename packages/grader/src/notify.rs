use std::sync::Arc;

use async_trait::async_trait;
use common::completion::ChallengeCompletedEvent;
use mq::{Mq, publish_message};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to publish completion event: {0}")]
    Publish(String),
}

impl From<mq::MqError> for NotifyError {
    fn from(e: mq::MqError) -> Self {
        NotifyError::Publish(e.to_string())
    }
}

/// Destination for challenge-completed events.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn publish(&self, event: &ChallengeCompletedEvent) -> Result<(), NotifyError>;
}

/// Publishes completion events to a broccoli queue.
pub struct MqCompletionSink {
    mq: Arc<Mq>,
    queue: String,
}

impl MqCompletionSink {
    pub fn new(mq: Arc<Mq>, queue: impl Into<String>) -> Self {
        Self {
            mq,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl CompletionSink for MqCompletionSink {
    async fn publish(&self, event: &ChallengeCompletedEvent) -> Result<(), NotifyError> {
        publish_message(&self.mq, &self.queue, event).await?;
        Ok(())
    }
}

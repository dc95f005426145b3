pub use broccoli_queue::{
    brokers::broker::BrokerMessage, error::BroccoliError, queue::BroccoliQueue,
};
use common::mq::Message;
use tracing::debug;

use crate::error::MqError;

pub type MqQueue = BroccoliQueue;

pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
}

pub async fn init_mq(config: MqConfig) -> Result<MqQueue, MqError> {
    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(MqError::from)
}

/// Publish a typed message to `queue`.
pub async fn publish_message<M: Message>(
    mq: &MqQueue,
    queue: &str,
    message: &M,
) -> Result<(), MqError> {
    debug!(
        queue,
        message_type = M::message_type(),
        message_id = %message.message_id(),
        "Publishing message"
    );

    mq.publish(queue, None, message, None)
        .await
        .map(|_| ())
        .map_err(|e| MqError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        })
}

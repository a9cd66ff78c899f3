//! Event consumer: reads the transfer topic under a consumer group.
//!
//! Auto-commit is disabled; positions move only through
//! [`LogConsumer::acknowledge`], which the orchestrator calls after the graph
//! write and the checkpoint commit. A partition whose worker falls behind is
//! paused with [`LogConsumer::pause`] so the others keep flowing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdc_core::config::SinkConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use thiserror::Error;
use tracing::{debug, info};

/// One record as fetched from the log, detached from the client buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("Kafka consumer error: {0}")]
    Client(#[from] KafkaError),

    #[error("Log unavailable: {0}")]
    Unavailable(String),

    #[error("Consumer closed")]
    Closed,
}

/// Durable-group reader of the event log.
#[async_trait]
pub trait LogConsumer: Send + Sync {
    /// Wait for the next record of any assigned partition.
    async fn next_record(&self) -> Result<SourceRecord, ConsumeError>;

    /// Mark `offset` of a partition as processed in the consumer group.
    async fn acknowledge(&self, topic: &str, partition: i32, offset: i64) -> Result<(), ConsumeError>;

    /// Stop fetching a partition. Records already buffered may still arrive.
    fn pause(&self, topic: &str, partition: i32) -> Result<(), ConsumeError>;

    /// Fetch a paused partition again.
    fn resume(&self, topic: &str, partition: i32) -> Result<(), ConsumeError>;
}

#[async_trait]
impl<T: LogConsumer + ?Sized> LogConsumer for Arc<T> {
    async fn next_record(&self) -> Result<SourceRecord, ConsumeError> {
        (**self).next_record().await
    }

    async fn acknowledge(&self, topic: &str, partition: i32, offset: i64) -> Result<(), ConsumeError> {
        (**self).acknowledge(topic, partition, offset).await
    }

    fn pause(&self, topic: &str, partition: i32) -> Result<(), ConsumeError> {
        (**self).pause(topic, partition)
    }

    fn resume(&self, topic: &str, partition: i32) -> Result<(), ConsumeError> {
        (**self).resume(topic, partition)
    }
}

/// Kafka/Redpanda consumer-group reader.
pub struct KafkaLogConsumer {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaLogConsumer {
    /// Join the group and subscribe to the configured topic.
    pub fn new(config: &SinkConfig) -> Result<Self, ConsumeError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()?;
        consumer.subscribe(&[config.topic.as_str()])?;

        info!(topic = %config.topic, group = %config.group_id, "Subscribed to event log");
        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.topic.clone(),
        })
    }

    /// Fetch topic metadata to prove the brokers are reachable.
    pub async fn verify(&self, timeout: Duration) -> Result<(), ConsumeError> {
        let consumer = self.consumer.clone();
        let topic = self.topic.clone();
        tokio::task::spawn_blocking(move || {
            consumer
                .fetch_metadata(Some(&topic), Timeout::After(timeout))
                .map(|_| ())
        })
        .await
        .map_err(|e| ConsumeError::Unavailable(e.to_string()))??;
        Ok(())
    }
}

#[async_trait]
impl LogConsumer for KafkaLogConsumer {
    async fn next_record(&self) -> Result<SourceRecord, ConsumeError> {
        let message = self.consumer.recv().await?;
        Ok(SourceRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn acknowledge(&self, topic: &str, partition: i32, offset: i64) -> Result<(), ConsumeError> {
        // The group position is the next offset to read.
        let mut positions = TopicPartitionList::new();
        positions.add_partition_offset(topic, partition, Offset::Offset(offset + 1))?;
        self.consumer.commit(&positions, CommitMode::Async)?;
        debug!(topic, partition, offset, "Acknowledged record");
        Ok(())
    }

    fn pause(&self, topic: &str, partition: i32) -> Result<(), ConsumeError> {
        self.consumer.pause(&single_partition(topic, partition))?;
        Ok(())
    }

    fn resume(&self, topic: &str, partition: i32) -> Result<(), ConsumeError> {
        self.consumer.resume(&single_partition(topic, partition))?;
        Ok(())
    }
}

fn single_partition(topic: &str, partition: i32) -> TopicPartitionList {
    let mut list = TopicPartitionList::new();
    list.add_partition(topic, partition);
    list
}

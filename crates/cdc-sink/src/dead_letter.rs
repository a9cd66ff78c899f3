//! Dead-letter topic for records the sink had to skip.

use std::time::Duration;

use async_trait::async_trait;
use cdc_core::{DeadLetter, DeadLetterError, DeadLetterSink};
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

/// Publishes dead letters as JSON to a separate topic, keyed by transfer id
/// when one is known.
#[derive(Clone)]
pub struct KafkaDeadLetters {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaDeadLetters {
    pub fn new(brokers: &str, topic: &str, timeout: Duration) -> Result<Self, DeadLetterError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", "all")
            .create()
            .map_err(|e| DeadLetterError::Backend(e.to_string()))?;
        Ok(Self {
            producer,
            topic: topic.to_string(),
            timeout,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetters {
    async fn dead_letter(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        letter.log();
        let payload = serde_json::to_vec(&letter)?;
        let key = letter.transfer_id.clone().unwrap_or_default();
        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);
        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| DeadLetterError::Backend(e.to_string()))?;
        Ok(())
    }
}

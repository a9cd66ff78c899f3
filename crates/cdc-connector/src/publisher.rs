//! Event publisher: canonical events onto the log, keyed by transfer id.
//!
//! `publish` resolves only when the broker acknowledged the record or the
//! bounded retries ran out; it never reports success it did not observe.
//! Records the broker refuses outright (oversized, unauthorized) fail at once
//! with [`PublishError::Rejected`].
//! In-flight sends are bounded by a semaphore: when it is saturated, callers
//! wait up to `enqueue_timeout` and are then rejected with
//! [`PublishError::Backpressure`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdc_core::codec;
use cdc_core::config::PublisherConfig;
use cdc_core::{CodecError, RetryPolicy, TransferEvent, Uint128};
use rdkafka::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

/// Broker acknowledgment for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("In-flight queue saturated for {0:?}")]
    Backpressure(Duration),

    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("Cannot encode event: {0}")]
    Encode(#[from] CodecError),

    #[error("Broker rejected the record: {0}")]
    Rejected(KafkaError),

    #[error("Kafka client error: {0}")]
    Client(#[from] KafkaError),

    #[error("Publisher closed")]
    Closed,
}

impl PublishError {
    /// Whether a later attempt for the same event may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backpressure(_) | Self::Exhausted { .. } | Self::Client(_))
    }
}

/// Bounded in-flight queue; a held permit is one outstanding delivery.
#[derive(Debug, Clone)]
pub struct InFlightQueue {
    slots: Arc<Semaphore>,
    enqueue_timeout: Duration,
}

impl InFlightQueue {
    pub fn new(capacity: usize, enqueue_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity.max(1))),
            enqueue_timeout,
        }
    }

    /// Wait for a free slot, or fail with `Backpressure` after `enqueue_timeout`.
    pub async fn reserve(&self) -> Result<SemaphorePermit<'_>, PublishError> {
        tokio::time::timeout(self.enqueue_timeout, self.slots.acquire())
            .await
            .map_err(|_| PublishError::Backpressure(self.enqueue_timeout))?
            .map_err(|_| PublishError::Closed)
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

/// Delivers canonical events to the log.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &TransferEvent) -> Result<Delivery, PublishError>;
}

/// Kafka/Redpanda publisher.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    in_flight: InFlightQueue,
    delivery_timeout: Duration,
    retry: RetryPolicy,
}

impl KafkaPublisher {
    pub fn new(config: &PublisherConfig) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.delivery_timeout.as_millis().to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            in_flight: InFlightQueue::new(config.max_in_flight, config.enqueue_timeout),
            delivery_timeout: config.delivery_timeout,
            retry: RetryPolicy::new(config.retry.clone()),
        })
    }

    /// Fetch topic metadata to prove the brokers are reachable.
    pub async fn verify(&self, timeout: Duration) -> Result<(), PublishError> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(&topic), Timeout::After(timeout))
                .map(|_| ())
        })
        .await
        .map_err(|_| PublishError::Closed)??;
        Ok(())
    }

    /// Wait for queued records to be delivered, e.g. on shutdown.
    pub async fn flush(&self, timeout: Duration) -> Result<(), PublishError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|_| PublishError::Closed)??;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, event: &TransferEvent) -> Result<Delivery, PublishError> {
        let payload = codec::encode(event)?;
        let key = event.partition_key();

        let _slot = self.in_flight.reserve().await?;

        let (key, payload) = (&key, &payload);
        let delivery = send_with_retry(&self.retry, event.id, || async move {
            let record = FutureRecord::to(&self.topic).key(key).payload(payload);
            self.producer
                .send(record, Timeout::After(self.delivery_timeout))
                .await
                .map_err(|(err, _)| err)
        })
        .await?;
        debug!(transfer_id = %event.id, partition = delivery.partition, offset = delivery.offset, "Published transfer");
        Ok(delivery)
    }
}

/// Errors no retry of the same record can fix.
fn is_permanent(err: &KafkaError) -> bool {
    matches!(
        err.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::MessageSizeTooLarge
                | RDKafkaErrorCode::InvalidMessageSize
                | RDKafkaErrorCode::MessageBatchTooLarge
                | RDKafkaErrorCode::InvalidMessage
                | RDKafkaErrorCode::TopicAuthorizationFailed
        )
    )
}

/// Call `send` until the broker acknowledges, refuses the record for good, or
/// the retry policy runs out.
async fn send_with_retry<F, Fut>(retry: &RetryPolicy, transfer_id: Uint128, mut send: F) -> Result<Delivery, PublishError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(i32, i64), KafkaError>>,
{
    let mut attempt = 0;
    loop {
        let err = match send().await {
            Ok((partition, offset)) => return Ok(Delivery { partition, offset }),
            Err(err) if is_permanent(&err) => {
                warn!(transfer_id = %transfer_id, error = %err, "Broker rejected transfer");
                return Err(PublishError::Rejected(err));
            }
            Err(err) => err,
        };

        attempt += 1;
        let Some(delay) = retry.next_delay(attempt) else {
            return Err(PublishError::Exhausted {
                attempts: attempt,
                last_error: err.to_string(),
            });
        };
        warn!(transfer_id = %transfer_id, attempt, error = %err, ?delay, "Publish failed, retrying");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_core::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
        })
    }

    fn broker_error(code: RDKafkaErrorCode) -> KafkaError {
        KafkaError::MessageProduction(code)
    }

    #[tokio::test]
    async fn test_retries_run_out_without_reporting_success() {
        let sends = &AtomicU32::new(0);
        let result = send_with_retry(&fast_retry(3), Uint128(1), || async move {
            sends.fetch_add(1, Ordering::SeqCst);
            Err::<(i32, i64), _>(broker_error(RDKafkaErrorCode::BrokerNotAvailable))
        })
        .await;

        match result {
            Err(PublishError::Exhausted { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        assert_eq!(sends.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_transient_failures_then_acknowledgment() {
        let sends = &AtomicU32::new(0);
        let result = send_with_retry(&fast_retry(3), Uint128(1), || async move {
            if sends.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(broker_error(RDKafkaErrorCode::RequestTimedOut))
            } else {
                Ok((2, 7))
            }
        })
        .await;

        assert_eq!(result.unwrap(), Delivery { partition: 2, offset: 7 });
        assert_eq!(sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_rejection_is_not_retried() {
        let sends = &AtomicU32::new(0);
        let result = send_with_retry(&fast_retry(3), Uint128(1), || async move {
            sends.fetch_add(1, Ordering::SeqCst);
            Err::<(i32, i64), _>(broker_error(RDKafkaErrorCode::MessageSizeTooLarge))
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, PublishError::Rejected(_)));
        assert!(!err.is_transient());
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_saturated_queue_rejects_instead_of_dropping() {
        let queue = InFlightQueue::new(1, Duration::from_millis(20));
        let held = queue.reserve().await.unwrap();
        assert_eq!(queue.available(), 0);

        let err = queue.reserve().await.unwrap_err();
        assert!(matches!(err, PublishError::Backpressure(_)));
        assert!(err.is_transient());

        drop(held);
        assert!(queue.reserve().await.is_ok());
    }

    #[tokio::test]
    async fn test_waiting_caller_gets_slot_when_released() {
        let queue = InFlightQueue::new(1, Duration::from_secs(5));
        let held = queue.reserve().await.unwrap();
        let release = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(held);
        };
        let (_, reserved) = tokio::join!(release, queue.reserve());
        assert!(reserved.is_ok());
    }
}

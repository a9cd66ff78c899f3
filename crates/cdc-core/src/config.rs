//! Runtime configuration with documented defaults.
//!
//! The binary maps environment variables / flags onto these structs; library
//! users and tests can rely on `Default`.

use std::time::Duration;

use crate::error::{CdcError, CdcResult};
use crate::retry::RetryConfig;

pub const DEFAULT_LEDGER_ADDRESS: &str = "http://127.0.0.1:3000";
pub const DEFAULT_LEDGER_ID: &str = "1";
pub const DEFAULT_LEDGER_CODE: &str = "718";
pub const DEFAULT_QUERY_LIMIT: &str = "100";
pub const DEFAULT_POLL_INTERVAL_MS: &str = "2000";
pub const DEFAULT_BROKERS: &str = "localhost:19092";
pub const DEFAULT_TOPIC: &str = "transactions";
pub const DEFAULT_CONSUMER_GROUP: &str = "neo4j-sink-group";
pub const DEFAULT_DEAD_LETTER_TOPIC: &str = "transactions.dlq";
pub const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_NEO4J_USERNAME: &str = "neo4j";
pub const DEFAULT_NEO4J_PASSWORD: &str = "password";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_CONNECTOR_ID: &str = "ledger-cdc";

/// Ledger extractor settings.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Checkpoint namespace for this extractor's high-water mark.
    pub connector_id: String,
    pub ledger: u32,
    pub code: u16,
    /// Maximum transfers fetched per tick.
    pub query_limit: u32,
    pub poll_interval: Duration,
    /// Upper bound on a single ledger query.
    pub query_timeout: Duration,
    /// Upper bound on waiting for a batch's publish acknowledgments.
    pub ack_timeout: Duration,
    pub dedup_capacity: usize,
    /// Backoff applied between failed polls (retries are unbounded).
    pub query_retry: RetryConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            connector_id: DEFAULT_CONNECTOR_ID.to_string(),
            ledger: 1,
            code: 718,
            query_limit: 100,
            poll_interval: Duration::from_millis(2000),
            query_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(30),
            dedup_capacity: 10_000,
            query_retry: RetryConfig {
                max_retries: u32::MAX,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_secs(30),
                multiplier: 2.0,
            },
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> CdcResult<()> {
        if self.connector_id.trim().is_empty() {
            return Err(CdcError::config("connector id must not be empty"));
        }
        if self.query_limit == 0 {
            return Err(CdcError::config("query limit must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(CdcError::config("poll interval must be positive"));
        }
        if self.dedup_capacity == 0 {
            return Err(CdcError::config("dedup capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Event publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub brokers: String,
    pub topic: String,
    /// Size of the in-flight queue; saturation applies backpressure.
    pub max_in_flight: usize,
    /// How long a publish call may wait for an in-flight slot before it is rejected.
    pub enqueue_timeout: Duration,
    /// Per-attempt delivery timeout.
    pub delivery_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_BROKERS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            max_in_flight: 1_000,
            enqueue_timeout: Duration::from_secs(5),
            delivery_timeout: Duration::from_secs(10),
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_secs(2),
                multiplier: 2.0,
            },
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> CdcResult<()> {
        if parse_brokers(&self.brokers).is_empty() {
            return Err(CdcError::config("no broker address configured"));
        }
        if self.topic.trim().is_empty() {
            return Err(CdcError::config("topic must not be empty"));
        }
        if self.max_in_flight == 0 {
            return Err(CdcError::config("in-flight queue must hold at least one record"));
        }
        Ok(())
    }
}

/// Sink orchestrator settings.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub dead_letter_topic: String,
    /// Capacity of each partition worker's inbox.
    pub worker_queue: usize,
    /// Backoff after a failed log fetch.
    pub fetch_retry: RetryConfig,
    /// Bounded retries for a single materialization.
    pub write_retry: RetryConfig,
    /// Upper bound on one graph transaction.
    pub write_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_BROKERS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            group_id: DEFAULT_CONSUMER_GROUP.to_string(),
            dead_letter_topic: DEFAULT_DEAD_LETTER_TOPIC.to_string(),
            worker_queue: 256,
            fetch_retry: RetryConfig {
                max_retries: u32::MAX,
                initial_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(10),
                multiplier: 2.0,
            },
            write_retry: RetryConfig {
                max_retries: 5,
                initial_backoff: Duration::from_millis(200),
                max_backoff: Duration::from_secs(5),
                multiplier: 2.0,
            },
            write_timeout: Duration::from_secs(15),
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> CdcResult<()> {
        if parse_brokers(&self.brokers).is_empty() {
            return Err(CdcError::config("no broker address configured"));
        }
        if self.group_id.trim().is_empty() {
            return Err(CdcError::config("consumer group must not be empty"));
        }
        if self.topic == self.dead_letter_topic {
            return Err(CdcError::config("dead-letter topic must differ from the transfer topic"));
        }
        Ok(())
    }
}

/// Split a comma-separated broker list, dropping blanks.
pub fn parse_brokers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let extractor = ExtractorConfig::default();
        assert_eq!(extractor.ledger.to_string(), DEFAULT_LEDGER_ID);
        assert_eq!(extractor.code.to_string(), DEFAULT_LEDGER_CODE);
        assert_eq!(extractor.query_limit.to_string(), DEFAULT_QUERY_LIMIT);
        assert_eq!(
            extractor.poll_interval.as_millis().to_string(),
            DEFAULT_POLL_INTERVAL_MS
        );
        assert_eq!(SinkConfig::default().group_id, "neo4j-sink-group");
        assert_eq!(PublisherConfig::default().topic, "transactions");
    }

    #[test]
    fn test_validation_rejects_unusable_settings() {
        assert!(ExtractorConfig::default().validate().is_ok());
        assert!(PublisherConfig::default().validate().is_ok());
        assert!(SinkConfig::default().validate().is_ok());

        let extractor = ExtractorConfig { query_limit: 0, ..ExtractorConfig::default() };
        assert!(matches!(extractor.validate(), Err(CdcError::Config(_))));

        let publisher = PublisherConfig { brokers: " , ".into(), ..PublisherConfig::default() };
        assert!(publisher.validate().is_err());

        let sink = SinkConfig { dead_letter_topic: "transactions".into(), ..SinkConfig::default() };
        assert!(sink.validate().is_err());
    }

    #[test]
    fn test_parse_brokers() {
        assert_eq!(
            parse_brokers("a:9092, b:9092,,"),
            vec!["a:9092".to_string(), "b:9092".to_string()]
        );
        assert!(parse_brokers(" ").is_empty());
    }
}

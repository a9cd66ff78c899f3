//! CDC Connector
//!
//! Source side of the bridge: polls the ledger for transfers above the
//! persisted high-water mark, converts them to canonical events and publishes
//! them to the log keyed by transfer id.

pub mod extractor;
pub mod ledger;
pub mod publisher;

pub use extractor::{ExtractError, Extractor, TickReport};
pub use ledger::{HttpLedger, LedgerError, LedgerSource, MemoryLedger, QueryFilter};
pub use publisher::{Delivery, EventPublisher, InFlightQueue, KafkaPublisher, PublishError};

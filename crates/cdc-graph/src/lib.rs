//! # CDC Graph
//!
//! Neo4j side of the bridge: connection client, schema bootstrap and the
//! idempotent transfer materializer.
//!
//! Each transfer becomes two `(:Account {id})` nodes and one
//! `-[:SENT_TO {txId, amount, ledger}]->` relationship, all merged by key.

pub mod client;
pub mod materializer;
pub mod memory;
pub mod schema;

pub use client::{GraphClient, GraphConfig, GraphCounts};
pub use materializer::{GraphMaterializer, MaterializeError, Materializer};
pub use memory::{MemoryGraph, StoredEdge};

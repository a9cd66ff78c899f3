//! Ledger extractor: the polling half of the CDC bridge.
//!
//! Each tick queries transfers strictly above the high-water mark, publishes
//! every transfer not already in the dedup cache, waits for the
//! acknowledgments and only then persists a new mark:
//!
//! - all handled: mark = max timestamp of the batch
//! - some unacknowledged: mark = (smallest unacknowledged timestamp) - 1
//! - batch cut at the query limit: mark = (last timestamp) - 1 at most, since
//!   more transfers may share that timestamp
//!
//! so a restart never skips a transfer, at the price of republishing some
//! already-acknowledged ones (the dedup cache suppresses most of those within
//! one process, the graph merge absorbs the rest).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdc_core::config::ExtractorConfig;
use cdc_core::{
    CheckpointError, CheckpointStore, DeadLetter, DeadLetterSink, DeadLetterSource, DedupCache,
    LedgerTransfer, RetryPolicy, TransferEvent, codec,
};
use futures::future::join_all;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ledger::{LedgerError, LedgerSource, QueryFilter};
use crate::publisher::{Delivery, EventPublisher, PublishError};

/// How often the query limit is doubled while a full batch holds one timestamp.
const MAX_LIMIT_DOUBLINGS: u32 = 6;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Ledger query failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Checkpoint store failed: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub duplicates: usize,
    pub published: usize,
    pub failed: usize,
    pub rejected: usize,
    /// Mark after the tick (persisted when it moved).
    pub high_water_mark: u64,
}

#[async_trait]
impl<T: LedgerSource + ?Sized> LedgerSource for Arc<T> {
    async fn query_transfers(&self, filter: &QueryFilter) -> Result<Vec<LedgerTransfer>, LedgerError> {
        (**self).query_transfers(filter).await
    }
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, event: &TransferEvent) -> Result<Delivery, PublishError> {
        (**self).publish(event).await
    }
}

/// Polls the ledger and hands new transfers to the publisher.
///
/// Sole owner of the high-water mark and the dedup cache.
pub struct Extractor<L, P> {
    config: ExtractorConfig,
    ledger: L,
    publisher: P,
    checkpoints: Arc<dyn CheckpointStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    dedup: DedupCache,
    high_water_mark: u64,
    backoff: RetryPolicy,
}

impl<L: LedgerSource, P: EventPublisher> Extractor<L, P> {
    pub fn new(
        config: ExtractorConfig,
        ledger: L,
        publisher: P,
        checkpoints: Arc<dyn CheckpointStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            dedup: DedupCache::new(config.dedup_capacity),
            backoff: RetryPolicy::new(config.query_retry.clone()),
            config,
            ledger,
            publisher,
            checkpoints,
            dead_letters,
            high_water_mark: 0,
        }
    }

    pub fn high_water_mark(&self) -> u64 {
        self.high_water_mark
    }

    /// Load the persisted mark. Called by [`run`](Self::run); exposed for
    /// callers that want to fail fast before spawning the loop.
    pub async fn resume(&mut self) -> Result<u64, ExtractError> {
        let persisted = self
            .checkpoints
            .load_high_water_mark(&self.config.connector_id)
            .await?;
        self.high_water_mark = self.high_water_mark.max(persisted.unwrap_or(0));
        info!(
            connector_id = %self.config.connector_id,
            high_water_mark = self.high_water_mark,
            "Resuming extraction"
        );
        Ok(self.high_water_mark)
    }

    /// Run the polling loop until `cancel` fires.
    ///
    /// Failed ticks are logged and retried with capped exponential backoff;
    /// only a failure to load the initial mark is returned.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ExtractError> {
        self.resume().await?;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };

            match outcome {
                Ok(report) => {
                    failures = 0;
                    if report.fetched > 0 {
                        info!(
                            fetched = report.fetched,
                            published = report.published,
                            duplicates = report.duplicates,
                            failed = report.failed,
                            rejected = report.rejected,
                            high_water_mark = report.high_water_mark,
                            "Tick complete"
                        );
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self.backoff.backoff(failures);
                    warn!(error = %e, failures, ?delay, "Tick failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(high_water_mark = self.high_water_mark, "Extractor stopped");
        Ok(())
    }

    /// One poll: query, publish, await acknowledgments, advance the mark.
    pub async fn tick(&mut self) -> Result<TickReport, ExtractError> {
        let (batch, full) = self.fetch().await?;

        let mut report = TickReport {
            fetched: batch.len(),
            high_water_mark: self.high_water_mark,
            ..TickReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        let mut batch_max = self.high_water_mark;
        let mut first_gap: Option<u64> = None;
        let mut pending: Vec<TransferEvent> = Vec::with_capacity(batch.len());

        for transfer in &batch {
            batch_max = batch_max.max(transfer.timestamp);
            if self.dedup.contains(&transfer.id) {
                report.duplicates += 1;
                continue;
            }
            match codec::from_ledger(transfer) {
                Ok(event) => pending.push(event),
                Err(e) => {
                    report.rejected += 1;
                    let letter = DeadLetter::new(
                        e.reason(),
                        e.to_string(),
                        DeadLetterSource::Ledger { timestamp: transfer.timestamp },
                    )
                    .with_transfer_id(transfer.id.to_string())
                    .with_payload(format!("{transfer:?}"));
                    match self.dead_letters.dead_letter(letter).await {
                        Ok(()) => {
                            self.dedup.insert(transfer.id);
                        }
                        Err(dl) => {
                            // Not recorded anywhere yet: hold the mark so it is retried.
                            error!(transfer_id = %transfer.id, error = %dl, "Failed to dead-letter rejected transfer");
                            first_gap = min_opt(first_gap, transfer.timestamp);
                        }
                    }
                }
            }
        }

        let publisher = &self.publisher;
        let acks = join_all(pending.iter().map(|event| async move {
            (event, publisher.publish(event).await)
        }));

        match tokio::time::timeout(self.config.ack_timeout, acks).await {
            Ok(results) => {
                for (event, result) in results {
                    match result {
                        Ok(delivery) => {
                            self.dedup.insert(event.id);
                            report.published += 1;
                            debug!(
                                transfer_id = %event.id,
                                partition = delivery.partition,
                                offset = delivery.offset,
                                "Forwarded transfer"
                            );
                        }
                        Err(e) => {
                            report.failed += 1;
                            warn!(
                                transfer_id = %event.id,
                                transient = e.is_transient(),
                                error = %e,
                                "Publish not acknowledged"
                            );
                            first_gap = min_opt(first_gap, event.source_timestamp);
                        }
                    }
                }
            }
            Err(_) => {
                report.failed += pending.len();
                warn!(
                    pending = pending.len(),
                    timeout = ?self.config.ack_timeout,
                    "Timed out waiting for publish acknowledgments"
                );
                for event in &pending {
                    first_gap = min_opt(first_gap, event.source_timestamp);
                }
            }
        }

        let settled = if full { batch_max.saturating_sub(1) } else { batch_max };
        let candidate = next_mark(self.high_water_mark, settled, first_gap);
        if candidate > self.high_water_mark {
            self.checkpoints
                .save_high_water_mark(&self.config.connector_id, candidate)
                .await?;
            self.high_water_mark = candidate;
        }
        report.high_water_mark = self.high_water_mark;
        Ok(report)
    }

    /// Query above the mark. Returns the batch and whether it hit the limit.
    ///
    /// A full batch whose first and last transfers share a timestamp may end
    /// inside a run of equal timestamps that the next query could not reach,
    /// so the limit is doubled until the run fits.
    async fn fetch(&self) -> Result<(Vec<LedgerTransfer>, bool), ExtractError> {
        let mut filter = QueryFilter {
            ledger: self.config.ledger,
            code: self.config.code,
            timestamp_min: self.high_water_mark.saturating_add(1),
            limit: self.config.query_limit,
        };
        let mut doublings = 0;

        loop {
            let batch = tokio::time::timeout(self.config.query_timeout, self.ledger.query_transfers(&filter))
                .await
                .map_err(|_| LedgerError::Timeout(self.config.query_timeout))??;

            let full = batch.len() >= filter.limit as usize;
            let shared_timestamp = match (batch.first(), batch.last()) {
                (Some(first), Some(last)) if full && first.timestamp == last.timestamp => first.timestamp,
                _ => return Ok((batch, full)),
            };
            if doublings == MAX_LIMIT_DOUBLINGS || filter.limit == u32::MAX {
                warn!(
                    timestamp = shared_timestamp,
                    limit = filter.limit,
                    "Full batch shares one timestamp, the mark cannot advance past it"
                );
                return Ok((batch, full));
            }
            doublings += 1;
            filter.limit = filter.limit.saturating_mul(2);
            debug!(timestamp = shared_timestamp, limit = filter.limit, "Widening query over equal timestamps");
        }
    }
}

fn min_opt(current: Option<u64>, value: u64) -> Option<u64> {
    Some(current.map_or(value, |c| c.min(value)))
}

/// New mark: the batch maximum when nothing is outstanding, otherwise just
/// below the earliest gap. Never moves backwards.
fn next_mark(current: u64, batch_max: u64, first_gap: Option<u64>) -> u64 {
    let candidate = match first_gap {
        Some(gap) => gap.saturating_sub(1),
        None => batch_max,
    };
    candidate.max(current)
}

//! Sink orchestrator: consumer + materializer + checkpoint store.
//!
//! Records are routed to one worker per log partition. A worker handles its
//! partition strictly in order and commits the partition offset only after
//! the record was written to the graph (or dead-lettered). A crash between
//! write and commit means redelivery, which the merge-by-key write absorbs.
//!
//! The fetch loop never waits on a worker. Records for a worker whose inbox
//! is full go to that partition's backlog and the partition is paused on the
//! consumer until the backlog drains, so a stalled partition holds up no
//! other.
//!
//! Failure handling per record:
//!
//! | failure                         | action                                         |
//! |---------------------------------|------------------------------------------------|
//! | undecodable payload             | dead-letter, advance                           |
//! | permanent write error           | dead-letter, advance                           |
//! | transient write error           | retry with backoff, offset held                |
//! | retries exhausted               | `data_loss_risk` alert, dead-letter, advance   |
//! | already at/below the checkpoint | skip                                           |

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use cdc_core::config::SinkConfig;
use cdc_core::{
    CheckpointStore, ConsumerCheckpoint, DeadLetter, DeadLetterSink, DeadLetterSource, RetryPolicy,
    TransferEvent, codec,
};
use cdc_graph::{MaterializeError, Materializer};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::consumer::{LogConsumer, SourceRecord};

/// What a worker did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    DeadLettered,
    /// At or below the persisted checkpoint.
    Skipped,
    /// Cancelled mid-retry; the offset was not committed.
    Abandoned,
}

enum WriteFailure {
    Permanent(MaterializeError),
    Exhausted { attempts: u32, error: MaterializeError },
    Cancelled,
}

type PartitionKey = (String, i32);

/// How often backlogged records are offered to their workers again.
const BACKLOG_DRAIN_INTERVAL: Duration = Duration::from_millis(20);

struct WorkerHandle {
    inbox: mpsc::Sender<SourceRecord>,
    task: JoinHandle<()>,
    /// Fetched records waiting for inbox space, in offset order.
    backlog: VecDeque<SourceRecord>,
    paused: bool,
}

/// Ties the log consumer to the graph materializer.
pub struct SinkOrchestrator<C, M> {
    config: SinkConfig,
    consumer: Arc<C>,
    materializer: M,
    checkpoints: Arc<dyn CheckpointStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl<C, M> SinkOrchestrator<C, M>
where
    C: LogConsumer + 'static,
    M: Materializer + Clone + 'static,
{
    /// `materializer` is cloned once per partition worker.
    pub fn new(
        config: SinkConfig,
        consumer: Arc<C>,
        materializer: M,
        checkpoints: Arc<dyn CheckpointStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            config,
            consumer,
            materializer,
            checkpoints,
            dead_letters,
        }
    }

    /// Consume until `cancel` fires, then let every worker finish its
    /// current record and join them.
    pub async fn run(self, cancel: CancellationToken) {
        let fetch_backoff = RetryPolicy::new(self.config.fetch_retry.clone());
        let mut workers: HashMap<PartitionKey, WorkerHandle> = HashMap::new();
        let mut failures: u32 = 0;
        let mut drain = tokio::time::interval(BACKLOG_DRAIN_INTERVAL);
        drain.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(topic = %self.config.topic, group = %self.config.group_id, "Sink started");

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = drain.tick() => {
                    for (key, worker) in workers.iter_mut().filter(|(_, w)| !w.backlog.is_empty()) {
                        self.flush(key, worker, &cancel);
                    }
                    continue;
                }
                fetched = self.consumer.next_record() => fetched,
            };

            match fetched {
                Ok(record) => {
                    failures = 0;
                    self.dispatch(&mut workers, record, &cancel);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = fetch_backoff.backoff(failures);
                    warn!(error = %e, failures, ?delay, "Log fetch failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(workers = workers.len(), "Stopping sink workers");
        for ((topic, partition), worker) in workers {
            if !worker.backlog.is_empty() {
                info!(topic = %topic, partition, backlog = worker.backlog.len(), "Dropping uncommitted backlog");
            }
            drop(worker.inbox);
            if let Err(e) = worker.task.await {
                error!(topic = %topic, partition, error = %e, "Sink worker terminated abnormally");
            }
        }
        info!("Sink stopped");
    }

    /// Queue a record behind its partition's backlog and offer it to the worker.
    fn dispatch(
        &self,
        workers: &mut HashMap<PartitionKey, WorkerHandle>,
        record: SourceRecord,
        cancel: &CancellationToken,
    ) {
        let key = (record.topic.clone(), record.partition);
        let worker = workers
            .entry(key.clone())
            .or_insert_with(|| self.spawn_worker(&key, cancel));
        worker.backlog.push_back(record);
        self.flush(&key, worker, cancel);
    }

    /// Move backlog into the inbox until it is full, then pause or resume
    /// the partition to match.
    fn flush(&self, key: &PartitionKey, worker: &mut WorkerHandle, cancel: &CancellationToken) {
        while let Some(record) = worker.backlog.pop_front() {
            match worker.inbox.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(record)) => {
                    worker.backlog.push_front(record);
                    break;
                }
                Err(TrySendError::Closed(record)) => {
                    error!(topic = %key.0, partition = key.1, "Sink worker exited unexpectedly, restarting it");
                    worker.backlog.push_front(record);
                    let fresh = self.spawn_worker(key, cancel);
                    worker.inbox = fresh.inbox;
                    worker.task = fresh.task;
                }
            }
        }

        let backlogged = !worker.backlog.is_empty();
        if backlogged == worker.paused {
            return;
        }
        let (topic, partition) = key;
        let result = if backlogged {
            self.consumer.pause(topic, *partition)
        } else {
            self.consumer.resume(topic, *partition)
        };
        match result {
            Ok(()) => {
                worker.paused = backlogged;
                debug!(
                    topic = %topic,
                    partition,
                    paused = backlogged,
                    backlog = worker.backlog.len(),
                    "Partition flow changed"
                );
            }
            Err(e) => warn!(topic = %topic, partition, paused = backlogged, error = %e, "Cannot change partition flow"),
        }
    }

    fn spawn_worker(&self, (topic, partition): &PartitionKey, cancel: &CancellationToken) -> WorkerHandle {
        let (inbox, rx) = mpsc::channel(self.config.worker_queue.max(1));
        let worker = PartitionWorker {
            topic: topic.clone(),
            partition: *partition,
            group_id: self.config.group_id.clone(),
            consumer: self.consumer.clone(),
            materializer: self.materializer.clone(),
            checkpoints: self.checkpoints.clone(),
            dead_letters: self.dead_letters.clone(),
            write_retry: RetryPolicy::new(self.config.write_retry.clone()),
            write_timeout: self.config.write_timeout,
            committed: None,
        };
        debug!(topic = %topic, partition, "Spawning partition worker");
        let task = tokio::spawn(worker.run(rx, cancel.clone()));
        WorkerHandle {
            inbox,
            task,
            backlog: VecDeque::new(),
            paused: false,
        }
    }
}

/// Single writer for one partition's offset.
struct PartitionWorker<C, M> {
    topic: String,
    partition: i32,
    group_id: String,
    consumer: Arc<C>,
    materializer: M,
    checkpoints: Arc<dyn CheckpointStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    write_retry: RetryPolicy,
    write_timeout: Duration,
    committed: Option<i64>,
}

impl<C: LogConsumer, M: Materializer> PartitionWorker<C, M> {
    async fn run(mut self, mut inbox: mpsc::Receiver<SourceRecord>, cancel: CancellationToken) {
        self.committed = match self
            .checkpoints
            .load_offset(&self.group_id, &self.topic, self.partition)
            .await
        {
            Ok(offset) => offset,
            Err(e) => {
                // Reprocessing from the broker position is safe; skipping is not.
                warn!(topic = %self.topic, partition = self.partition, error = %e, "Cannot load partition checkpoint");
                None
            }
        };

        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                record = inbox.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };
            let offset = record.offset;
            let outcome = self.process(record, &cancel).await;
            debug!(partition = self.partition, offset, ?outcome, "Processed record");
        }
    }

    async fn process(&mut self, record: SourceRecord, cancel: &CancellationToken) -> WriteOutcome {
        if self.committed.is_some_and(|done| record.offset <= done) {
            return WriteOutcome::Skipped;
        }

        let outcome = match codec::decode(&record.payload) {
            Err(e) => {
                let letter = DeadLetter::new(e.reason(), e.to_string(), source_of(&record))
                    .with_payload(String::from_utf8_lossy(&record.payload));
                self.dead_letter(letter, &record).await;
                WriteOutcome::DeadLettered
            }
            Ok(event) => match self.write(&event, cancel).await {
                Ok(()) => WriteOutcome::Written,
                Err(WriteFailure::Cancelled) => return WriteOutcome::Abandoned,
                Err(WriteFailure::Permanent(e)) => {
                    self.dead_letter(letter_for(&event, &record, "permanent_write_error", &e), &record)
                        .await;
                    WriteOutcome::DeadLettered
                }
                Err(WriteFailure::Exhausted { attempts, error: e }) => {
                    error!(
                        alert = "data_loss_risk",
                        transfer_id = %event.id,
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        attempts,
                        error = %e,
                        "Graph write retries exhausted, skipping record"
                    );
                    self.dead_letter(letter_for(&event, &record, "retries_exhausted", &e), &record)
                        .await;
                    WriteOutcome::DeadLettered
                }
            },
        };

        self.commit(&record).await;
        outcome
    }

    async fn write(&self, event: &TransferEvent, cancel: &CancellationToken) -> Result<(), WriteFailure> {
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::time::timeout(self.write_timeout, self.materializer.materialize(event))
                .await
                .unwrap_or_else(|_| {
                    Err(MaterializeError::Transient(format!(
                        "write timed out after {:?}",
                        self.write_timeout
                    )))
                });

            let error = match result {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_transient() => return Err(WriteFailure::Permanent(e)),
                Err(e) => e,
            };

            attempt += 1;
            let Some(delay) = self.write_retry.next_delay(attempt) else {
                return Err(WriteFailure::Exhausted { attempts: attempt, error });
            };
            warn!(
                transfer_id = %event.id,
                partition = self.partition,
                attempt,
                error = %error,
                ?delay,
                "Graph write failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(WriteFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn dead_letter(&self, letter: DeadLetter, record: &SourceRecord) {
        if let Err(e) = self.dead_letters.dead_letter(letter).await {
            error!(
                alert = "data_loss_risk",
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Dead-letter write failed, record is only recoverable from the log"
            );
        }
    }

    /// Checkpoint store first, broker group position second.
    async fn commit(&mut self, record: &SourceRecord) {
        let checkpoint = ConsumerCheckpoint {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
        };
        if let Err(e) = self.checkpoints.commit_offset(&self.group_id, &checkpoint).await {
            warn!(
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Checkpoint commit failed, record will be redelivered after restart"
            );
            return;
        }
        self.committed = Some(record.offset);

        if let Err(e) = self
            .consumer
            .acknowledge(&record.topic, record.partition, record.offset)
            .await
        {
            warn!(partition = record.partition, offset = record.offset, error = %e, "Broker offset commit failed");
        }
    }
}

fn source_of(record: &SourceRecord) -> DeadLetterSource {
    DeadLetterSource::Log {
        topic: record.topic.clone(),
        partition: record.partition,
        offset: record.offset,
    }
}

fn letter_for(event: &TransferEvent, record: &SourceRecord, reason: &str, error: &MaterializeError) -> DeadLetter {
    DeadLetter::new(reason, error.to_string(), source_of(record))
        .with_transfer_id(event.id.to_string())
        .with_payload(String::from_utf8_lossy(&record.payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ConsumeError;
    use async_trait::async_trait;
    use cdc_core::{MemoryCheckpointStore, MemoryDeadLetters, Uint128};
    use cdc_graph::MemoryGraph;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct ScriptedConsumer {
        records: Mutex<VecDeque<SourceRecord>>,
        fetch_failures: Mutex<u32>,
        acked: Mutex<Vec<(i32, i64)>>,
        /// (partition, paused) per flow change.
        flow: Mutex<Vec<(i32, bool)>>,
        ready: Notify,
    }

    impl ScriptedConsumer {
        fn push(&self, record: SourceRecord) {
            self.records.lock().unwrap().push_back(record);
            self.ready.notify_one();
        }

        fn acked(&self) -> Vec<(i32, i64)> {
            self.acked.lock().unwrap().clone()
        }

        fn flow(&self) -> Vec<(i32, bool)> {
            self.flow.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogConsumer for ScriptedConsumer {
        async fn next_record(&self) -> Result<SourceRecord, ConsumeError> {
            loop {
                {
                    let mut failures = self.fetch_failures.lock().unwrap();
                    if *failures > 0 {
                        *failures -= 1;
                        return Err(ConsumeError::Unavailable("injected".into()));
                    }
                }
                let next = self.records.lock().unwrap().pop_front();
                if let Some(record) = next {
                    return Ok(record);
                }
                self.ready.notified().await;
            }
        }

        async fn acknowledge(&self, _topic: &str, partition: i32, offset: i64) -> Result<(), ConsumeError> {
            self.acked.lock().unwrap().push((partition, offset));
            Ok(())
        }

        fn pause(&self, _topic: &str, partition: i32) -> Result<(), ConsumeError> {
            self.flow.lock().unwrap().push((partition, true));
            Ok(())
        }

        fn resume(&self, _topic: &str, partition: i32) -> Result<(), ConsumeError> {
            self.flow.lock().unwrap().push((partition, false));
            Ok(())
        }
    }

    /// Holds every write of one transfer until the gate opens.
    #[derive(Clone)]
    struct GatedGraph {
        graph: MemoryGraph,
        held: Uint128,
        gate: CancellationToken,
    }

    #[async_trait]
    impl Materializer for GatedGraph {
        async fn materialize(&self, event: &TransferEvent) -> Result<(), MaterializeError> {
            if event.id == self.held {
                self.gate.cancelled().await;
            }
            self.graph.materialize(event).await
        }
    }

    fn event(id: u128, amount: u64) -> TransferEvent {
        TransferEvent {
            id: Uint128(id),
            debit_account_id: Uint128(1),
            credit_account_id: Uint128(2),
            amount,
            ledger: 1,
            code: 718,
            source_timestamp: 0,
        }
    }

    fn record(partition: i32, offset: i64, payload: Vec<u8>) -> SourceRecord {
        SourceRecord {
            topic: "transactions".into(),
            partition,
            offset,
            key: None,
            payload,
        }
    }

    fn transfer_record(partition: i32, offset: i64, id: u128) -> SourceRecord {
        record(partition, offset, codec::encode(&event(id, 500)).unwrap())
    }

    struct Harness {
        consumer: Arc<ScriptedConsumer>,
        graph: MemoryGraph,
        checkpoints: Arc<MemoryCheckpointStore>,
        dead_letters: Arc<MemoryDeadLetters>,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                consumer: Arc::new(ScriptedConsumer::default()),
                graph: MemoryGraph::new(),
                checkpoints: Arc::new(MemoryCheckpointStore::new()),
                dead_letters: Arc::new(MemoryDeadLetters::new()),
                cancel: CancellationToken::new(),
            }
        }

        fn start(&self) -> JoinHandle<()> {
            self.start_with(self.graph.clone(), |_| {})
        }

        fn start_with<M: Materializer + Clone + 'static>(
            &self,
            materializer: M,
            tune: impl FnOnce(&mut SinkConfig),
        ) -> JoinHandle<()> {
            let mut config = SinkConfig::default();
            config.write_retry.max_retries = 2;
            config.write_retry.initial_backoff = Duration::from_millis(1);
            config.fetch_retry.initial_backoff = Duration::from_millis(1);
            tune(&mut config);
            let sink = SinkOrchestrator::new(
                config,
                self.consumer.clone(),
                materializer,
                self.checkpoints.clone(),
                self.dead_letters.clone(),
            );
            tokio::spawn(sink.run(self.cancel.clone()))
        }

        async fn committed(&self, partition: i32) -> Option<i64> {
            self.checkpoints
                .load_offset("neo4j-sink-group", "transactions", partition)
                .await
                .unwrap()
        }

        async fn wait_for_commit(&self, partition: i32, offset: i64) {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
            while self.committed(partition).await != Some(offset) {
                assert!(tokio::time::Instant::now() < deadline, "offset {offset} never committed");
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }

        async fn stop(&self, handle: JoinHandle<()>) {
            self.cancel.cancel();
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_writes_then_commits_in_order() {
        let h = Harness::new();
        for (offset, id) in [(0, 10), (1, 11), (2, 12)] {
            h.consumer.push(transfer_record(0, offset, id));
        }
        let handle = h.start();
        h.wait_for_commit(0, 2).await;
        h.stop(handle).await;

        assert_eq!(h.graph.edge_count(), 3);
        assert_eq!(h.consumer.acked(), vec![(0, 0), (0, 1), (0, 2)]);
        assert!(h.dead_letters.letters().is_empty());
    }

    #[tokio::test]
    async fn test_records_at_or_below_checkpoint_are_skipped() {
        let h = Harness::new();
        let checkpoint = ConsumerCheckpoint { topic: "transactions".into(), partition: 0, offset: 5 };
        h.checkpoints.commit_offset("neo4j-sink-group", &checkpoint).await.unwrap();
        for (offset, id) in [(4, 10), (5, 11), (6, 12)] {
            h.consumer.push(transfer_record(0, offset, id));
        }
        let handle = h.start();
        h.wait_for_commit(0, 6).await;
        h.stop(handle).await;

        assert_eq!(h.graph.write_count(), 1);
        assert!(h.graph.edge("12").is_some());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_before_commit() {
        let h = Harness::new();
        h.graph.fail_next(2);
        h.consumer.push(transfer_record(0, 0, 10));
        let handle = h.start();
        h.wait_for_commit(0, 0).await;
        h.stop(handle).await;

        assert_eq!(h.graph.edge_count(), 1);
        assert!(h.dead_letters.letters().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter_and_advance() {
        let h = Harness::new();
        // first try + 2 retries
        h.graph.fail_next(3);
        h.consumer.push(transfer_record(0, 0, 10));
        h.consumer.push(transfer_record(0, 1, 11));
        let handle = h.start();
        h.wait_for_commit(0, 1).await;
        h.stop(handle).await;

        assert!(h.graph.edge("10").is_none());
        assert!(h.graph.edge("11").is_some());
        let letters = h.dead_letters.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, "retries_exhausted");
        assert_eq!(letters[0].transfer_id.as_deref(), Some("10"));
        assert_eq!(
            letters[0].source,
            DeadLetterSource::Log { topic: "transactions".into(), partition: 0, offset: 0 }
        );
    }

    #[tokio::test]
    async fn test_undecodable_and_unwritable_records_are_dead_lettered() {
        let h = Harness::new();
        h.consumer.push(record(0, 0, b"not json".to_vec()));
        h.consumer.push(record(0, 1, codec::encode(&event(20, u64::MAX)).unwrap()));
        h.consumer.push(transfer_record(0, 2, 21));
        let handle = h.start();
        h.wait_for_commit(0, 2).await;
        h.stop(handle).await;

        let reasons: Vec<String> = h.dead_letters.letters().into_iter().map(|l| l.reason).collect();
        assert_eq!(reasons, vec!["invalid_json", "permanent_write_error"]);
        assert_eq!(h.graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_partitions_commit_independently() {
        let h = Harness::new();
        h.consumer.push(transfer_record(0, 0, 10));
        h.consumer.push(transfer_record(1, 0, 11));
        h.consumer.push(transfer_record(1, 1, 12));
        let handle = h.start();
        h.wait_for_commit(0, 0).await;
        h.wait_for_commit(1, 1).await;
        h.stop(handle).await;
        assert_eq!(h.graph.edge_count(), 3);
    }

    #[tokio::test]
    async fn test_stalled_partition_is_paused_while_others_commit() {
        let h = Harness::new();
        let gate = CancellationToken::new();
        let gated = GatedGraph { graph: h.graph.clone(), held: Uint128(10), gate: gate.clone() };
        for offset in 0..4 {
            h.consumer.push(transfer_record(0, offset, 10 + offset as u128));
        }
        for offset in 0..3 {
            h.consumer.push(transfer_record(1, offset, 20 + offset as u128));
        }
        let handle = h.start_with(gated, |c| c.worker_queue = 1);

        h.wait_for_commit(1, 2).await;
        assert_eq!(h.committed(0).await, None);
        assert!(h.consumer.flow().contains(&(0, true)));

        gate.cancel();
        h.wait_for_commit(0, 3).await;
        h.stop(handle).await;

        let partition_zero_flow: Vec<bool> =
            h.consumer.flow().into_iter().filter(|(p, _)| *p == 0).map(|(_, paused)| paused).collect();
        assert_eq!(partition_zero_flow, vec![true, false]);
        assert_eq!(h.graph.edge_count(), 7);
        let partition_zero: Vec<i64> =
            h.consumer.acked().into_iter().filter(|(p, _)| *p == 0).map(|(_, o)| o).collect();
        assert_eq!(partition_zero, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancel_during_write_retry_leaves_offset_uncommitted() {
        let h = Harness::new();
        h.graph.fail_next(u32::MAX);
        h.consumer.push(transfer_record(0, 0, 10));
        let handle = h.start_with(h.graph.clone(), |c| {
            c.write_retry.max_retries = 5;
            c.write_retry.initial_backoff = Duration::from_secs(60);
            c.write_retry.max_backoff = Duration::from_secs(60);
        });

        // first attempt fails, the worker is now waiting for its retry
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.stop(handle).await;

        assert_eq!(h.committed(0).await, None);
        assert!(h.consumer.acked().is_empty());
        assert!(h.dead_letters.letters().is_empty());
        assert_eq!(h.graph.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failures_back_off_and_recover() {
        let h = Harness::new();
        *h.consumer.fetch_failures.lock().unwrap() = 3;
        h.consumer.push(transfer_record(0, 0, 10));
        let handle = h.start();
        h.wait_for_commit(0, 0).await;
        h.stop(handle).await;
        assert_eq!(h.graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_with_idle_log_returns() {
        let h = Harness::new();
        let handle = h.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.stop(handle).await;
        assert_eq!(h.graph.write_count(), 0);
    }
}

//! Ledger → extractor → log → sink → graph, with in-memory collaborators.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cdc_connector::{Delivery, EventPublisher, Extractor, MemoryLedger, PublishError};
use cdc_core::config::{ExtractorConfig, SinkConfig};
use cdc_core::{
    CheckpointStore, LedgerTransfer, MemoryCheckpointStore, MemoryDeadLetters, TransferEvent, Uint128,
    codec,
};
use cdc_graph::MemoryGraph;
use cdc_sink::{ConsumeError, LogConsumer, SinkOrchestrator, SourceRecord};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const TOPIC: &str = "transactions";

/// Single-partition log shared by publisher and consumer. `rewind` replays
/// from an earlier position, as a broker does after an uncommitted crash.
#[derive(Default)]
struct MemoryLog {
    records: Mutex<Vec<SourceRecord>>,
    cursor: Mutex<usize>,
    acked: Mutex<Option<i64>>,
    appended: Notify,
}

impl MemoryLog {
    fn records(&self) -> Vec<SourceRecord> {
        self.records.lock().unwrap().clone()
    }

    fn consumed(&self) -> usize {
        *self.cursor.lock().unwrap()
    }

    fn rewind(&self, position: usize) {
        *self.cursor.lock().unwrap() = position;
        self.appended.notify_one();
    }
}

#[async_trait]
impl EventPublisher for MemoryLog {
    async fn publish(&self, event: &TransferEvent) -> Result<Delivery, PublishError> {
        let payload = codec::encode(event)?;
        let offset = {
            let mut records = self.records.lock().unwrap();
            let offset = records.len() as i64;
            records.push(SourceRecord {
                topic: TOPIC.to_string(),
                partition: 0,
                offset,
                key: Some(event.partition_key().into_bytes()),
                payload,
            });
            offset
        };
        self.appended.notify_one();
        Ok(Delivery { partition: 0, offset })
    }
}

#[async_trait]
impl LogConsumer for MemoryLog {
    async fn next_record(&self) -> Result<SourceRecord, ConsumeError> {
        loop {
            let next = {
                let records = self.records.lock().unwrap();
                let mut cursor = self.cursor.lock().unwrap();
                let next = records.get(*cursor).cloned();
                if next.is_some() {
                    *cursor += 1;
                }
                next
            };
            if let Some(record) = next {
                return Ok(record);
            }
            self.appended.notified().await;
        }
    }

    async fn acknowledge(&self, _topic: &str, _partition: i32, offset: i64) -> Result<(), ConsumeError> {
        *self.acked.lock().unwrap() = Some(offset);
        Ok(())
    }

    fn pause(&self, _topic: &str, _partition: i32) -> Result<(), ConsumeError> {
        Ok(())
    }

    fn resume(&self, _topic: &str, _partition: i32) -> Result<(), ConsumeError> {
        Ok(())
    }
}

fn scenario_transfer() -> LedgerTransfer {
    LedgerTransfer {
        id: Uint128(12345),
        debit_account_id: Uint128(1),
        credit_account_id: Uint128(2),
        amount: Uint128(500),
        ledger: 1,
        code: 718,
        timestamp: 1_000,
    }
}

/// Run a sink until offset 0 is committed and `done` holds, give it `settle`
/// to finish in-flight work, then shut it down.
async fn drain(
    log: &Arc<MemoryLog>,
    graph: &MemoryGraph,
    checkpoints: &Arc<MemoryCheckpointStore>,
    settle: Duration,
    done: impl Fn() -> bool,
) {
    let cancel = CancellationToken::new();
    let sink = SinkOrchestrator::new(
        SinkConfig::default(),
        log.clone(),
        graph.clone(),
        checkpoints.clone(),
        Arc::new(MemoryDeadLetters::new()),
    );
    let handle = tokio::spawn(sink.run(cancel.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let committed = checkpoints
            .load_offset("neo4j-sink-group", TOPIC, 0)
            .await
            .unwrap();
        if committed == Some(0) && done() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "sink did not catch up");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(settle).await;
    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_transfer_reaches_graph_exactly_once_despite_redelivery() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.push(scenario_transfer());
    let log = Arc::new(MemoryLog::default());
    let connector_checkpoints = Arc::new(MemoryCheckpointStore::new());

    let mut extractor = Extractor::new(
        ExtractorConfig::default(),
        ledger.clone(),
        log.clone(),
        connector_checkpoints.clone(),
        Arc::new(MemoryDeadLetters::new()),
    );
    let report = extractor.tick().await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(report.high_water_mark, 1_000);

    let records = log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].topic, "transactions");
    assert_eq!(records[0].key.as_deref(), Some(b"12345".as_slice()));
    assert_eq!(
        String::from_utf8(records[0].payload.clone()).unwrap(),
        r#"{"ID":"12345","DebitAccountID":"1","CreditAccountID":"2","Amount":500,"Ledger":1,"Code":718}"#
    );

    // First delivery.
    let graph = MemoryGraph::new();
    let sink_checkpoints = Arc::new(MemoryCheckpointStore::new());
    drain(&log, &graph, &sink_checkpoints, Duration::ZERO, || graph.write_count() == 1).await;
    assert_eq!(graph.account_ids(), vec!["1".to_string(), "2".to_string()]);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.edge("12345").map(|e| e.amount), Some(500));
    assert_eq!(*log.acked.lock().unwrap(), Some(0));

    // Crash before the offset commit: the record comes again with no checkpoint.
    log.rewind(0);
    let lost_checkpoints = Arc::new(MemoryCheckpointStore::new());
    drain(&log, &graph, &lost_checkpoints, Duration::ZERO, || graph.write_count() == 2).await;
    assert_eq!(graph.account_ids().len(), 2);
    assert_eq!(graph.edge_count(), 1);

    // Broker redelivers after a clean restart: the persisted checkpoint skips it.
    log.rewind(0);
    drain(&log, &graph, &sink_checkpoints, Duration::from_millis(20), || log.consumed() == 1).await;
    assert_eq!(graph.write_count(), 2);
    assert_eq!(graph.edge_count(), 1);
}

#[tokio::test]
async fn test_extractor_restart_does_not_republish_below_mark() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.push(scenario_transfer());
    let log = Arc::new(MemoryLog::default());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());

    for _ in 0..2 {
        let mut extractor = Extractor::new(
            ExtractorConfig::default(),
            ledger.clone(),
            log.clone(),
            checkpoints.clone(),
            Arc::new(MemoryDeadLetters::new()),
        );
        extractor.resume().await.unwrap();
        extractor.tick().await.unwrap();
    }

    assert_eq!(log.records().len(), 1);
    assert_eq!(
        checkpoints.load_high_water_mark("ledger-cdc").await.unwrap(),
        Some(1_000)
    );
}

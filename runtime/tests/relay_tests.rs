//! Relay behaviour against the in-memory outbox store and a scripted producer.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::Duration as ChronoDuration;
use ledger_outbox_core::environment::Clock;
use ledger_outbox_core::event::{DomainEvent, EventType};
use ledger_outbox_core::outbox::{
    ClaimRenewal, ClaimRequest, OutboxRecord, OutboxStatus, OutboxStore, StoreError,
};
use ledger_outbox_core::producer::{DeliveryError, DeliveryFuture, Producer};
use ledger_outbox_runtime::{BackoffPolicy, CycleReport, OutboxRelay, RelayConfig, RelayError};
use ledger_outbox_testing::{
    InMemoryDatabase, InMemoryOutboxStore, ManualClock, StubProducer, epoch, init_tracing,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

fn seed(db: &InMemoryDatabase, aggregate_id: Uuid, offset_secs: i64) -> OutboxRecord {
    let event = DomainEvent {
        event_id: Uuid::new_v4(),
        aggregate_id,
        aggregate_type: "account".to_string(),
        event_type: EventType::AccountCreated,
        payload: serde_json::json!({"id": aggregate_id}),
        occurred_at: epoch(),
    };
    let record = OutboxRecord::from_event(
        &event,
        Uuid::new_v4(),
        epoch() + ChronoDuration::seconds(offset_secs),
    )
    .unwrap();
    db.seed_outbox(record.clone());
    record
}

fn config() -> RelayConfig {
    RelayConfig::builder()
        .worker_id("relay-test")
        .batch_size(10)
        .max_attempts(5)
        .backoff(
            BackoffPolicy::builder()
                .initial_delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(8))
                .multiplier(2.0)
                .build(),
        )
        .build()
        .unwrap()
}

struct Harness {
    db: InMemoryDatabase,
    store: Arc<InMemoryOutboxStore>,
    producer: Arc<StubProducer>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(producer: StubProducer) -> Self {
        init_tracing();
        let db = InMemoryDatabase::new();
        let clock = Arc::new(ManualClock::default());
        clock.advance(ChronoDuration::minutes(1));
        Self {
            store: Arc::new(InMemoryOutboxStore::new(db.clone())),
            db,
            producer: Arc::new(producer),
            clock,
        }
    }

    fn relay(&self, config: RelayConfig) -> OutboxRelay {
        OutboxRelay::new(
            self.store.clone(),
            self.producer.clone(),
            self.clock.clone(),
            config,
        )
    }
}

#[tokio::test]
async fn empty_outbox_is_a_noop_cycle() {
    let h = Harness::new(StubProducer::new());

    let report = h.relay(config()).run_cycle().await.unwrap();

    assert_eq!(report, CycleReport::default());
    assert!(h.producer.sent().is_empty());
}

#[tokio::test]
async fn successful_send_marks_dispatched() {
    let h = Harness::new(StubProducer::new());
    let record = seed(&h.db, Uuid::new_v4(), 0);

    let report = h.relay(config()).run_cycle().await.unwrap();

    assert_eq!(report.dispatched, 1);
    let stored = h.db.outbox_record(record.outbox_id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Dispatched);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.last_attempt_at, Some(h.clock.now()));
    assert!(stored.claimed_by.is_none());

    let sent = h.producer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].key, record.partition_key);
    assert_eq!(sent[0].value, record.payload);

    // Dispatched is terminal: nothing left to claim.
    assert_eq!(h.relay(config()).run_cycle().await.unwrap().claimed, 0);
}

#[tokio::test]
async fn two_transient_failures_then_success() {
    let h = Harness::new(StubProducer::failing_transient(2));
    let record = seed(&h.db, Uuid::new_v4(), 0);
    let relay = h.relay(config());

    for _ in 0..3 {
        relay.run_cycle().await.unwrap();
        let next = h.db.outbox_record(record.outbox_id).unwrap().next_attempt_at;
        h.clock.set(next.max(h.clock.now()));
    }

    let stored = h.db.outbox_record(record.outbox_id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Dispatched);
    assert_eq!(stored.attempts, 3);

    let sent = h.producer.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|m| m.value == record.payload));
}

#[tokio::test]
async fn rescheduled_record_waits_for_backoff() {
    let h = Harness::new(StubProducer::failing_transient(1));
    let record = seed(&h.db, Uuid::new_v4(), 0);
    let relay = h.relay(config());

    let report = relay.run_cycle().await.unwrap();
    assert_eq!(report.retried, 1);

    let stored = h.db.outbox_record(record.outbox_id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.next_attempt_at, h.clock.now() + ChronoDuration::seconds(1));
    assert!(stored.last_error.is_some());

    assert_eq!(relay.run_cycle().await.unwrap().claimed, 0);

    h.clock.advance(ChronoDuration::seconds(1));
    assert_eq!(relay.run_cycle().await.unwrap().dispatched, 1);
}

#[tokio::test]
async fn backoff_grows_until_cap() {
    let h = Harness::new(StubProducer::always(&DeliveryError::Transient("down".into())));
    let record = seed(&h.db, Uuid::new_v4(), 0);
    let relay = h.relay(RelayConfig { max_attempts: 20, ..config() });

    let mut gaps = Vec::new();
    let mut previous_next = None;
    for _ in 0..8 {
        relay.run_cycle().await.unwrap();
        let stored = h.db.outbox_record(record.outbox_id).unwrap();
        if let Some(previous) = previous_next {
            assert!(stored.next_attempt_at > previous);
        }
        gaps.push(stored.next_attempt_at - h.clock.now());
        previous_next = Some(stored.next_attempt_at);
        h.clock.set(stored.next_attempt_at);
    }

    let secs: Vec<i64> = gaps.iter().map(ChronoDuration::num_seconds).collect();
    assert_eq!(secs, vec![1, 2, 4, 8, 8, 8, 8, 8]);
}

#[tokio::test]
async fn fatal_error_parks_record_as_failed() {
    let h = Harness::new(StubProducer::with_script([Err(DeliveryError::Fatal(
        "message too large".into(),
    ))]));
    let record = seed(&h.db, Uuid::new_v4(), 0);
    let relay = h.relay(config());

    let report = relay.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);

    let stored = h.db.outbox_record(record.outbox_id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Failed);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.last_error.as_deref(), Some("message too large"));

    h.clock.advance(ChronoDuration::hours(1));
    assert_eq!(relay.run_cycle().await.unwrap().claimed, 0);
    assert_eq!(h.store.count_pending().await.unwrap(), 0);

    // Operator requeue puts it back in rotation.
    h.store.requeue_failed(record.outbox_id, h.clock.now()).await.unwrap();
    assert_eq!(relay.run_cycle().await.unwrap().dispatched, 1);
    let stored = h.db.outbox_record(record.outbox_id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Dispatched);
    assert_eq!(stored.attempts, 2);
}

#[tokio::test]
async fn exhausted_retries_become_failed() {
    let h = Harness::new(StubProducer::always(&DeliveryError::Transient("timeout".into())));
    let record = seed(&h.db, Uuid::new_v4(), 0);
    let relay = h.relay(RelayConfig { max_attempts: 2, ..config() });

    relay.run_cycle().await.unwrap();
    h.clock.advance(ChronoDuration::minutes(1));
    let report = relay.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    let stored = h.db.outbox_record(record.outbox_id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Failed);
    assert_eq!(stored.attempts, 2);
    assert!(stored.last_error.unwrap().contains("retries exhausted"));

    // A requeue keeps the count: one more transient failure parks it again.
    h.store.requeue_failed(record.outbox_id, h.clock.now()).await.unwrap();
    let report = relay.run_cycle().await.unwrap();
    assert_eq!(report, CycleReport { claimed: 1, failed: 1, ..CycleReport::default() });
    let stored = h.db.outbox_record(record.outbox_id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Failed);
    assert_eq!(stored.attempts, 3);
}

#[tokio::test]
async fn oldest_records_go_first_within_batch_limit() {
    let h = Harness::new(StubProducer::new());
    let aggregate = Uuid::new_v4();
    let late = seed(&h.db, aggregate, 30);
    let early = seed(&h.db, aggregate, 10);
    seed(&h.db, Uuid::new_v4(), 50);
    let relay = h.relay(RelayConfig { batch_size: 2, ..config() });

    let report = relay.run_cycle().await.unwrap();

    assert_eq!(report.claimed, 2);
    let sent: Vec<_> = h.producer.sent().into_iter().map(|m| m.value).collect();
    assert_eq!(sent, vec![early.payload.clone(), late.payload.clone()]);
    assert_eq!(early.partition_key, late.partition_key);
}

#[tokio::test]
async fn store_failure_aborts_cycle() {
    let h = Harness::new(StubProducer::new());
    seed(&h.db, Uuid::new_v4(), 0);
    h.db.fail_next_claim();

    let err = h.relay(config()).run_cycle().await.unwrap_err();

    assert!(matches!(err, RelayError::Store(StoreError::Database(_))));
    assert!(h.producer.sent().is_empty());
}

#[tokio::test]
async fn concurrent_workers_deliver_each_record_once() {
    let h = Harness::new(StubProducer::new());
    let mut expected = HashSet::new();
    for i in 0..120 {
        expected.insert(seed(&h.db, Uuid::new_v4(), i).payload);
    }

    let relays: Vec<_> = (0..6)
        .map(|w| {
            Arc::new(h.relay(
                RelayConfig::builder()
                    .worker_id(format!("relay-{w}"))
                    .batch_size(7)
                    .build()
                    .unwrap(),
            ))
        })
        .collect();

    let workers = relays.into_iter().map(|relay| {
        tokio::spawn(async move {
            loop {
                let report = relay.run_cycle().await.unwrap();
                if report.claimed == 0 {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
    });
    for result in futures::future::join_all(workers).await {
        result.unwrap();
    }

    let sent = h.producer.sent();
    assert_eq!(sent.len(), 120);
    let delivered: HashSet<_> = sent.into_iter().map(|m| m.value).collect();
    assert_eq!(delivered, expected);
    assert!(h.db.outbox_records().iter().all(|r| r.status == OutboxStatus::Dispatched));
}

#[tokio::test]
async fn run_loop_drains_and_stops_on_shutdown() {
    let h = Harness::new(StubProducer::new());
    let record = seed(&h.db, Uuid::new_v4(), 0);
    let relay = Arc::new(h.relay(RelayConfig { poll_interval: Duration::from_millis(10), ..config() }));
    let (stop, shutdown) = tokio::sync::watch::channel(false);

    let worker = relay.spawn(shutdown);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.db.outbox_record(record.outbox_id).unwrap().status != OutboxStatus::Dispatched {
        assert!(tokio::time::Instant::now() < deadline, "record was never dispatched");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
    assert_eq!(h.producer.sent().len(), 1);
}

/// Broker whose every send takes 20 seconds of clock time; another worker
/// polls the store while the send is in flight.
struct SlowBroker {
    clock: Arc<ManualClock>,
    rival: Arc<OutboxRelay>,
    sent: Mutex<Vec<Vec<u8>>>,
    rival_reports: Mutex<Vec<CycleReport>>,
}

impl Producer for SlowBroker {
    fn send_message<'a>(&'a self, _key: &'a [u8], value: &'a [u8]) -> DeliveryFuture<'a> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(value.to_vec());
            self.clock.advance(ChronoDuration::seconds(20));
            let report = self.rival.run_cycle().await.unwrap();
            self.rival_reports.lock().unwrap().push(report);
            Ok(())
        })
    }

    fn close(&self) -> DeliveryFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

#[tokio::test]
async fn lapsed_claims_are_not_sent_while_another_worker_holds_them() {
    let h = Harness::new(StubProducer::new());
    let records: Vec<_> = (0..3).map(|i| seed(&h.db, Uuid::new_v4(), i)).collect();

    let ttl = Duration::from_secs(30);
    let rival = Arc::new(
        h.relay(RelayConfig::builder().worker_id("relay-b").claim_ttl(ttl).build().unwrap()),
    );
    let broker = Arc::new(SlowBroker {
        clock: h.clock.clone(),
        rival,
        sent: Mutex::new(Vec::new()),
        rival_reports: Mutex::new(Vec::new()),
    });
    let relay = OutboxRelay::new(
        h.store.clone(),
        broker.clone(),
        h.clock.clone(),
        RelayConfig::builder().worker_id("relay-a").claim_ttl(ttl).build().unwrap(),
    );

    let report = relay.run_cycle().await.unwrap();

    // The second claim is renewed before its send; the third lapses during
    // that send and the rival takes it.
    assert_eq!(
        report,
        CycleReport { claimed: 3, dispatched: 2, claim_lost: 1, ..CycleReport::default() }
    );
    let sent_by_a = broker.sent.lock().unwrap().clone();
    assert_eq!(sent_by_a, vec![records[0].payload.clone(), records[1].payload.clone()]);

    let rival_reports = broker.rival_reports.lock().unwrap().clone();
    assert_eq!(rival_reports[0].claimed, 0);
    assert_eq!(rival_reports[1].claimed, 1);
    assert_eq!(rival_reports[1].dispatched, 1);

    let sent_by_b: Vec<_> = h.producer.sent().into_iter().map(|m| m.value).collect();
    assert_eq!(sent_by_b, vec![records[2].payload.clone()]);
    assert!(h.db.outbox_records().iter().all(|r| r.status == OutboxStatus::Dispatched));
}

#[tokio::test]
async fn claim_taken_over_in_the_store_is_not_sent() {
    let h = Harness::new(StubProducer::new());
    let record = seed(&h.db, Uuid::new_v4(), 0);
    let claimed = h
        .store
        .claim_batch(ClaimRequest {
            worker_id: "relay-a".to_string(),
            now: h.clock.now(),
            limit: 1,
            claim_ttl: ChronoDuration::seconds(30),
        })
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    h.clock.advance(ChronoDuration::seconds(31));
    let rival = h.relay(RelayConfig { worker_id: "relay-b".to_string(), ..config() });
    let report = rival.run_cycle().await.unwrap();
    assert_eq!(report.dispatched, 1);

    // relay-a's claim is gone; renewing it must fail.
    let err = h
        .store
        .renew_claim(ClaimRenewal {
            outbox_id: record.outbox_id,
            worker_id: "relay-a".to_string(),
            now: h.clock.now(),
            claim_ttl: ChronoDuration::seconds(30),
        })
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::ClaimLost(record.outbox_id));
    assert_eq!(h.producer.sent().len(), 1);
}

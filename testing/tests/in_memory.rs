//! Behaviour of the in-memory unit of work and outbox store.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::Duration;
use ledger_outbox_core::event::{DomainEvent, EventType};
use ledger_outbox_core::outbox::{
    ClaimRequest, Disposition, DispositionOutcome, OutboxRecord, OutboxStatus, OutboxStore,
    StoreError,
};
use ledger_outbox_core::persistence::OutboxRepository;
use ledger_outbox_core::uow::{UnitOfWork, UowError};
use ledger_outbox_testing::{
    InMemoryDatabase, InMemoryOutboxStore, InMemoryUnitOfWork, OUTBOX_TABLE, epoch,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn record(created_offset_secs: i64) -> OutboxRecord {
    let event = DomainEvent {
        event_id: Uuid::new_v4(),
        aggregate_id: Uuid::new_v4(),
        aggregate_type: "account".to_string(),
        event_type: EventType::AccountCreated,
        payload: json!({}),
        occurred_at: epoch(),
    };
    OutboxRecord::from_event(&event, Uuid::new_v4(), epoch() + Duration::seconds(created_offset_secs))
        .unwrap()
}

fn claim(worker: &str, limit: usize) -> ClaimRequest {
    ClaimRequest {
        worker_id: worker.to_string(),
        now: epoch() + Duration::minutes(1),
        limit,
        claim_ttl: Duration::seconds(30),
    }
}

#[tokio::test]
async fn uncommitted_writes_are_invisible() {
    let db = InMemoryDatabase::new();
    let uow = InMemoryUnitOfWork::new(db.clone());

    let mut scope = uow.begin_with_tx().await.unwrap();
    scope.insert_row("accounts", Uuid::new_v4(), json!({})).unwrap();
    assert_eq!(db.count("accounts"), 0);

    uow.rollback(&mut scope).await.unwrap();
    assert_eq!(db.count("accounts"), 0);
    assert_eq!(uow.rollback(&mut scope).await, Err(UowError::NoActiveTx));
}

#[tokio::test]
async fn dropped_scope_commits_nothing() {
    let db = InMemoryDatabase::new();
    let uow = InMemoryUnitOfWork::new(db.clone());

    {
        let mut scope = uow.begin_with_tx().await.unwrap();
        scope.insert_row("accounts", Uuid::new_v4(), json!({})).unwrap();
    }

    assert_eq!(db.count("accounts"), 0);
}

#[tokio::test]
async fn duplicate_key_fails_immediately_outside_batch() {
    let db = InMemoryDatabase::new();
    let uow = InMemoryUnitOfWork::new(db.clone());
    let key = Uuid::new_v4();

    let mut scope = uow.begin_with_tx().await.unwrap();
    scope.insert_row("accounts", key, json!({})).unwrap();
    assert!(scope.insert_row("accounts", key, json!({})).is_err());
}

#[tokio::test]
async fn batch_failure_reports_index_and_commits_nothing() {
    let db = InMemoryDatabase::new();
    let uow = InMemoryUnitOfWork::new(db.clone());
    let key = Uuid::new_v4();

    let mut scope = uow.begin_with_tx_and_batch().await.unwrap();
    scope.insert_row("accounts", Uuid::new_v4(), json!({})).unwrap();
    scope.insert_row("accounts", key, json!({})).unwrap();
    scope.insert_row("accounts", key, json!({})).unwrap();
    scope.insert_row("accounts", Uuid::new_v4(), json!({})).unwrap();

    let err = uow.commit(&mut scope).await.unwrap_err();

    assert!(matches!(err, UowError::BatchExecFailed { index: 2, .. }));
    assert_eq!(db.count("accounts"), 0);
    assert!(!scope.is_active());
}

#[tokio::test]
async fn begin_failure_is_tx_start_failed() {
    let db = InMemoryDatabase::new();
    let uow = InMemoryUnitOfWork::new(db.clone());
    db.fail_next_begin();

    assert!(matches!(uow.begin_with_tx().await, Err(UowError::TxStartFailed(_))));
    assert!(uow.begin_with_tx().await.is_ok());
}

#[tokio::test]
async fn outbox_writer_forces_pending() {
    let db = InMemoryDatabase::new();
    let uow = InMemoryUnitOfWork::new(db.clone());
    let store = InMemoryOutboxStore::new(db.clone());

    let mut dirty = record(0);
    dirty.status = OutboxStatus::Dispatched;
    dirty.attempts = 9;

    let mut scope = uow.begin_with_tx().await.unwrap();
    store.save_outbox_event(&mut scope, &dirty).await.unwrap();
    uow.commit(&mut scope).await.unwrap();

    let stored = db.outbox_record(dirty.outbox_id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.attempts, 0);
    assert_eq!(db.count(OUTBOX_TABLE), 1);
}

#[tokio::test]
async fn claims_oldest_first_up_to_limit() {
    let db = InMemoryDatabase::new();
    let store = InMemoryOutboxStore::new(db.clone());
    let newest = record(20);
    let oldest = record(0);
    let middle = record(10);
    for r in [&newest, &oldest, &middle] {
        db.seed_outbox(r.clone());
    }

    let claimed = store.claim_batch(claim("relay-a", 2)).await.unwrap();

    let ids: Vec<_> = claimed.iter().map(|r| r.outbox_id).collect();
    assert_eq!(ids, vec![oldest.outbox_id, middle.outbox_id]);
    assert!(claimed.iter().all(|r| r.claimed_by.as_deref() == Some("relay-a")));
}

#[tokio::test]
async fn live_claims_are_exclusive_and_expire() {
    let db = InMemoryDatabase::new();
    let store = InMemoryOutboxStore::new(db.clone());
    db.seed_outbox(record(0));

    assert_eq!(store.claim_batch(claim("relay-a", 10)).await.unwrap().len(), 1);
    assert!(store.claim_batch(claim("relay-b", 10)).await.unwrap().is_empty());

    let mut later = claim("relay-b", 10);
    later.now += Duration::seconds(31);
    assert_eq!(store.claim_batch(later).await.unwrap().len(), 1);
}

#[tokio::test]
async fn disposition_from_former_holder_is_rejected() {
    let db = InMemoryDatabase::new();
    let store = InMemoryOutboxStore::new(db.clone());
    let r = record(0);
    db.seed_outbox(r.clone());

    store.claim_batch(claim("relay-a", 10)).await.unwrap();
    let mut takeover = claim("relay-b", 10);
    takeover.now += Duration::seconds(31);
    store.claim_batch(takeover).await.unwrap();

    let err = store
        .record_disposition(Disposition {
            outbox_id: r.outbox_id,
            worker_id: "relay-a".to_string(),
            attempted_at: epoch(),
            outcome: DispositionOutcome::Dispatched,
        })
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::ClaimLost(r.outbox_id));
}

#[tokio::test]
async fn requeue_and_count_pending() {
    let db = InMemoryDatabase::new();
    let store = InMemoryOutboxStore::new(db.clone());
    let r = record(0);
    db.seed_outbox(r.clone());
    assert_eq!(store.count_pending().await.unwrap(), 1);

    store.claim_batch(claim("relay-a", 1)).await.unwrap();
    store
        .record_disposition(Disposition {
            outbox_id: r.outbox_id,
            worker_id: "relay-a".to_string(),
            attempted_at: epoch(),
            outcome: DispositionOutcome::Failed { error: "rejected".to_string() },
        })
        .await
        .unwrap();
    assert_eq!(store.count_pending().await.unwrap(), 0);

    store.requeue_failed(r.outbox_id, epoch()).await.unwrap();
    assert_eq!(store.count_pending().await.unwrap(), 1);
    assert!(matches!(
        store.requeue_failed(Uuid::new_v4(), epoch()).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_claimers_never_share_a_record() {
    let db = InMemoryDatabase::new();
    let store = Arc::new(InMemoryOutboxStore::new(db.clone()));
    for i in 0..200 {
        db.seed_outbox(record(i));
    }

    let mut handles = Vec::new();
    for w in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let batch = store.claim_batch(claim(&format!("relay-{w}"), 7)).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                mine.extend(batch.into_iter().map(|r| r.outbox_id));
                tokio::task::yield_now().await;
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "record {id} claimed twice");
        }
    }
    assert_eq!(seen.len(), 200);
}

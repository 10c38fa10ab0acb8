mod helpers;

use helpers::*;
use mfb_backend::error::StoreError;
use mfb_backend::models::{NewPurchase, PurchaseAction, PurchaseEntry};
use mfb_backend::repositories::*;
use mfb_backend::services::{RefreshReport, RefreshScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

async fn seeded(t: &TestLedger, schemes: &[i64]) {
    for (i, code) in schemes.iter().enumerate() {
        t.ledger
            .record_purchase(&format!("u{}", i + 1), purchase(*code, 10, "50"))
            .await
            .unwrap();
        t.gateway.set_nav(*code, "70");
    }
}

#[tokio::test]
async fn test_cycle_continues_past_failed_entry() {
    let t = TestLedger::new();
    seeded(&t, &[101, 102, 103, 104]).await;
    t.gateway.fail(102);

    let scheduler = RefreshScheduler::new(t.ledger.clone(), Duration::from_secs(3600));
    let report = scheduler.run_cycle().await;

    assert_eq!(
        report,
        RefreshReport {
            refreshed: 3,
            missing: 0,
            failed: 1
        }
    );
    assert_eq!(report.total(), 4);

    for (owner, code) in [("u1", 101), ("u3", 103), ("u4", 104)] {
        let entry = t.entry(owner, code).await.unwrap();
        assert_eq!(entry.nav, dec("70"));
        assert_eq!(entry.total_cost, dec("700"));
    }

    let failed = t.entry("u2", 102).await.unwrap();
    assert_eq!(failed.nav, dec("50"));
    assert_eq!(failed.total_cost, dec("500"));
}

#[tokio::test]
async fn test_cycle_on_empty_ledger() {
    let t = TestLedger::new();
    let scheduler = RefreshScheduler::new(t.ledger.clone(), Duration::from_secs(3600));

    assert_eq!(scheduler.run_cycle().await, RefreshReport::default());
    assert_eq!(t.gateway.nav_calls(), 0);
}

/// Store whose enumeration always fails
struct BrokenEnumeration(MemoryLedgerStore);

#[async_trait::async_trait]
impl LedgerStore for BrokenEnumeration {
    async fn find_one(&self, filter: &LedgerFilter) -> StoreResult<Option<PurchaseEntry>> {
        self.0.find_one(filter).await
    }

    async fn insert_one(&self, entry: &PurchaseEntry) -> StoreResult<Uuid> {
        self.0.insert_one(entry).await
    }

    async fn update_one(&self, filter: &LedgerFilter, update: &PurchaseUpdate) -> StoreResult<u64> {
        self.0.update_one(filter, update).await
    }

    async fn find_all(&self, _: &LedgerFilter) -> StoreResult<Vec<PurchaseEntry>> {
        Err(StoreError::Mapping("purchase has non-positive units (0)".to_string()))
    }

    async fn upsert_accumulate(
        &self,
        owner_id: &str,
        purchase: &NewPurchase,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<(PurchaseEntry, PurchaseAction)> {
        self.0.upsert_accumulate(owner_id, purchase, now).await
    }
}

#[tokio::test]
async fn test_cycle_survives_enumeration_failure() {
    let memory = Arc::new(MemoryLedgerStore::new());
    let t = TestLedger::with_store(memory, Arc::new(BrokenEnumeration(MemoryLedgerStore::new())));
    let scheduler = RefreshScheduler::new(t.ledger.clone(), Duration::from_secs(60));

    assert_eq!(scheduler.run_cycle().await, RefreshReport::default());
    assert_eq!(t.gateway.nav_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_waits_one_interval_per_cycle() {
    let t = TestLedger::new();
    seeded(&t, &[101]).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = RefreshScheduler::new(t.ledger.clone(), Duration::from_secs(3600));
    let handle = tokio::spawn(scheduler.start(shutdown_rx));

    // Nothing happens before the first interval elapses
    tokio::time::sleep(Duration::from_secs(3599)).await;
    assert_eq!(t.gateway.nav_calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(t.gateway.nav_calls(), 1);
    assert_eq!(t.entry("u1", 101).await.unwrap().nav, dec("70"));

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(t.gateway.nav_calls(), 2);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_sleeping_scheduler() {
    let t = TestLedger::new();
    seeded(&t, &[101]).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = RefreshScheduler::new(t.ledger.clone(), Duration::from_secs(3600));
    let handle = tokio::spawn(scheduler.start(shutdown_rx));

    tokio::time::sleep(Duration::from_secs(10)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    // No cycle starts once stopped
    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(t.gateway.nav_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_false_signal_keeps_scheduler_running() {
    let t = TestLedger::new();
    seeded(&t, &[101]).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = RefreshScheduler::new(t.ledger.clone(), Duration::from_secs(3600));
    let handle = tokio::spawn(scheduler.start(shutdown_rx));

    tokio::time::sleep(Duration::from_secs(10)).await;
    shutdown_tx.send(false).unwrap();

    tokio::time::sleep(Duration::from_secs(3700)).await;
    assert!(!handle.is_finished());
    assert_eq!(t.gateway.nav_calls(), 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropped_sender_stops_scheduler() {
    let t = TestLedger::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = RefreshScheduler::new(t.ledger.clone(), Duration::from_secs(60));
    let handle = tokio::spawn(scheduler.start(shutdown_rx));

    drop(shutdown_tx);
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler should stop")
        .unwrap();
}

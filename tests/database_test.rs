mod helpers;

use chrono::Duration;
use futures::future::join_all;
use helpers::*;
use mfb_backend::error::{AppError, StoreError};
use mfb_backend::models::*;
use mfb_backend::repositories::*;
use sqlx::{PgPool, Row};
use std::sync::Arc;

const NEEDS_DB: &str = "requires a running PostgreSQL instance (DATABASE_URL)";

// ============================================================================
// Migration Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_migrations_ran(pool: PgPool) {
    for table in ["users", "purchases"] {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();

        let exists: bool = row.get(0);
        assert!(exists, "Table {} should exist ({})", table, NEEDS_DB);
    }
}

// ============================================================================
// Ledger Store Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_upsert_creates_then_accumulates(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let store = &db.ledger_store;

    let (created, action) = store
        .upsert_accumulate("u1@example.com", &purchase(100, 10, "50.0"), t0())
        .await
        .unwrap();
    assert_eq!(action, PurchaseAction::Created);
    assert_eq!(created.total_cost, dec("500"));
    assert!(created.last_updated.is_none());

    let later = t0() + Duration::days(1);
    let (updated, action) = store
        .upsert_accumulate("u1@example.com", &purchase(100, 5, "60.0"), later)
        .await
        .unwrap();
    assert_eq!(action, PurchaseAction::Updated);
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.units, 15);
    assert_eq!(updated.nav, dec("60"));
    assert_eq!(updated.total_cost, dec("900"));
    assert_eq!(updated.purchase_date, t0());
    assert_eq!(updated.last_updated, Some(later));
}

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_concurrent_upserts_serialize_on_the_row(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let store = db.ledger_store.clone();

    let buys = (0..10).map(|_| {
        let store = store.clone();
        async move {
            store
                .upsert_accumulate("u1@example.com", &purchase(100, 1, "10"), t0())
                .await
        }
    });
    let results = join_all(buys).await;
    let created = results
        .into_iter()
        .map(|r| r.unwrap().1)
        .filter(|a| *a == PurchaseAction::Created)
        .count();
    assert_eq!(created, 1);

    let all = store.find_all(&LedgerFilter::all()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].units, 10);
}

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_insert_duplicate_key_rejected(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let first = PurchaseEntry::open("u1@example.com", &purchase(100, 10, "50"), t0()).unwrap();
    let second = PurchaseEntry::open("u1@example.com", &purchase(100, 1, "50"), t0()).unwrap();

    db.ledger_store.insert_one(&first).await.unwrap();
    let err = db.ledger_store.insert_one(&second).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));

    let found = db
        .ledger_store
        .find_one(&LedgerFilter::by_key("u1@example.com", 100))
        .await
        .unwrap()
        .unwrap();
    assert_positions_equal(&found, &first);
}

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_update_one_units_guard(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let entry = PurchaseEntry::open("u1@example.com", &purchase(100, 10, "50"), t0()).unwrap();
    db.ledger_store.insert_one(&entry).await.unwrap();

    let update = PurchaseUpdate::revalue(dec("70"), dec("700"));
    let stale = LedgerFilter::by_id(entry.id).with_units(9);
    assert_eq!(db.ledger_store.update_one(&stale, &update).await.unwrap(), 0);

    let fresh = LedgerFilter::by_id(entry.id).with_units(10);
    assert_eq!(db.ledger_store.update_one(&fresh, &update).await.unwrap(), 1);

    let stored = db
        .ledger_store
        .find_one(&LedgerFilter::by_id(entry.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.nav, dec("70"));
    assert_eq!(stored.total_cost, dec("700"));
    assert_eq!(stored.units, 10);
}

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_check_constraint_rejects_non_positive_units(pool: PgPool) {
    let db = TestDatabase::from_pool(pool.clone());

    let result = sqlx::query(
        "INSERT INTO purchases (id, owner_id, scheme_code, scheme_name, scheme_date, scheme_category, \
         isin_growth, isin_reinvestment, units, nav, total_cost, purchase_date) \
         VALUES (gen_random_uuid(), 'u1', 100, 'x', 'x', 'x', 'x', 'x', 0, 10, 0, now())",
    )
    .execute(&pool)
    .await;

    let err: StoreError = result.unwrap_err().into();
    assert!(matches!(err, StoreError::ConstraintViolation(_)));
    assert!(db
        .ledger_store
        .find_all(&LedgerFilter::all())
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_ledger_over_postgres_store(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let t = TestLedger::with_store(Arc::new(MemoryLedgerStore::new()), db.ledger_store.clone());

    t.ledger.record_purchase("u1@example.com", purchase(100, 10, "50")).await.unwrap();
    t.ledger.record_purchase("u1@example.com", purchase(100, 5, "60")).await.unwrap();

    t.gateway.set_nav(100, "70");
    let entries = t.ledger.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    let status = t.ledger.refresh_valuation(&entries[0]).await.unwrap();
    assert_eq!(status, RefreshStatus::Success);

    let portfolio = t.ledger.portfolio("u1@example.com").await.unwrap();
    assert_eq!(portfolio[0].units, 15);
    assert_eq!(portfolio[0].total_cost, dec("1050"));
}

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_fractional_nav_keeps_total_cost_consistent(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let t = TestLedger::with_store(Arc::new(MemoryLedgerStore::new()), db.ledger_store.clone());

    let receipt = t
        .ledger
        .record_purchase("u1@example.com", purchase(100, 1000, "1.123456789"))
        .await
        .unwrap();
    assert_eq!(receipt.total_cost, dec("1123.45679"));

    let stored = db
        .ledger_store
        .find_one(&LedgerFilter::by_key("u1@example.com", 100))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.nav, dec("1.12345679"));
    assert_eq!(stored.total_cost, rust_decimal::Decimal::from(stored.units) * stored.nav);

    let err = t
        .ledger
        .record_purchase("u1@example.com", purchase(200, 10, "0.000000001"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(err.status_code(), 400);
    assert!(db
        .ledger_store
        .find_one(&LedgerFilter::by_key("u1@example.com", 200))
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_unit_overflow_is_rejected_as_validation(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let t = TestLedger::with_store(Arc::new(MemoryLedgerStore::new()), db.ledger_store.clone());

    t.ledger
        .record_purchase("u1@example.com", purchase(100, i64::MAX - 1, "1"))
        .await
        .unwrap();
    let err = t
        .ledger
        .record_purchase("u1@example.com", purchase(100, 5, "1"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    let stored = db
        .ledger_store
        .find_one(&LedgerFilter::by_key("u1@example.com", 100))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.units, i64::MAX - 1);
}

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_find_all_skips_malformed_rows(pool: PgPool) {
    let db = TestDatabase::from_pool(pool.clone());
    let good = PurchaseEntry::open("u1@example.com", &purchase(100, 10, "50"), t0()).unwrap();
    db.ledger_store.insert_one(&good).await.unwrap();

    // A legacy row written before the units check existed
    sqlx::query("ALTER TABLE purchases DROP CONSTRAINT purchases_units_check")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO purchases (id, owner_id, scheme_code, scheme_name, scheme_date, scheme_category, \
         isin_growth, isin_reinvestment, units, nav, total_cost, purchase_date) \
         VALUES (gen_random_uuid(), 'u2@example.com', 200, 'x', 'x', 'x', 'x', 'x', 0, 10, 0, now())",
    )
    .execute(&pool)
    .await
    .unwrap();

    let all = db.ledger_store.find_all(&LedgerFilter::all()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_positions_equal(&all[0], &good);
}

// ============================================================================
// User Store Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires a running PostgreSQL instance (DATABASE_URL)"]
async fn test_user_store_unique_email(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);

    let user = db.user_store.create("u1@example.com", "$argon2id$hash").await.unwrap();
    let found = db.user_store.find_by_email("u1@example.com").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);

    let err = db.user_store.create("u1@example.com", "other").await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
    assert!(db.user_store.find_by_email("x@example.com").await.unwrap().is_none());
}

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mfb_backend::clock::FixedClock;
use mfb_backend::config::AuthConfig;
use mfb_backend::models::*;
use mfb_backend::nav_client::{GatewayError, PricingGateway};
use mfb_backend::repositories::*;
use mfb_backend::services::PurchaseLedger;
use mfb_backend::AppState;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_SECRET: &[u8] = b"test-secret-0123456789abcdef";

/// Parse a decimal literal
pub fn dec(value: &str) -> Decimal {
    value.parse().expect("valid decimal literal")
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 14, 10, 0, 0).unwrap()
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: TEST_SECRET.to_vec(),
        access_token_ttl_minutes: 30,
    }
}

/// Buy request for a scheme with fixed descriptive fields
pub fn purchase(scheme_code: i64, units: i64, nav: &str) -> NewPurchase {
    NewPurchase {
        scheme_code,
        details: SchemeDetails {
            scheme_name: format!("Scheme {}", scheme_code),
            scheme_date: "14-Jan-2025".to_string(),
            scheme_category: "Equity Scheme - Large Cap Fund".to_string(),
            fund_family: Some("HDFC Mutual Fund".to_string()),
            isin_growth: format!("INF{:09}", scheme_code),
            isin_reinvestment: "-".to_string(),
        },
        units,
        nav: dec(nav),
    }
}

pub fn scheme_quote(scheme_code: i64, nav: &str, family: &str) -> SchemeQuote {
    SchemeQuote {
        scheme_code,
        isin_growth: format!("INF{:09}", scheme_code),
        isin_reinvestment: "-".to_string(),
        scheme_name: format!("Scheme {}", scheme_code),
        net_asset_value: dec(nav),
        date: "15-Jan-2025".to_string(),
        scheme_type: "Open Ended Schemes".to_string(),
        scheme_category: "Equity Scheme - Large Cap Fund".to_string(),
        mutual_fund_family: family.to_string(),
    }
}

/// Scriptable pricing gateway
#[derive(Default)]
pub struct StubGateway {
    navs: Mutex<HashMap<i64, Decimal>>,
    failing: Mutex<HashSet<i64>>,
    schemes: Mutex<Vec<SchemeQuote>>,
    nav_calls: AtomicUsize,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_nav(&self, scheme_code: i64, nav: &str) {
        self.navs.lock().unwrap().insert(scheme_code, dec(nav));
    }

    /// Make every NAV lookup for this scheme fail with a provider 503
    pub fn fail(&self, scheme_code: i64) {
        self.failing.lock().unwrap().insert(scheme_code);
    }

    pub fn set_schemes(&self, schemes: Vec<SchemeQuote>) {
        *self.schemes.lock().unwrap() = schemes;
    }

    pub fn nav_calls(&self) -> usize {
        self.nav_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PricingGateway for StubGateway {
    async fn fetch_nav(&self, scheme_code: i64) -> Result<NavQuote, GatewayError> {
        self.nav_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&scheme_code) {
            return Err(GatewayError::Status(503));
        }

        let nav = self
            .navs
            .lock()
            .unwrap()
            .get(&scheme_code)
            .copied()
            .ok_or(GatewayError::SchemeNotFound(scheme_code))?;

        Ok(NavQuote {
            scheme_code,
            nav,
            date: "15-Jan-2025".to_string(),
        })
    }

    async fn fetch_schemes(&self, fund_family: &str) -> Result<Vec<SchemeQuote>, GatewayError> {
        Ok(self
            .schemes
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.mutual_fund_family == fund_family)
            .cloned()
            .collect())
    }
}

/// Ledger over the in-memory store with a stub gateway and a pinned clock
pub struct TestLedger {
    pub store: Arc<MemoryLedgerStore>,
    pub gateway: Arc<StubGateway>,
    pub clock: Arc<FixedClock>,
    pub ledger: Arc<PurchaseLedger>,
}

impl TestLedger {
    pub fn new() -> Self {
        let store = Arc::new(MemoryLedgerStore::new());
        Self::with_store(store.clone(), store)
    }

    /// Build over an arbitrary store; `memory` is kept for direct inspection
    pub fn with_store(memory: Arc<MemoryLedgerStore>, store: Arc<dyn LedgerStore>) -> Self {
        let gateway = Arc::new(StubGateway::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let ledger = Arc::new(PurchaseLedger::new(store, gateway.clone(), clock.clone()));
        Self {
            store: memory,
            gateway,
            clock,
            ledger,
        }
    }

    pub async fn entry(&self, owner_id: &str, scheme_code: i64) -> Option<PurchaseEntry> {
        self.store
            .find_one(&LedgerFilter::by_key(owner_id, scheme_code))
            .await
            .unwrap()
    }
}

/// App state over in-memory stores
pub fn memory_state() -> (Arc<AppState>, Arc<StubGateway>) {
    let gateway = Arc::new(StubGateway::new());
    let state = AppState::new(
        Arc::new(MemoryLedgerStore::new()),
        Arc::new(MemoryUserStore::new()),
        gateway.clone(),
        Arc::new(FixedClock::new(t0())),
        &auth_config(),
    )
    .expect("Failed to build app state");
    (Arc::new(state), gateway)
}

/// PostgreSQL-backed stores for `#[sqlx::test]` pools
pub struct TestDatabase {
    pub pool: PgPool,
    pub ledger_store: Arc<PgLedgerStore>,
    pub user_store: Arc<PgUserStore>,
}

impl TestDatabase {
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            ledger_store: Arc::new(PgLedgerStore::new(pool.clone())),
            user_store: Arc::new(PgUserStore::new(pool.clone())),
            pool,
        }
    }
}

/// Assert that two entries hold the same position (ignoring storage ids)
pub fn assert_positions_equal(a: &PurchaseEntry, b: &PurchaseEntry) {
    assert_eq!(a.owner_id, b.owner_id);
    assert_eq!(a.scheme_code, b.scheme_code);
    assert_eq!(a.units, b.units);
    assert_eq!(a.nav, b.nav);
    assert_eq!(a.total_cost, b.total_cost);
}

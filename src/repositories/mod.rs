//! Persistence seams for ledger entries and users.
//!
//! Services only see the [`LedgerStore`] and [`UserStore`] traits. The
//! PostgreSQL implementations back the running service; the in-memory ones
//! back tests and local experiments.

pub mod memory;
pub mod purchase_repository;
pub mod user_repository;

use crate::error::StoreError;
use crate::models::{NewPurchase, PurchaseAction, PurchaseEntry, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

// Re-export all repositories for convenient access
pub use memory::{MemoryLedgerStore, MemoryUserStore};
pub use purchase_repository::PgLedgerStore;
pub use user_repository::PgUserStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Exact-match filter over ledger entries. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerFilter {
    pub id: Option<Uuid>,
    pub owner_id: Option<String>,
    pub scheme_code: Option<i64>,
    pub units: Option<i64>,
}

impl LedgerFilter {
    /// Match every entry
    pub fn all() -> Self {
        Self::default()
    }

    /// Match the entry for an (owner, scheme) pair
    pub fn by_key(owner_id: &str, scheme_code: i64) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            scheme_code: Some(scheme_code),
            ..Self::default()
        }
    }

    pub fn by_owner(owner_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Additionally require the stored unit count to equal `units`
    pub fn with_units(mut self, units: i64) -> Self {
        self.units = Some(units);
        self
    }

    pub fn matches(&self, entry: &PurchaseEntry) -> bool {
        self.id.map_or(true, |id| entry.id == id)
            && self
                .owner_id
                .as_deref()
                .map_or(true, |owner| entry.owner_id == owner)
            && self.scheme_code.map_or(true, |code| entry.scheme_code == code)
            && self.units.map_or(true, |units| entry.units == units)
    }
}

/// Field-level update of the mutable quantitative fields. Unset fields are
/// left as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurchaseUpdate {
    pub units: Option<i64>,
    pub nav: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PurchaseUpdate {
    /// Background resync: only the price and the derived value change
    pub fn revalue(nav: Decimal, total_cost: Decimal) -> Self {
        Self {
            nav: Some(nav),
            total_cost: Some(total_cost),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_none()
            && self.nav.is_none()
            && self.total_cost.is_none()
            && self.last_updated.is_none()
    }

    pub fn apply(&self, entry: &mut PurchaseEntry) {
        if let Some(units) = self.units {
            entry.units = units;
        }
        if let Some(nav) = self.nav {
            entry.nav = nav;
        }
        if let Some(total_cost) = self.total_cost {
            entry.total_cost = total_cost;
        }
        if let Some(last_updated) = self.last_updated {
            entry.last_updated = Some(last_updated);
        }
    }
}

/// Collection of purchase entries, one per (owner, scheme)
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// First entry matching the filter
    async fn find_one(&self, filter: &LedgerFilter) -> StoreResult<Option<PurchaseEntry>>;

    /// Insert a new entry; fails with `Duplicate` when the (owner, scheme) pair exists
    async fn insert_one(&self, entry: &PurchaseEntry) -> StoreResult<Uuid>;

    /// Update at most one matching entry, returning the number matched
    async fn update_one(&self, filter: &LedgerFilter, update: &PurchaseUpdate) -> StoreResult<u64>;

    /// All matching entries, oldest purchase first
    async fn find_all(&self, filter: &LedgerFilter) -> StoreResult<Vec<PurchaseEntry>>;

    /// Create the (owner, scheme) entry or accumulate into it, atomically.
    ///
    /// An existing entry gains `purchase.units`, is repriced at `purchase.nav`
    /// and stamped with `now` as `last_updated`.
    async fn upsert_accumulate(
        &self,
        owner_id: &str,
        purchase: &NewPurchase,
        now: DateTime<Utc>,
    ) -> StoreResult<(PurchaseEntry, PurchaseAction)>;
}

/// Registered users keyed by email
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Insert a user; fails with `Duplicate` when the email is taken
    async fn create(&self, email: &str, password_hash: &str) -> StoreResult<User>;
}

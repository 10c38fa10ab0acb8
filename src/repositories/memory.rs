//! In-memory stores. Every operation runs under a single lock, so each call
//! is atomic with respect to the others.

use super::{LedgerFilter, LedgerStore, PurchaseUpdate, StoreResult, UserStore};
use crate::error::StoreError;
use crate::models::{NewPurchase, PurchaseAction, PurchaseEntry, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryLedgerStore {
    // Insertion order doubles as purchase order
    entries: Mutex<Vec<PurchaseEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without any checks, e.g. to simulate a legacy record
    pub async fn seed(&self, entry: PurchaseEntry) {
        self.entries.lock().await.push(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove the entry for a key, simulating an out-of-band delete
    pub async fn remove(&self, owner_id: &str, scheme_code: i64) -> Option<PurchaseEntry> {
        let mut entries = self.entries.lock().await;
        let filter = LedgerFilter::by_key(owner_id, scheme_code);
        let idx = entries.iter().position(|e| filter.matches(e))?;
        Some(entries.remove(idx))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_one(&self, filter: &LedgerFilter) -> StoreResult<Option<PurchaseEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().find(|e| filter.matches(e)).cloned())
    }

    async fn insert_one(&self, entry: &PurchaseEntry) -> StoreResult<Uuid> {
        entry.validate().map_err(StoreError::ConstraintViolation)?;

        let mut entries = self.entries.lock().await;
        let key = LedgerFilter::by_key(&entry.owner_id, entry.scheme_code);
        if entries.iter().any(|e| key.matches(e) || e.id == entry.id) {
            return Err(StoreError::Duplicate(format!(
                "purchase for owner {} and scheme {} already exists",
                entry.owner_id, entry.scheme_code
            )));
        }
        entries.push(entry.clone());
        Ok(entry.id)
    }

    async fn update_one(&self, filter: &LedgerFilter, update: &PurchaseUpdate) -> StoreResult<u64> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.iter_mut().find(|e| filter.matches(e)) else {
            return Ok(0);
        };

        let mut updated = entry.clone();
        update.apply(&mut updated);
        updated.validate().map_err(StoreError::ConstraintViolation)?;
        *entry = updated;
        Ok(1)
    }

    async fn find_all(&self, filter: &LedgerFilter) -> StoreResult<Vec<PurchaseEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().filter(|e| filter.matches(e)).cloned().collect())
    }

    async fn upsert_accumulate(
        &self,
        owner_id: &str,
        purchase: &NewPurchase,
        now: DateTime<Utc>,
    ) -> StoreResult<(PurchaseEntry, PurchaseAction)> {
        let mut entries = self.entries.lock().await;
        let key = LedgerFilter::by_key(owner_id, purchase.scheme_code);

        if let Some(existing) = entries.iter_mut().find(|e| key.matches(e)) {
            let mut updated = existing.clone();
            updated
                .accumulate(purchase.units, purchase.nav, now)
                .map_err(StoreError::ConstraintViolation)?;
            *existing = updated.clone();
            return Ok((updated, PurchaseAction::Updated));
        }

        let entry =
            PurchaseEntry::open(owner_id, purchase, now).map_err(StoreError::ConstraintViolation)?;
        entries.push(entry.clone());
        Ok((entry, PurchaseAction::Created))
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users.lock().await.get(email).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let mut users = self.users.lock().await;
        if users.contains_key(email) {
            return Err(StoreError::Duplicate(format!("user {} already exists", email)));
        }
        let user = User::new(email.to_string(), password_hash.to_string());
        users.insert(email.to_string(), user.clone());
        Ok(user)
    }
}

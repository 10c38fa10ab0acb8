use crate::clock::Clock;
use crate::error::{AppError, AppResult, StoreError};
use crate::models::{
    is_storable_nav, round_nav, valuation, NewPurchase, PurchaseAction, PurchaseEntry,
    RefreshStatus,
};
use crate::nav_client::{GatewayError, PricingGateway};
use crate::repositories::{LedgerFilter, LedgerStore, PurchaseUpdate};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Attempts at the guarded refresh write before giving up on an entry
pub const MAX_REFRESH_ATTEMPTS: usize = 3;

/// Position after a buy
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    pub action: PurchaseAction,
    pub scheme_code: i64,
    pub units: i64,
    pub total_cost: Decimal,
}

/// Create-or-accumulate writes and valuation resyncs over a [`LedgerStore`]
pub struct PurchaseLedger {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PricingGateway>,
    clock: Arc<dyn Clock>,
}

impl PurchaseLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PricingGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
        }
    }

    /// Record a buy: open the position or add to it.
    ///
    /// A repeat buy reprices the whole position at the request's NAV.
    pub async fn record_purchase(
        &self,
        owner_id: &str,
        purchase: NewPurchase,
    ) -> AppResult<PurchaseReceipt> {
        purchase.validate().map_err(AppError::Validation)?;

        let (entry, action) = self
            .store
            .upsert_accumulate(owner_id, &purchase, self.clock.now())
            .await
            .map_err(|e| match e {
                // The accumulated position no longer fits the ledger
                StoreError::ConstraintViolation(msg) => {
                    AppError::Validation(format!("Purchase rejected: {}", msg))
                }
                other => AppError::Store(other),
            })?;

        info!(
            "Purchase {}: owner={}, scheme={}, units={}, total_cost={}",
            action.as_str(),
            owner_id,
            entry.scheme_code,
            entry.units,
            entry.total_cost
        );

        Ok(PurchaseReceipt {
            action,
            scheme_code: entry.scheme_code,
            units: entry.units,
            total_cost: entry.total_cost,
        })
    }

    /// Reprice one position at the provider's latest NAV.
    ///
    /// Only `nav` and `total_cost` change. The write is guarded on the unit
    /// count read just before it, so a buy landing in between forces a re-read.
    pub async fn refresh_valuation(&self, entry: &PurchaseEntry) -> AppResult<RefreshStatus> {
        let quote = self.gateway.fetch_nav(entry.scheme_code).await?;
        let nav = round_nav(quote.nav);
        if !is_storable_nav(nav) {
            return Err(GatewayError::InvalidNav(entry.scheme_code).into());
        }
        let key = LedgerFilter::by_key(&entry.owner_id, entry.scheme_code);

        for attempt in 1..=MAX_REFRESH_ATTEMPTS {
            let Some(current) = self.store.find_one(&key).await? else {
                debug!(
                    "No position left for owner={}, scheme={}",
                    entry.owner_id, entry.scheme_code
                );
                return Ok(RefreshStatus::NoPosition);
            };

            let total_cost = valuation(current.units, nav).ok_or_else(|| {
                AppError::Validation(format!(
                    "Position value overflow for scheme {}",
                    current.scheme_code
                ))
            })?;

            let guard = LedgerFilter::by_id(current.id).with_units(current.units);
            let update = PurchaseUpdate::revalue(nav, total_cost);
            if self.store.update_one(&guard, &update).await? == 1 {
                debug!(
                    "Refreshed scheme {} for {}: nav={}, total_cost={}",
                    current.scheme_code, current.owner_id, nav, total_cost
                );
                return Ok(RefreshStatus::Success);
            }

            debug!(
                "Refresh guard missed for entry {} (attempt {}/{})",
                current.id, attempt, MAX_REFRESH_ATTEMPTS
            );
        }

        Err(AppError::Conflict(format!(
            "position for scheme {} kept changing during refresh",
            entry.scheme_code
        )))
    }

    /// All positions of one owner, oldest first
    pub async fn portfolio(&self, owner_id: &str) -> AppResult<Vec<PurchaseEntry>> {
        Ok(self.store.find_all(&LedgerFilter::by_owner(owner_id)).await?)
    }

    /// Every position in the ledger
    pub async fn entries(&self) -> AppResult<Vec<PurchaseEntry>> {
        Ok(self.store.find_all(&LedgerFilter::all()).await?)
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a buy against the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseAction {
    Created,
    Updated,
}

impl PurchaseAction {
    /// Convert to response string
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseAction::Created => "created",
            PurchaseAction::Updated => "updated",
        }
    }
}

/// Outcome of a single valuation refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Success,
    NoPosition,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::Success => "success",
            RefreshStatus::NoPosition => "no_position",
        }
    }
}

/// Descriptive scheme fields copied from the buy request that opened a position.
/// Never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeDetails {
    pub scheme_name: String,
    /// NAV date as reported by the provider, e.g. `14-Jan-2025`
    pub scheme_date: String,
    pub scheme_category: String,
    pub fund_family: Option<String>,
    pub isin_growth: String,
    pub isin_reinvestment: String,
}

/// A validated-on-demand buy request for one scheme
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub scheme_code: i64,
    pub details: SchemeDetails,
    pub units: i64,
    pub nav: Decimal,
}

/// Decimal places kept for a stored NAV
pub const NAV_SCALE: u32 = 8;

// Exclusive upper bounds of the `nav` NUMERIC(20, 8) and `total_cost` NUMERIC(30, 8) columns
fn nav_limit() -> Decimal {
    Decimal::from_i128_with_scale(10_i128.pow(12), 0)
}

fn total_cost_limit() -> Decimal {
    Decimal::from_i128_with_scale(10_i128.pow(22), 0)
}

/// Round a NAV to the precision the ledger stores, the way a NUMERIC column would
pub fn round_nav(nav: Decimal) -> Decimal {
    nav.round_dp_with_strategy(NAV_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether an already rounded NAV is positive and fits the ledger
pub fn is_storable_nav(nav: Decimal) -> bool {
    nav > Decimal::ZERO && nav < nav_limit()
}

/// Position value: `units * nav`, or `None` when it does not fit the ledger
pub fn valuation(units: i64, nav: Decimal) -> Option<Decimal> {
    Decimal::from(units)
        .checked_mul(nav)
        .filter(|value| value.abs() < total_cost_limit())
}

impl NewPurchase {
    /// Check buy preconditions. Nothing may be written when this fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.units <= 0 {
            return Err("Units must be greater than 0.".to_string());
        }
        let nav = self.stored_nav();
        if nav <= Decimal::ZERO {
            return Err("NAV must be greater than 0.".to_string());
        }
        if !is_storable_nav(nav) {
            return Err("NAV is too large.".to_string());
        }
        if self.cost().is_none() {
            return Err("Purchase amount is too large.".to_string());
        }
        Ok(())
    }

    /// NAV as it will be persisted
    pub fn stored_nav(&self) -> Decimal {
        round_nav(self.nav)
    }

    /// Cost of this purchase alone, at the stored NAV
    pub fn cost(&self) -> Option<Decimal> {
        valuation(self.units, self.stored_nav())
    }
}

/// Persisted record of a user's cumulative holding in one scheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEntry {
    pub id: Uuid,
    pub owner_id: String,
    pub scheme_code: i64,
    pub details: SchemeDetails,
    pub units: i64,
    pub nav: Decimal,
    pub total_cost: Decimal,
    pub purchase_date: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PurchaseEntry {
    /// Build the first entry for an (owner, scheme) pair
    pub fn open(owner_id: &str, purchase: &NewPurchase, now: DateTime<Utc>) -> Result<Self, String> {
        purchase.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            scheme_code: purchase.scheme_code,
            details: purchase.details.clone(),
            units: purchase.units,
            nav: purchase.stored_nav(),
            total_cost: purchase.cost().unwrap_or_default(),
            purchase_date: now,
            last_updated: None,
        })
    }

    /// Apply a repeat buy: add units and reprice the whole position at `nav`
    pub fn accumulate(&mut self, units: i64, nav: Decimal, now: DateTime<Utc>) -> Result<(), String> {
        let nav = round_nav(nav);
        let new_units = self
            .units
            .checked_add(units)
            .ok_or_else(|| "Unit count overflow".to_string())?;
        let total_cost =
            valuation(new_units, nav).ok_or_else(|| "Position value overflow".to_string())?;

        self.units = new_units;
        self.nav = nav;
        self.total_cost = total_cost;
        self.last_updated = Some(now);
        Ok(())
    }

    /// Check the record invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.units <= 0 {
            return Err(format!(
                "purchase {} has non-positive units ({})",
                self.id, self.units
            ));
        }
        if self.nav <= Decimal::ZERO {
            return Err(format!("purchase {} has non-positive NAV ({})", self.id, self.nav));
        }
        Ok(())
    }
}

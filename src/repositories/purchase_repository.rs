use super::{LedgerFilter, LedgerStore, PurchaseUpdate, StoreResult};
use crate::error::StoreError;
use crate::models::{NewPurchase, PurchaseAction, PurchaseEntry, SchemeDetails};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use tracing::warn;
use uuid::Uuid;

const COLUMNS: &str = "id, owner_id, scheme_code, scheme_name, scheme_date, scheme_category, \
     fund_family, isin_growth, isin_reinvestment, units, nav, total_cost, purchase_date, last_updated";

/// Raw `purchases` row. Converted into a [`PurchaseEntry`] only after the
/// record invariants have been checked.
#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: Uuid,
    owner_id: String,
    scheme_code: i64,
    scheme_name: String,
    scheme_date: String,
    scheme_category: String,
    fund_family: Option<String>,
    isin_growth: String,
    isin_reinvestment: String,
    units: i64,
    nav: Decimal,
    total_cost: Decimal,
    purchase_date: DateTime<Utc>,
    last_updated: Option<DateTime<Utc>>,
}

impl TryFrom<PurchaseRow> for PurchaseEntry {
    type Error = StoreError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let entry = PurchaseEntry {
            id: row.id,
            owner_id: row.owner_id,
            scheme_code: row.scheme_code,
            details: SchemeDetails {
                scheme_name: row.scheme_name,
                scheme_date: row.scheme_date,
                scheme_category: row.scheme_category,
                fund_family: row.fund_family,
                isin_growth: row.isin_growth,
                isin_reinvestment: row.isin_reinvestment,
            },
            units: row.units,
            nav: row.nav,
            total_cost: row.total_cost,
            purchase_date: row.purchase_date,
            last_updated: row.last_updated,
        };
        entry.validate().map_err(StoreError::Mapping)?;
        Ok(entry)
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &LedgerFilter) {
    builder.push(" WHERE TRUE");
    if let Some(id) = filter.id {
        builder.push(" AND id = ").push_bind(id);
    }
    if let Some(owner_id) = &filter.owner_id {
        builder.push(" AND owner_id = ").push_bind(owner_id.clone());
    }
    if let Some(scheme_code) = filter.scheme_code {
        builder.push(" AND scheme_code = ").push_bind(scheme_code);
    }
    if let Some(units) = filter.units {
        builder.push(" AND units = ").push_bind(units);
    }
}

/// Ledger store backed by the `purchases` table
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_one(&self, filter: &LedgerFilter) -> StoreResult<Option<PurchaseEntry>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM purchases", COLUMNS));
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY purchase_date, id LIMIT 1");

        let row = builder
            .build_query_as::<PurchaseRow>()
            .fetch_optional(&self.pool)
            .await?;

        row.map(PurchaseEntry::try_from).transpose()
    }

    async fn insert_one(&self, entry: &PurchaseEntry) -> StoreResult<Uuid> {
        entry.validate().map_err(StoreError::ConstraintViolation)?;

        let sql = format!(
            "INSERT INTO purchases ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            COLUMNS
        );
        sqlx::query(&sql)
            .bind(entry.id)
            .bind(&entry.owner_id)
            .bind(entry.scheme_code)
            .bind(&entry.details.scheme_name)
            .bind(&entry.details.scheme_date)
            .bind(&entry.details.scheme_category)
            .bind(&entry.details.fund_family)
            .bind(&entry.details.isin_growth)
            .bind(&entry.details.isin_reinvestment)
            .bind(entry.units)
            .bind(entry.nav)
            .bind(entry.total_cost)
            .bind(entry.purchase_date)
            .bind(entry.last_updated)
            .execute(&self.pool)
            .await?;

        Ok(entry.id)
    }

    async fn update_one(&self, filter: &LedgerFilter, update: &PurchaseUpdate) -> StoreResult<u64> {
        if update.is_empty() {
            return Ok(self.find_one(filter).await?.map_or(0, |_| 1));
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE purchases SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(units) = update.units {
                set.push("units = ").push_bind_unseparated(units);
            }
            if let Some(nav) = update.nav {
                set.push("nav = ").push_bind_unseparated(nav);
            }
            if let Some(total_cost) = update.total_cost {
                set.push("total_cost = ").push_bind_unseparated(total_cost);
            }
            if let Some(last_updated) = update.last_updated {
                set.push("last_updated = ").push_bind_unseparated(last_updated);
            }
        }

        // Row-lock the single target so a concurrent writer re-checks the filter
        builder.push(" WHERE id = (SELECT id FROM purchases");
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY purchase_date, id LIMIT 1 FOR UPDATE)");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn find_all(&self, filter: &LedgerFilter) -> StoreResult<Vec<PurchaseEntry>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM purchases", COLUMNS));
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY purchase_date, id");

        let rows = builder.build().fetch_all(&self.pool).await?;

        // A malformed row is skipped so it cannot hide every other position
        let entries = rows
            .iter()
            .filter_map(|row| {
                let mapped = PurchaseRow::from_row(row)
                    .map_err(StoreError::from)
                    .and_then(PurchaseEntry::try_from);
                match mapped {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("Skipping unreadable purchase row: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(entries)
    }

    async fn upsert_accumulate(
        &self,
        owner_id: &str,
        purchase: &NewPurchase,
        now: DateTime<Utc>,
    ) -> StoreResult<(PurchaseEntry, PurchaseAction)> {
        purchase.validate().map_err(StoreError::ConstraintViolation)?;
        let cost = purchase
            .cost()
            .ok_or_else(|| StoreError::ConstraintViolation("purchase value overflow".to_string()))?;

        // The conflict arm accumulates inside the statement, so concurrent buys
        // for one key serialize on the row instead of racing read-then-write.
        let sql = format!(
            r#"
            INSERT INTO purchases ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NULL)
            ON CONFLICT (owner_id, scheme_code) DO UPDATE SET
                units = purchases.units + EXCLUDED.units,
                nav = EXCLUDED.nav,
                total_cost = (purchases.units + EXCLUDED.units) * EXCLUDED.nav,
                last_updated = EXCLUDED.purchase_date
            RETURNING {columns}, (xmax = 0) AS inserted
            "#,
            columns = COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(owner_id)
            .bind(purchase.scheme_code)
            .bind(&purchase.details.scheme_name)
            .bind(&purchase.details.scheme_date)
            .bind(&purchase.details.scheme_category)
            .bind(&purchase.details.fund_family)
            .bind(&purchase.details.isin_growth)
            .bind(&purchase.details.isin_reinvestment)
            .bind(purchase.units)
            .bind(purchase.stored_nav())
            .bind(cost)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        let inserted: bool = row.try_get("inserted")?;
        let entry = PurchaseEntry::try_from(PurchaseRow::from_row(&row)?)?;
        let action = if inserted {
            PurchaseAction::Created
        } else {
            PurchaseAction::Updated
        };

        Ok((entry, action))
    }
}

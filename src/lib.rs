//! MFB Backend Library
//!
//! This module exposes the backend components for use by tests and other consumers.

pub mod auth;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod http_service;
pub mod models;
pub mod nav_client;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use auth::TokenManager;
use clock::Clock;
use config::AuthConfig;
use nav_client::PricingGateway;
use repositories::{LedgerStore, PgLedgerStore, PgUserStore, UserStore};
use services::{AccountService, FundService, PurchaseLedger};
use std::sync::Arc;

/// Application state shared by the HTTP handlers and the refresh scheduler
pub struct AppState {
    pub ledger: Arc<PurchaseLedger>,
    pub accounts: AccountService,
    pub funds: FundService,
    pub tokens: Arc<TokenManager>,
}

impl AppState {
    /// Wire services over the given stores and gateway
    pub fn new(
        ledger_store: Arc<dyn LedgerStore>,
        user_store: Arc<dyn UserStore>,
        gateway: Arc<dyn PricingGateway>,
        clock: Arc<dyn Clock>,
        auth: &AuthConfig,
    ) -> AppResult<Self> {
        let tokens = Arc::new(TokenManager::new(auth));

        Ok(Self {
            ledger: Arc::new(PurchaseLedger::new(ledger_store, gateway.clone(), clock)),
            accounts: AccountService::new(user_store, tokens.clone()),
            funds: FundService::new(gateway)?,
            tokens,
        })
    }

    /// State backed by the PostgreSQL stores
    pub fn with_postgres(
        pool: sqlx::PgPool,
        gateway: Arc<dyn PricingGateway>,
        auth: &AuthConfig,
    ) -> AppResult<Self> {
        Self::new(
            Arc::new(PgLedgerStore::new(pool.clone())),
            Arc::new(PgUserStore::new(pool)),
            gateway,
            Arc::new(clock::SystemClock),
            auth,
        )
    }
}

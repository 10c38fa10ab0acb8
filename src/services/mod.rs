pub mod account_service;
pub mod fund_service;
pub mod ledger_service;
pub mod refresh_scheduler;

pub use account_service::{AccountService, LoginSession};
pub use fund_service::FundService;
pub use ledger_service::{PurchaseLedger, PurchaseReceipt, MAX_REFRESH_ATTEMPTS};
pub use refresh_scheduler::{RefreshReport, RefreshScheduler};

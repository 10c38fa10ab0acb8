//! Domain models for the MFB backend.
//!
//! Ledger positions, registered users and the provider's scheme records.

pub mod purchase;
pub mod scheme;
pub mod user;

// Re-export all models for convenient access
pub use purchase::{
    is_storable_nav, round_nav, valuation, NewPurchase, PurchaseAction, PurchaseEntry,
    RefreshStatus, SchemeDetails,
};
pub use scheme::{NavQuote, SchemeQuote};
pub use user::{User, UserProfile};

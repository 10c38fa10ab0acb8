//! Client side of the external NAV provider.

pub mod rapidapi;

use crate::models::{NavQuote, SchemeQuote};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use rapidapi::RapidApiClient;

/// Errors raised while talking to the NAV provider
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("NAV provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("NAV provider returned HTTP {0}")]
    Status(u16),

    #[error("Failed to decode NAV provider response: {0}")]
    Decode(String),

    #[error("NAV provider has no data for scheme {0}")]
    SchemeNotFound(i64),

    #[error("NAV provider reported an out-of-range NAV for scheme {0}")]
    InvalidNav(i64),

    #[error("NAV provider is misconfigured: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Transport failures, throttling and provider-side 5xx may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Request(_) => true,
            GatewayError::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Source of current NAVs and scheme listings
#[async_trait]
pub trait PricingGateway: Send + Sync {
    /// Latest NAV for one scheme
    async fn fetch_nav(&self, scheme_code: i64) -> Result<NavQuote, GatewayError>;

    /// Latest open-ended schemes of one fund family
    async fn fetch_schemes(&self, fund_family: &str) -> Result<Vec<SchemeQuote>, GatewayError>;
}

/// Retries an async request on transport errors
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
pub(crate) async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

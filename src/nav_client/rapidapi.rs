use super::{with_retry, GatewayError, PricingGateway};
use crate::config::NavProviderConfig;
use crate::models::{NavQuote, SchemeQuote};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

const DEFAULT_RETRIES: usize = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;
// Longest provider body quoted back in decode errors
const MAX_ECHOED_BODY: usize = 200;

/// Client for the RapidAPI "latest mutual fund NAV" service
pub struct RapidApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_host: String,
    retries: usize,
    retry_delay_ms: u64,
}

impl RapidApiClient {
    pub fn new(config: &NavProviderConfig) -> Result<Self, GatewayError> {
        if config.base_url.trim().is_empty() {
            return Err(GatewayError::Configuration("base URL is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("mfb-backend/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_host: config.api_host.clone(),
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        })
    }

    /// Override how transport failures are retried
    pub fn with_retry_policy(mut self, retries: usize, delay_ms: u64) -> Self {
        self.retries = retries;
        self.retry_delay_ms = delay_ms;
        self
    }

    async fn fetch_latest(&self, query: &[(&str, String)]) -> Result<Vec<SchemeQuote>, GatewayError> {
        let url = format!("{}/latest", self.base_url);
        debug!("Requesting NAV data from {} with {:?}", url, query);

        let response = with_retry(
            || {
                self.http
                    .get(&url)
                    .query(query)
                    .header("X-RapidAPI-Key", &self.api_key)
                    .header("X-RapidAPI-Host", &self.api_host)
                    .send()
            },
            self.retries,
            self.retry_delay_ms,
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(GatewayError::Decode("empty response body".to_string()));
        }

        serde_json::from_str::<Vec<SchemeQuote>>(&body).map_err(|e| {
            let echoed: String = body.chars().take(MAX_ECHOED_BODY).collect();
            GatewayError::Decode(format!("{}. Response: '{}'", e, echoed))
        })
    }
}

#[async_trait]
impl PricingGateway for RapidApiClient {
    async fn fetch_nav(&self, scheme_code: i64) -> Result<NavQuote, GatewayError> {
        let schemes = self
            .fetch_latest(&[
                ("Scheme_Type", "Open".to_string()),
                ("Scheme_Code", scheme_code.to_string()),
            ])
            .await?;

        let quote = schemes
            .iter()
            .find(|s| s.scheme_code == scheme_code)
            .ok_or(GatewayError::SchemeNotFound(scheme_code))?;

        if quote.net_asset_value <= Decimal::ZERO {
            return Err(GatewayError::InvalidNav(scheme_code));
        }

        debug!(
            "Fetched NAV for scheme {}: {} ({})",
            scheme_code, quote.net_asset_value, quote.date
        );
        Ok(NavQuote::from(quote))
    }

    async fn fetch_schemes(&self, fund_family: &str) -> Result<Vec<SchemeQuote>, GatewayError> {
        self.fetch_latest(&[
            ("Scheme_Type", "Open".to_string()),
            ("Mutual_Fund_Family", fund_family.to_string()),
        ])
        .await
    }
}

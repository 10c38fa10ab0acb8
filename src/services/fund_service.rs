use crate::error::{AppError, AppResult};
use crate::models::SchemeQuote;
use crate::nav_client::PricingGateway;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const BUNDLED_FAMILIES: &str = include_str!("../../data/fund_families.json");

#[derive(Deserialize)]
struct FamilyList {
    fund_families: Vec<String>,
}

/// Fund-family directory and proxied scheme listings
pub struct FundService {
    families: Vec<String>,
    gateway: Arc<dyn PricingGateway>,
}

impl FundService {
    /// Build with the bundled fund-family list
    pub fn new(gateway: Arc<dyn PricingGateway>) -> AppResult<Self> {
        let list: FamilyList = serde_json::from_str(BUNDLED_FAMILIES)?;
        Ok(Self::with_families(list.fund_families, gateway))
    }

    pub fn with_families(families: Vec<String>, gateway: Arc<dyn PricingGateway>) -> Self {
        Self { families, gateway }
    }

    pub fn families(&self) -> &[String] {
        &self.families
    }

    /// Latest open-ended schemes of one fund family
    pub async fn schemes(&self, fund_family: &str) -> AppResult<Vec<SchemeQuote>> {
        let fund_family = fund_family.trim();
        if fund_family.is_empty() {
            return Err(AppError::Validation("Fund family is required.".to_string()));
        }

        let schemes = self.gateway.fetch_schemes(fund_family).await?;
        debug!("Provider returned {} schemes for {}", schemes.len(), fund_family);
        Ok(schemes)
    }
}

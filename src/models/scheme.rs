use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One scheme record as published by the NAV provider. Field names follow
/// the provider's JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeQuote {
    #[serde(rename = "Scheme_Code")]
    pub scheme_code: i64,
    #[serde(rename = "ISIN_Div_Payout_ISIN_Growth", default)]
    pub isin_growth: String,
    #[serde(rename = "ISIN_Div_Reinvestment", default)]
    pub isin_reinvestment: String,
    #[serde(rename = "Scheme_Name")]
    pub scheme_name: String,
    #[serde(rename = "Net_Asset_Value")]
    pub net_asset_value: Decimal,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Scheme_Type", default)]
    pub scheme_type: String,
    #[serde(rename = "Scheme_Category", default)]
    pub scheme_category: String,
    #[serde(rename = "Mutual_Fund_Family", default)]
    pub mutual_fund_family: String,
}

/// Latest NAV for a scheme
#[derive(Debug, Clone, PartialEq)]
pub struct NavQuote {
    pub scheme_code: i64,
    pub nav: Decimal,
    pub date: String,
}

impl From<&SchemeQuote> for NavQuote {
    fn from(quote: &SchemeQuote) -> Self {
        Self {
            scheme_code: quote.scheme_code,
            nav: quote.net_asset_value,
            date: quote.date.clone(),
        }
    }
}

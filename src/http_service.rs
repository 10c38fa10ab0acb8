//! REST surface over the ledger, the account service and the fund directory.

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{NewPurchase, PurchaseAction, PurchaseEntry, SchemeDetails, SchemeQuote};
use crate::AppState;
use axum::{
    extract::{FromRequest, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

/// `Json` extractor whose rejections use the `AppError` body
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct FundFamilyRequest {
    pub fund_family: String,
}

/// Buy request, field names as sent by the front end
#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    #[serde(rename = "Scheme_Code")]
    pub scheme_code: i64,
    #[serde(rename = "Scheme_Name")]
    pub scheme_name: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Scheme_Category")]
    pub scheme_category: String,
    #[serde(rename = "Mutual_Fund_Family", default)]
    pub mutual_fund_family: Option<String>,
    pub units: i64,
    pub nav: Decimal,
    #[serde(rename = "ISIN_Div_Payout_ISIN_Growth")]
    pub isin_growth: String,
    #[serde(rename = "ISIN_Div_Reinvestment")]
    pub isin_reinvestment: String,
}

impl From<BuyRequest> for NewPurchase {
    fn from(req: BuyRequest) -> Self {
        NewPurchase {
            scheme_code: req.scheme_code,
            details: SchemeDetails {
                scheme_name: req.scheme_name,
                scheme_date: req.date,
                scheme_category: req.scheme_category,
                fund_family: req.mutual_fund_family,
                isin_growth: req.isin_growth,
                isin_reinvestment: req.isin_reinvestment,
            },
            units: req.units,
            nav: req.nav,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BuyResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub action: PurchaseAction,
    #[serde(rename = "Scheme_Code")]
    pub scheme_code: i64,
    pub units: i64,
    /// Two-decimal rendering of the position value
    pub total_cost: String,
}

#[derive(Debug, Serialize)]
pub struct PortfolioItem {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    #[serde(rename = "Scheme_Code")]
    pub scheme_code: i64,
    #[serde(rename = "Scheme_Name")]
    pub scheme_name: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Scheme_Category")]
    pub scheme_category: String,
    #[serde(rename = "Mutual_Fund_Family")]
    pub mutual_fund_family: Option<String>,
    #[serde(rename = "ISIN_Div_Payout_ISIN_Growth")]
    pub isin_growth: String,
    #[serde(rename = "ISIN_Div_Reinvestment")]
    pub isin_reinvestment: String,
    pub units: i64,
    #[serde(rename = "Net_Asset_Value")]
    pub net_asset_value: Decimal,
    pub total_cost: Decimal,
    pub purchase_date: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<PurchaseEntry> for PortfolioItem {
    fn from(entry: PurchaseEntry) -> Self {
        PortfolioItem {
            id: entry.id,
            email: entry.owner_id,
            scheme_code: entry.scheme_code,
            scheme_name: entry.details.scheme_name,
            date: entry.details.scheme_date,
            scheme_category: entry.details.scheme_category,
            mutual_fund_family: entry.details.fund_family,
            isin_growth: entry.details.isin_growth,
            isin_reinvestment: entry.details.isin_reinvestment,
            units: entry.units,
            net_asset_value: entry.nav,
            total_cost: entry.total_cost,
            purchase_date: entry.purchase_date,
            last_updated: entry.last_updated,
        }
    }
}

/// Render an amount with exactly two decimals
fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "ok" }))
}

async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<Credentials>,
) -> AppResult<Json<Value>> {
    state.accounts.register(&body.email, &body.password).await?;
    Ok(Json(json!({ "message": "User registered successfully." })))
}

async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<Credentials>,
) -> AppResult<Json<Value>> {
    let session = state.accounts.login(&body.email, &body.password).await?;
    Ok(Json(json!({
        "message": "Login successful",
        "access_token": session.access_token,
        "token_type": "bearer",
        "user": session.user,
    })))
}

async fn fund_families(_user: AuthUser, State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "fund_families": state.funds.families(),
    }))
}

async fn open_ended_schemes(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<FundFamilyRequest>,
) -> AppResult<Json<Value>> {
    let schemes: Vec<SchemeQuote> = state.funds.schemes(&body.fund_family).await?;
    Ok(Json(json!({ "status": "success", "data": schemes })))
}

async fn buy(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<BuyRequest>,
) -> AppResult<Json<BuyResponse>> {
    let receipt = state.ledger.record_purchase(&user.email, body.into()).await?;
    let message = match receipt.action {
        PurchaseAction::Created => "Purchase created successfully.",
        PurchaseAction::Updated => "Purchase updated successfully.",
    };

    Ok(Json(BuyResponse {
        status: "success",
        message,
        action: receipt.action,
        scheme_code: receipt.scheme_code,
        units: receipt.units,
        total_cost: money(receipt.total_cost),
    }))
}

async fn portfolio(user: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let entries = state.ledger.portfolio(&user.email).await?;
    if entries.is_empty() {
        return Err(AppError::NotFound("No purchases found for this user.".to_string()));
    }

    let items: Vec<PortfolioItem> = entries.into_iter().map(PortfolioItem::from).collect();
    Ok(Json(json!({ "status": "success", "portfolio": items })))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn app_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let v1 = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/fund_families", get(fund_families))
        .route("/fund_schemes/latest/open_ended", post(open_ended_schemes))
        .route("/buy", post(buy))
        .route("/portfolio", get(portfolio));

    Router::new()
        .route("/", get(root))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

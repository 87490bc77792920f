use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use substruct_order::affiliate::MonthlyEarnings;
use substruct_order::Affiliate;
use substruct_shared::Cents;

use crate::{
    error::AppError,
    middleware::{affiliate_auth_middleware, auth::issue_affiliate_token, AffiliateClaims},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AffiliateLoginRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug, Serialize)]
pub struct EarningsResponse {
    pub affiliate: Affiliate,
    pub total_earnings_cents: Cents,
    pub total_amount_paid_cents: Cents,
    pub total_owed_cents: Cents,
    pub earnings_by_month: Vec<MonthlyEarnings>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/affiliates/me/earnings", get(my_earnings))
        .route_layer(from_fn_with_state(state, affiliate_auth_middleware));

    Router::new()
        .route("/affiliates/login", post(login_affiliate))
        .merge(protected)
}

/// POST /affiliates/login
/// Affiliates sign in with their email address and affiliate code.
async fn login_affiliate(
    State(state): State<AppState>,
    Json(req): Json<AffiliateLoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let affiliate = state
        .affiliates
        .authenticate(&req.email, &req.code)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Invalid email or affiliate code".to_string()))?;

    let token = issue_affiliate_token(&state.auth, affiliate.id, &affiliate.email_address)
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    tracing::info!("Affiliate {} signed in", affiliate.code);
    Ok(Json(AuthResponse { token }))
}

/// GET /affiliates/me/earnings
async fn my_earnings(
    State(state): State<AppState>,
    Extension(claims): Extension<AffiliateClaims>,
) -> Result<Json<EarningsResponse>, AppError> {
    let affiliate = state.affiliates.get(claims.sub).await?;
    if !affiliate.is_enabled {
        return Err(AppError::AuthorizationError("Affiliate account is disabled".to_string()));
    }

    let total_earnings_cents = state.affiliates.total_earnings(&affiliate).await?;
    let total_amount_paid_cents = state.affiliates.total_amount_paid(&affiliate).await?;
    let earnings_by_month = state.affiliates.earnings_by_month(&affiliate).await?;

    Ok(Json(EarningsResponse {
        total_owed_cents: total_earnings_cents - total_amount_paid_cents,
        total_earnings_cents,
        total_amount_paid_cents,
        earnings_by_month,
        affiliate,
    }))
}

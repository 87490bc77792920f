use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{AppState, AuthConfig};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AffiliateClaims {
    /// Affiliate id.
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_AFFILIATE: &str = "AFFILIATE";

fn expiry(auth: &AuthConfig) -> usize {
    (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize
}

pub fn issue_admin_token(auth: &AuthConfig, subject: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = AdminClaims {
        sub: subject.to_string(),
        role: ROLE_ADMIN.to_string(),
        exp: expiry(auth),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
}

pub fn issue_affiliate_token(
    auth: &AuthConfig,
    affiliate_id: Uuid,
    email: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = AffiliateClaims {
        sub: affiliate_id,
        email: email.to_string(),
        role: ROLE_AFFILIATE.to_string(),
        exp: expiry(auth),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
}

fn decode_bearer<C: DeserializeOwned>(headers: &HeaderMap, secret: &str) -> Result<C, StatusCode> {
    let token = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    decode::<C>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| StatusCode::UNAUTHORIZED)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims: AdminClaims = decode_bearer(req.headers(), &state.auth.secret)?;

    if claims.role != ROLE_ADMIN {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ============================================================================
// Affiliate Authentication Middleware
// ============================================================================

pub async fn affiliate_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims: AffiliateClaims = decode_bearer(req.headers(), &state.auth.secret)?;

    if claims.role != ROLE_AFFILIATE {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

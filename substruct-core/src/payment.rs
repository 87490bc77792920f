use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use substruct_shared::Masked;
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditCard {
    pub number: Masked<String>,
    pub month: u32,
    pub year: i32,
    pub first_name: String,
    pub last_name: String,
}

/// Address block sent to the card gateway for AVS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingDetails {
    pub address1: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub order_number: i64,
    pub amount_cents: i64,
    pub card: CreditCard,
    pub billing: BillingDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub success: bool,
    /// Gateway transaction id, kept on the order as `auth_transaction_id`.
    pub authorization: Option<String>,
    pub message: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment gateway unreachable: {0}")]
    Transport(String),
    #[error("Unexpected gateway response: {0}")]
    Protocol(String),
}

/// Synchronous card charge (Authorize.Net style).
#[async_trait]
pub trait CardGateway: Send + Sync {
    async fn purchase(&self, request: &ChargeRequest) -> Result<ChargeResponse, PaymentError>;
}

/// Post-back verification of an asynchronous payment notification (PayPal IPN).
#[async_trait]
pub trait IpnVerifier: Send + Sync {
    /// Returns true when the processor confirms it sent the raw notification body.
    async fn acknowledge(&self, raw_notification: &str) -> Result<bool, PaymentError>;
}

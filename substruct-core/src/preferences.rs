use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::CoreError;

/// Which card processor checkout runs through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CardProcessor {
    AuthorizeNet,
    PaypalIpn,
}

impl FromStr for CardProcessor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "authorize.net" | "authorize_net" => Ok(CardProcessor::AuthorizeNet),
            "paypal ipn" | "paypal_ipn" => Ok(CardProcessor::PaypalIpn),
            other => Err(CoreError::PreferenceError {
                key: "cc_processor".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Store-wide preferences. Loaded from configuration, then overridden by the
/// `preferences` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorePreferences {
    pub store_name: String,
    pub cc_processor: CardProcessor,
    /// Merchant login: the Authorize.Net API login, or the PayPal business address.
    pub cc_login: String,
    #[serde(default)]
    pub cc_clear_after_order: bool,
    #[serde(default = "default_true")]
    pub store_use_inventory_control: bool,
    #[serde(default)]
    pub store_test_transactions: bool,
    #[serde(default)]
    pub store_handling_fee_cents: i64,
    #[serde(default)]
    pub affiliate_revenue_percentage: f64,
    #[serde(default)]
    pub affiliate_paid_order_delay_days: i64,
    pub mail_from: String,
    #[serde(default)]
    pub mail_copy_to: Vec<String>,
    /// Body text prepended to order receipts. Receipts are not sent without it.
    #[serde(default)]
    pub receipt_template: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for StorePreferences {
    fn default() -> Self {
        Self {
            store_name: "Substruct".to_string(),
            cc_processor: CardProcessor::AuthorizeNet,
            cc_login: String::new(),
            cc_clear_after_order: false,
            store_use_inventory_control: true,
            store_test_transactions: false,
            store_handling_fee_cents: 0,
            affiliate_revenue_percentage: 0.0,
            affiliate_paid_order_delay_days: 0,
            mail_from: "store@localhost".to_string(),
            mail_copy_to: Vec::new(),
            receipt_template: None,
        }
    }
}

/// Parses a comma separated address list ("a@x.com, b@x.com").
pub fn split_addresses(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

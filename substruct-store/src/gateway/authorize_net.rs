use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;
use substruct_core::payment::{CardGateway, ChargeRequest, ChargeResponse, PaymentError};
use substruct_shared::money::format_cents;

use super::http_client;

const DELIMITER: char = '|';
const APPROVED: &str = "1";

/// Authorize.Net AIM client: one form post per purchase, pipe-delimited reply.
pub struct AuthorizeNetGateway {
    client: reqwest::Client,
    endpoint: Url,
    login: String,
    transaction_key: String,
    test_mode: bool,
}

impl AuthorizeNetGateway {
    pub fn new(
        endpoint: &str,
        login: &str,
        transaction_key: &str,
        test_mode: bool,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| PaymentError::Protocol(format!("bad Authorize.Net endpoint {}: {}", endpoint, e)))?;

        Ok(Self {
            client: http_client(timeout)?,
            endpoint,
            login: login.to_string(),
            transaction_key: transaction_key.to_string(),
            test_mode,
        })
    }

    fn form(&self, request: &ChargeRequest) -> Vec<(&'static str, String)> {
        let card = &request.card;
        let billing = &request.billing;
        vec![
            ("x_login", self.login.clone()),
            ("x_tran_key", self.transaction_key.clone()),
            ("x_version", "3.1".to_string()),
            ("x_type", "AUTH_CAPTURE".to_string()),
            ("x_method", "CC".to_string()),
            ("x_delim_data", "TRUE".to_string()),
            ("x_delim_char", DELIMITER.to_string()),
            ("x_relay_response", "FALSE".to_string()),
            ("x_test_request", if self.test_mode { "TRUE" } else { "FALSE" }.to_string()),
            ("x_amount", format_cents(request.amount_cents)),
            ("x_invoice_num", request.order_number.to_string()),
            ("x_card_num", card.number.expose().clone()),
            ("x_exp_date", format!("{:02}{:04}", card.month, card.year)),
            ("x_first_name", card.first_name.clone()),
            ("x_last_name", card.last_name.clone()),
            ("x_address", billing.address1.clone()),
            ("x_city", billing.city.clone()),
            ("x_state", billing.state.clone()),
            ("x_zip", billing.zip.clone()),
            ("x_country", billing.country.clone()),
        ]
    }
}

/// Reads the delimited reply: field 1 is the response code, 4 the reason text, 7 the
/// transaction id.
fn parse_response(body: &str) -> Result<ChargeResponse, PaymentError> {
    let fields: Vec<&str> = body.trim().split(DELIMITER).collect();
    if fields.len() < 7 {
        return Err(PaymentError::Protocol(format!(
            "expected at least 7 fields, got {}",
            fields.len()
        )));
    }

    let transaction_id = fields[6].trim();
    Ok(ChargeResponse {
        success: fields[0].trim() == APPROVED,
        authorization: (!transaction_id.is_empty()).then(|| transaction_id.to_string()),
        message: fields[3].trim().to_string(),
        processed_at: Utc::now(),
    })
}

#[async_trait]
impl CardGateway for AuthorizeNetGateway {
    #[instrument(skip(self, request), fields(order_number = request.order_number))]
    async fn purchase(&self, request: &ChargeRequest) -> Result<ChargeResponse, PaymentError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&self.form(request))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            warn!("Authorize.Net answered with status {}", response.status());
            return Err(PaymentError::Protocol(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;
        let result = parse_response(&body)?;

        info!(
            "Authorize.Net {} for {}: {}",
            if result.success { "approved" } else { "declined" },
            format_cents(request.amount_cents),
            result.message
        );
        Ok(result)
    }
}

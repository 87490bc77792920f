use async_trait::async_trait;
use std::time::Duration;
use tracing::{instrument, warn};
use url::Url;
use substruct_core::payment::{IpnVerifier, PaymentError};

use super::http_client;

/// Posts a notification back to PayPal with `cmd=_notify-validate` prepended.
/// PayPal answers `VERIFIED` when it sent the notification and `INVALID` when it didn't.
pub struct PaypalIpnVerifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl PaypalIpnVerifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, PaymentError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| PaymentError::Protocol(format!("bad PayPal endpoint {}: {}", endpoint, e)))?;

        Ok(Self {
            client: http_client(timeout)?,
            endpoint,
        })
    }
}

#[async_trait]
impl IpnVerifier for PaypalIpnVerifier {
    #[instrument(skip_all)]
    async fn acknowledge(&self, raw_notification: &str) -> Result<bool, PaymentError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(format!("cmd=_notify-validate&{}", raw_notification))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Protocol(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        match body.trim() {
            "VERIFIED" => Ok(true),
            "INVALID" => {
                warn!("PayPal rejected a notification as INVALID");
                Ok(false)
            }
            other => Err(PaymentError::Protocol(format!("unexpected IPN reply {:?}", other))),
        }
    }
}

pub mod authorize_net;
pub mod paypal;

pub use authorize_net::AuthorizeNetGateway;
pub use paypal::PaypalIpnVerifier;

use std::time::Duration;
use substruct_core::payment::PaymentError;

fn http_client(timeout: Duration) -> Result<reqwest::Client, PaymentError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PaymentError::Transport(e.to_string()))
}

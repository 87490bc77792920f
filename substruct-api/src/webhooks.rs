use axum::{extract::State, routing::post, Json, Router};
use substruct_order::IpnOutcome;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/store/paypal/ipn", post(handle_paypal_ipn))
}

/// POST /store/paypal/ipn
/// Form-encoded PayPal Instant Payment Notification. The raw body is needed verbatim
/// for the post-back.
pub async fn handle_paypal_ipn(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<IpnOutcome>, AppError> {
    tracing::info!("Received PayPal notification ({} bytes)", body.len());

    let outcome = match state.ipn.handle(&body).await {
        Ok(outcome) => outcome,
        Err(e) => {
            state.metrics.ipn_notifications.with_label_values(&["error"]).inc();
            return Err(e.into());
        }
    };

    let label = match &outcome {
        IpnOutcome::Ignored => "ignored",
        IpnOutcome::Passed => "passed",
        IpnOutcome::Failed { .. } => "failed",
        IpnOutcome::AlreadyProcessed => "already_processed",
        IpnOutcome::OrderAlreadyPaid { .. } => "order_already_paid",
    };
    state.metrics.ipn_notifications.with_label_values(&[label]).inc();

    Ok(Json(outcome))
}

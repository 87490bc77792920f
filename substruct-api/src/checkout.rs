use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;
use substruct_order::{CheckoutDetails, TransactionOutcome};

use crate::{error::AppError, orders::OrderResponse, state::AppState};

#[derive(Debug, Serialize)]
pub struct StockConflictResponse {
    pub error: String,
    pub removed_items: Vec<String>,
    pub order: OrderResponse,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub result: TransactionOutcome,
    pub order: OrderResponse,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/store/checkout/{order_id}", post(submit_checkout))
        .route("/store/checkout/{order_id}/pay", post(pay))
}

/// POST /store/checkout/{order_id}
/// Drops lines that can't be filled from stock, then records customer, addresses and card.
/// When lines were dropped nothing else is saved and the customer is asked to review.
async fn submit_checkout(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(details): Json<CheckoutDetails>,
) -> Result<Response, AppError> {
    let (order, removed) = state.orders.check_inventory(order_id).await?;
    if !removed.is_empty() {
        state.metrics.inventory_removals.inc_by(removed.len() as u64);
        let body = StockConflictResponse {
            error: "Some items in your cart are no longer available and have been removed".to_string(),
            removed_items: removed,
            order: OrderResponse::for_customer(&order),
        };
        return Ok((StatusCode::CONFLICT, Json(body)).into_response());
    }

    let order = state
        .orders
        .update_checkout_details(order_id, details, state.preferences.store_handling_fee_cents)
        .await?;
    Ok(Json(OrderResponse::for_customer(&order)).into_response())
}

/// POST /store/checkout/{order_id}/pay
async fn pay(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    let mut order = state.orders.get_order(order_id).await?;

    let result = match state.payments.run_transaction(&mut order).await {
        Ok(result) => result,
        Err(e) => {
            state.metrics.transactions.with_label_values(&["error"]).inc();
            return Err(e.into());
        }
    };

    let label = match &result {
        TransactionOutcome::Paid { .. } => "paid",
        TransactionOutcome::Failed { .. } => "failed",
        TransactionOutcome::AwaitingNotification { .. } => "awaiting_notification",
    };
    state.metrics.transactions.with_label_values(&[label]).inc();
    info!("Order {} transaction finished: {}", order.order_number, label);

    Ok(Json(TransactionResponse {
        result,
        order: OrderResponse::for_customer(&order),
    }))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use substruct_order::manager::AffiliateCodeOutcome;
use substruct_order::PromotionOutcome;

use crate::{error::AppError, orders::OrderResponse, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub item_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct RemoveItemQuery {
    /// Units to remove; all of them when absent.
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct PromotionResponse {
    pub order: OrderResponse,
    pub result: PromotionOutcome,
}

#[derive(Debug, Serialize)]
pub struct AffiliateResponse {
    pub order: OrderResponse,
    pub result: AffiliateCodeOutcome,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/store/cart", post(create_cart))
        .route("/store/cart/{order_id}", get(get_cart))
        .route("/store/cart/{order_id}/items", post(add_item).delete(empty_cart))
        .route("/store/cart/{order_id}/items/{item_id}", delete(remove_item))
        .route("/store/cart/{order_id}/promotion", post(apply_promotion).delete(remove_promotion))
        .route("/store/cart/{order_id}/affiliate", post(apply_affiliate))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /store/cart
async fn create_cart(State(state): State<AppState>) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let order = state.orders.create_cart().await?;
    state.metrics.carts_created.inc();
    Ok((StatusCode::CREATED, Json(OrderResponse::for_customer(&order))))
}

/// GET /store/cart/{order_id}
async fn get_cart(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.get_order(order_id).await?;
    Ok(Json(OrderResponse::for_customer(&order)))
}

/// POST /store/cart/{order_id}/items
/// A negative quantity takes units off the line.
async fn add_item(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.add_product(order_id, req.item_id, req.quantity).await?;
    Ok(Json(OrderResponse::for_customer(&order)))
}

/// DELETE /store/cart/{order_id}/items/{item_id}
async fn remove_item(
    State(state): State<AppState>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<RemoveItemQuery>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.remove_product(order_id, item_id, query.quantity).await?;
    Ok(Json(OrderResponse::for_customer(&order)))
}

/// DELETE /store/cart/{order_id}/items
async fn empty_cart(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.empty_cart(order_id).await?;
    Ok(Json(OrderResponse::for_customer(&order)))
}

/// POST /store/cart/{order_id}/promotion
async fn apply_promotion(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<PromotionResponse>, AppError> {
    let (order, result) = state.orders.apply_promotion_code(order_id, &req.code).await?;
    Ok(Json(PromotionResponse {
        order: OrderResponse::for_customer(&order),
        result,
    }))
}

/// DELETE /store/cart/{order_id}/promotion
async fn remove_promotion(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.remove_promotion(order_id).await?;
    Ok(Json(OrderResponse::for_customer(&order)))
}

/// POST /store/cart/{order_id}/affiliate
async fn apply_affiliate(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<AffiliateResponse>, AppError> {
    let (order, result) = state.orders.apply_affiliate_code(order_id, &req.code).await?;
    Ok(Json(AffiliateResponse {
        order: OrderResponse::for_customer(&order),
        result,
    }))
}

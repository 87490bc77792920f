use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use substruct_catalog::product::validate_item;
use substruct_catalog::Item;
use substruct_order::{Affiliate, AffiliatePayment, OrderStatus, SalesTotals};
use substruct_promo::{Discount, Promotion};
use substruct_shared::Cents;

use crate::{error::AppError, orders::OrderResponse, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct AddNoteRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct LineItemQuantity {
    pub item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetLineItemsRequest {
    pub items: Vec<LineItemQuantity>,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub code: Option<String>,
    pub price_cents: Cents,
    pub quantity: i32,
    /// Creates a variation of this product.
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePromotionRequest {
    pub code: String,
    pub description: String,
    pub discount: Discount,
    pub minimum_cart_value_cents: Option<Cents>,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CreateAffiliateRequest {
    /// Generated when absent.
    #[serde(default)]
    pub code: String,
    pub email_address: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub number: String,
    pub affiliate_id: Uuid,
    pub amount_cents: Cents,
    pub order_ids: Vec<Uuid>,
}

impl From<&AffiliatePayment> for PaymentResponse {
    fn from(payment: &AffiliatePayment) -> Self {
        Self {
            id: payment.id,
            number: payment.number(),
            affiliate_id: payment.affiliate_id,
            amount_cents: payment.amount_cents,
            order_ids: payment.order_ids.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub deleted: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/orders/{order_id}", get(get_order))
        .route("/admin/orders/number/{order_number}", get(get_order_by_number))
        .route("/admin/orders/{order_id}/status", put(update_status))
        .route("/admin/orders/{order_id}/notes", post(add_note))
        .route("/admin/orders/{order_id}/line_items", put(set_line_items))
        .route("/admin/reports/sales/{year}", get(sales_report))
        .route("/admin/items", get(list_items).post(create_item))
        .route("/admin/promotions", get(list_promotions).post(create_promotion))
        .route("/admin/promotions/{promotion_id}", delete(delete_promotion))
        .route("/admin/affiliates", post(create_affiliate))
        .route("/admin/affiliates/unpaid", get(unpaid_affiliates))
        .route("/admin/affiliates/payments", post(pay_affiliates))
        .route("/admin/maintenance/stale_carts", post(sweep_stale_carts))
}

// ============================================================================
// Orders
// ============================================================================

/// GET /admin/orders/{order_id}
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.get_order(order_id).await?;
    Ok(Json(OrderResponse::for_admin(&order)))
}

/// GET /admin/orders/number/{order_number}
async fn get_order_by_number(
    State(state): State<AppState>,
    Path(order_number): Path<i64>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.find_by_order_number(order_number).await?;
    Ok(Json(OrderResponse::for_admin(&order)))
}

/// PUT /admin/orders/{order_id}/status
async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.update_status(order_id, req.status).await?;
    Ok(Json(OrderResponse::for_admin(&order)))
}

/// POST /admin/orders/{order_id}/notes
async fn add_note(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<AddNoteRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::ValidationError("note text can't be blank".to_string()));
    }
    let order = state.orders.add_note(order_id, &req.text).await?;
    Ok(Json(OrderResponse::for_admin(&order)))
}

/// PUT /admin/orders/{order_id}/line_items
/// Replaces the product lines; zero quantities drop the line.
async fn set_line_items(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<SetLineItemsRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let quantities: Vec<(Uuid, i32)> = req.items.iter().map(|l| (l.item_id, l.quantity)).collect();
    let order = state.orders.set_line_items(order_id, &quantities).await?;
    Ok(Json(OrderResponse::for_admin(&order)))
}

/// GET /admin/reports/sales/{year}
async fn sales_report(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> Result<Json<Vec<SalesTotals>>, AppError> {
    Ok(Json(state.orders.sales_totals_for_year(year).await?))
}

/// POST /admin/maintenance/stale_carts
async fn sweep_stale_carts(State(state): State<AppState>) -> Result<Json<SweepResponse>, AppError> {
    let deleted = state.orders.destroy_old_carts().await?;
    Ok(Json(SweepResponse { deleted }))
}

// ============================================================================
// Items
// ============================================================================

/// GET /admin/items
async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<Item>>, AppError> {
    let items = state
        .items
        .list_items()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(Json(items))
}

/// POST /admin/items
async fn create_item(
    State(state): State<AppState>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    let item = match req.product_id {
        Some(parent_id) => {
            let parent = state
                .items
                .get_item(parent_id)
                .await
                .map_err(|e| AppError::InternalServerError(e.to_string()))?
                .ok_or_else(|| AppError::NotFoundError(format!("Item not found: {}", parent_id)))?;
            Item::variation(&parent, &req.name, req.price_cents, req.quantity)
        }
        None => Item::new(&req.name, req.code.as_deref(), req.price_cents, req.quantity),
    };
    validate_item(&item)?;

    state
        .items
        .save_item(&item)
        .await
        .map_err(|e| AppError::ConflictError(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(item)))
}

// ============================================================================
// Promotions
// ============================================================================

/// GET /admin/promotions
async fn list_promotions(State(state): State<AppState>) -> Result<Json<Vec<Promotion>>, AppError> {
    let promotions = state
        .promotions
        .list_promotions()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(Json(promotions))
}

/// POST /admin/promotions
async fn create_promotion(
    State(state): State<AppState>,
    Json(req): Json<CreatePromotionRequest>,
) -> Result<(StatusCode, Json<Promotion>), AppError> {
    let mut promotion = Promotion::new(&req.code, &req.description, req.discount, req.starts_on, req.ends_on);
    promotion.minimum_cart_value_cents = req.minimum_cart_value_cents;
    promotion.validate()?;

    let taken = state
        .promotions
        .find_by_code(&promotion.code)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    if taken.is_some() {
        return Err(AppError::ConflictError(format!("Promotion code {} is already taken", promotion.code)));
    }

    state
        .promotions
        .save_promotion(&promotion)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(promotion)))
}

/// DELETE /admin/promotions/{promotion_id}
async fn delete_promotion(
    State(state): State<AppState>,
    Path(promotion_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .promotions
        .delete_promotion(promotion_id)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFoundError(format!("Promotion not found: {}", promotion_id)))
    }
}

// ============================================================================
// Affiliates
// ============================================================================

/// POST /admin/affiliates
async fn create_affiliate(
    State(state): State<AppState>,
    Json(req): Json<CreateAffiliateRequest>,
) -> Result<(StatusCode, Json<Affiliate>), AppError> {
    let mut affiliate = Affiliate::new(&req.code, &req.email_address);
    affiliate.first_name = req.first_name;
    affiliate.last_name = req.last_name;
    affiliate.company = req.company;

    let affiliate = state.affiliates.create(affiliate).await?;
    Ok((StatusCode::CREATED, Json(affiliate)))
}

/// GET /admin/affiliates/unpaid
async fn unpaid_affiliates(State(state): State<AppState>) -> Result<Json<Vec<Affiliate>>, AppError> {
    Ok(Json(state.affiliates.find_unpaid().await?))
}

/// POST /admin/affiliates/payments
/// Pays every affiliate that is owed money.
async fn pay_affiliates(State(state): State<AppState>) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    let payments = state.affiliates.new_payments_for_all_unpaid().await?;
    for payment in &payments {
        state.affiliates.record_payment(payment).await?;
    }
    Ok(Json(payments.iter().map(PaymentResponse::from).collect()))
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use substruct_order::models::{OrderLineItem, OrderNote};
use substruct_order::{Address, Order, OrderStatus};
use substruct_shared::Cents;

// ============================================================================
// Response Types
// ============================================================================

/// Order as returned over HTTP. The card number is reduced to its last four digits.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: i64,
    pub status: OrderStatus,
    pub status_code: i16,
    pub status_name: &'static str,
    pub line_items: Vec<OrderLineItem>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    pub customer_email: Option<String>,
    pub card_number: Option<String>,
    pub promotion_id: Option<Uuid>,
    pub affiliate_id: Option<Uuid>,
    pub line_items_total_cents: Cents,
    pub shipping_cost_cents: Cents,
    pub tax_cents: Cents,
    pub total_cents: Cents,
    pub auth_transaction_id: Option<String>,
    /// Only included for admins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<OrderNote>>,
    pub created_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn for_customer(order: &Order) -> Self {
        Self::build(order, None)
    }

    pub fn for_admin(order: &Order) -> Self {
        Self::build(order, Some(order.notes.clone()))
    }

    fn build(order: &Order, notes: Option<Vec<OrderNote>>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            status_code: order.status.code(),
            status_name: order.status.name(),
            line_items: order.line_items.clone(),
            billing_address: order.billing_address.clone(),
            shipping_address: order.shipping_address.clone(),
            customer_email: order.customer_email.as_ref().map(|e| e.expose().clone()),
            card_number: order
                .account
                .as_ref()
                .map(|a| a.cc_number.redact_to_last_four().into_inner()),
            promotion_id: order.promotion_id,
            affiliate_id: order.affiliate_id,
            line_items_total_cents: order.line_items_total(true),
            shipping_cost_cents: order.shipping_cost_cents,
            tax_cents: order.tax_cost(),
            total_cents: order.total(),
            auth_transaction_id: order.auth_transaction_id.clone(),
            notes,
            created_at: order.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use substruct_order::PaymentAccount;
    use substruct_shared::Masked;

    #[test]
    fn test_card_number_is_redacted() {
        let mut order = Order::new(12);
        order.account = Some(PaymentAccount {
            cc_number: Masked::new("4111111111111111".to_string()),
            expiration_month: 1,
            expiration_year: 2040,
        });
        order.add_note("internal");

        let customer = serde_json::to_value(OrderResponse::for_customer(&order)).unwrap();
        assert_eq!(customer["card_number"], "XXXXXXXXXXXX1111");
        assert!(customer.get("notes").is_none());

        let admin = serde_json::to_value(OrderResponse::for_admin(&order)).unwrap();
        assert_eq!(admin["notes"][0]["text"], "internal");
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use substruct_catalog::{Item, StockRequest};
use substruct_promo::{check_eligibility, compute_discount, CartLine, CartSnapshot, DiscountLine, Promotion};
use substruct_shared::money::percent_of;
use substruct_shared::{Cents, Masked};

use crate::address::Address;
use crate::manager::OrderError;

/// Most units of one item a single line may hold.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

/// Order status in the lifecycle. Numeric codes are what gets stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Cart,
    ToCharge,
    OnHoldPaymentFailed,
    OnHoldAwaitingPayment,
    OrderedPaidToShip,
    OrderedPaidShipped,
    SentToFulfillment,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Cart,
        OrderStatus::ToCharge,
        OrderStatus::OnHoldPaymentFailed,
        OrderStatus::OnHoldAwaitingPayment,
        OrderStatus::OrderedPaidToShip,
        OrderStatus::OrderedPaidShipped,
        OrderStatus::SentToFulfillment,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    pub fn code(self) -> i16 {
        match self {
            OrderStatus::Cart => 1,
            OrderStatus::ToCharge => 2,
            OrderStatus::OnHoldPaymentFailed => 3,
            OrderStatus::OnHoldAwaitingPayment => 4,
            OrderStatus::OrderedPaidToShip => 5,
            OrderStatus::OrderedPaidShipped => 6,
            OrderStatus::SentToFulfillment => 7,
            OrderStatus::Cancelled => 8,
            OrderStatus::Returned => 9,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            OrderStatus::Cart => "CART",
            OrderStatus::ToCharge => "TO CHARGE",
            OrderStatus::OnHoldPaymentFailed => "ON HOLD - PAYMENT FAILED",
            OrderStatus::OnHoldAwaitingPayment => "ON HOLD - AWAITING PAYMENT",
            OrderStatus::OrderedPaidToShip => "ORDERED - PAID - TO SHIP",
            OrderStatus::OrderedPaidShipped => "ORDERED - PAID - SHIPPED",
            OrderStatus::SentToFulfillment => "SENT TO FULFILLMENT",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Returned => "RETURNED",
        }
    }

    /// Line items, addresses and promotions may change only up to "paid, to ship".
    pub fn is_editable(self) -> bool {
        (1..=5).contains(&self.code())
    }

    /// Paid at some point.
    pub fn is_complete(self) -> bool {
        self.code() >= 5
    }

    /// Affiliates earn on shipped or fulfilled orders only.
    pub fn is_payable_to_affiliate(self) -> bool {
        matches!(self, OrderStatus::OrderedPaidShipped | OrderStatus::SentToFulfillment)
    }

    /// Allowed manual (admin) status changes.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        match self {
            Cart => matches!(
                next,
                ToCharge | OnHoldPaymentFailed | OnHoldAwaitingPayment | OrderedPaidToShip | Cancelled
            ),
            ToCharge => matches!(
                next,
                OnHoldPaymentFailed | OnHoldAwaitingPayment | OrderedPaidToShip | Cancelled
            ),
            OnHoldPaymentFailed => matches!(
                next,
                ToCharge | OnHoldAwaitingPayment | OrderedPaidToShip | Cancelled
            ),
            OnHoldAwaitingPayment => matches!(next, OnHoldPaymentFailed | OrderedPaidToShip | Cancelled),
            OrderedPaidToShip => matches!(
                next,
                OrderedPaidShipped | SentToFulfillment | Cancelled | Returned
            ),
            SentToFulfillment => matches!(next, OrderedPaidShipped | Returned),
            OrderedPaidShipped => matches!(next, Returned),
            Cancelled | Returned => false,
        }
    }
}

/// A single product-quantity-price entry, or the synthetic discount line of a promotion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLineItem {
    pub id: Uuid,
    pub item_id: Option<Uuid>,
    /// Set only on the discount line a promotion adds.
    pub promotion_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    /// Price captured when the product was added.
    pub unit_price_cents: Cents,
}

impl OrderLineItem {
    pub fn for_item(item_id: Uuid, name: String, unit_price_cents: Cents, quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: Some(item_id),
            promotion_id: None,
            name,
            quantity,
            unit_price_cents,
        }
    }

    pub fn for_discount(promotion_id: Uuid, discount: DiscountLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: discount.item_id,
            promotion_id: Some(promotion_id),
            name: discount.description,
            quantity: discount.quantity,
            unit_price_cents: discount.unit_price_cents,
        }
    }

    pub fn total(&self) -> Cents {
        self.quantity as Cents * self.unit_price_cents
    }

    pub fn is_promotion(&self) -> bool {
        self.promotion_id.is_some()
    }

    fn is_product(&self, item_id: Uuid) -> bool {
        !self.is_promotion() && self.item_id == Some(item_id)
    }
}

/// Card details captured at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentAccount {
    pub cc_number: Masked<String>,
    pub expiration_month: u32,
    pub expiration_year: i32,
}

impl PaymentAccount {
    /// Drops everything but the last four digits of the card number.
    pub fn clear_personal_information(&mut self) {
        self.cc_number = self.cc_number.redact_to_last_four();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderNote {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// What applying a promotion code did to the order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionOutcome {
    Applied,
    Replaced { previous: Uuid },
    AlreadyApplied,
}

/// Result of re-evaluating an applied promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionRefresh {
    NotApplied,
    Kept,
    Removed,
}

/// The aggregate root of a purchase, from cart to shipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Shown to customers instead of the id.
    pub order_number: i64,
    pub status: OrderStatus,
    pub line_items: Vec<OrderLineItem>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    pub customer_email: Option<Masked<String>>,
    pub account: Option<PaymentAccount>,
    pub promotion_id: Option<Uuid>,
    pub affiliate_id: Option<Uuid>,
    pub affiliate_payment_id: Option<Uuid>,
    /// Percent.
    pub tax_rate: f64,
    pub shipping_cost_cents: Cents,
    /// Cached line items total, refreshed before every save.
    pub product_cost_cents: Cents,
    pub auth_transaction_id: Option<String>,
    pub notes: Vec<OrderNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(order_number: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_number,
            status: OrderStatus::Cart,
            line_items: Vec::new(),
            billing_address: None,
            shipping_address: None,
            customer_email: None,
            account: None,
            promotion_id: None,
            affiliate_id: None,
            affiliate_payment_id: None,
            tax_rate: 0.0,
            shipping_cost_cents: 0,
            product_cost_cents: 0,
            auth_transaction_id: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn line_items_total(&self, include_promotion: bool) -> Cents {
        self.line_items
            .iter()
            .filter(|li| include_promotion || !li.is_promotion())
            .map(OrderLineItem::total)
            .sum()
    }

    pub fn tax_cost(&self) -> Cents {
        percent_of(self.line_items_total(true), self.tax_rate)
    }

    /// Line items, shipping and tax.
    pub fn total(&self) -> Cents {
        self.line_items_total(true) + self.shipping_cost_cents + self.tax_cost()
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }

    pub fn is_discounted(&self) -> bool {
        self.line_items.iter().any(|li| li.unit_price_cents < 0)
    }

    /// The customer made it through checkout.
    pub fn has_been_placed(&self) -> bool {
        self.customer_email.is_some() && self.billing_address.is_some() && self.account.is_some()
    }

    pub fn contains_valid_transaction_id(&self) -> bool {
        match self.auth_transaction_id.as_deref().map(str::trim) {
            Some(id) => !id.is_empty() && id != "0",
            None => false,
        }
    }

    pub fn has_line_item(&self, item_id: Uuid) -> bool {
        self.line_items.iter().any(|li| li.is_product(item_id))
    }

    pub fn line_item_quantity(&self, item_id: Uuid) -> i32 {
        self.line_items
            .iter()
            .find(|li| li.is_product(item_id))
            .map(|li| li.quantity)
            .unwrap_or(0)
    }

    pub fn line_item_total(&self, item_id: Uuid) -> Cents {
        self.line_items
            .iter()
            .find(|li| li.is_product(item_id))
            .map(OrderLineItem::total)
            .unwrap_or(0)
    }

    /// Billing name, empty without a billing address.
    pub fn name(&self) -> String {
        self.billing_address
            .as_ref()
            .map(Address::name)
            .unwrap_or_default()
    }

    pub fn promotion_line_item(&self) -> Option<&OrderLineItem> {
        self.line_items.iter().find(|li| li.is_promotion())
    }

    pub fn affiliate_earnings(&self, revenue_percentage: f64) -> Cents {
        if self.status.is_payable_to_affiliate() {
            percent_of(self.line_items_total(true), revenue_percentage)
        } else {
            0
        }
    }

    /// Appends a timestamped note. Blank text is ignored.
    pub fn add_note(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.notes.push(OrderNote {
            text: text.to_string(),
            created_at: Utc::now(),
        });
    }

    /// Sets the status without checking transitions. Payment reconciliation uses this.
    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status.name().to_string(),
                to: next.name().to_string(),
            });
        }
        self.set_status(next);
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), OrderError> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(OrderError::NotEditable(self.status.name().to_string()))
        }
    }

    /// Adds `quantity` units of `item`. A negative quantity removes units. The unit price is
    /// refreshed on every add, so the line reflects the current price.
    pub fn add_product(&mut self, item: &Item, parent: Option<&Item>, quantity: i32) -> Result<(), OrderError> {
        self.ensure_editable()?;

        if quantity < 0 {
            return self.remove_product(item.id, Some(quantity.saturating_abs()));
        }
        if quantity == 0 {
            return Ok(());
        }

        if quantity > MAX_LINE_QUANTITY {
            return Err(OrderError::InvalidQuantity(quantity));
        }

        let unit_price = item.effective_price(parent);
        let name = item.display_name(parent);

        match self.line_items.iter_mut().find(|li| li.is_product(item.id)) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .filter(|q| *q <= MAX_LINE_QUANTITY)
                    .ok_or(OrderError::InvalidQuantity(quantity))?;
                line.unit_price_cents = unit_price;
                line.name = name;
            }
            None => self
                .line_items
                .push(OrderLineItem::for_item(item.id, name, unit_price, quantity)),
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Removes `quantity` units of the item, or the whole line when `quantity` is `None` or
    /// at least the line quantity.
    pub fn remove_product(&mut self, item_id: Uuid, quantity: Option<i32>) -> Result<(), OrderError> {
        self.ensure_editable()?;

        if let Some(pos) = self.line_items.iter().position(|li| li.is_product(item_id)) {
            let line = &mut self.line_items[pos];
            match quantity {
                Some(q) if line.quantity > q => line.quantity -= q,
                _ => {
                    self.line_items.remove(pos);
                }
            }
            self.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Removes every line item, the promotion included.
    pub fn empty(&mut self) -> Result<(), OrderError> {
        self.ensure_editable()?;
        self.line_items.clear();
        self.promotion_id = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Removes product lines for the given items and returns their names.
    pub fn remove_lines_for_items(&mut self, item_ids: &[Uuid]) -> Vec<String> {
        let mut removed = Vec::new();
        self.line_items.retain(|li| {
            let drop = !li.is_promotion() && li.item_id.is_some_and(|id| item_ids.contains(&id));
            if drop {
                removed.push(li.name.clone());
            }
            !drop
        });
        removed
    }

    pub fn cart_snapshot(&self) -> CartSnapshot {
        CartSnapshot::new(
            self.line_items
                .iter()
                .map(|li| CartLine {
                    item_id: li.item_id,
                    quantity: li.quantity,
                    unit_price_cents: li.unit_price_cents,
                    is_promotion: li.is_promotion(),
                })
                .collect(),
        )
    }

    /// Drops every promotion line and the promotion reference.
    pub fn remove_promotion(&mut self) {
        self.line_items.retain(|li| !li.is_promotion());
        self.promotion_id = None;
    }

    /// Applies `promo`, replacing any previous promotion. Applying the promotion that is
    /// already on the order changes nothing.
    pub fn apply_promotion(&mut self, promo: &Promotion, today: NaiveDate) -> Result<PromotionOutcome, OrderError> {
        self.ensure_editable()?;

        if self.promotion_id == Some(promo.id) {
            return Ok(PromotionOutcome::AlreadyApplied);
        }

        check_eligibility(promo, &self.cart_snapshot(), today)?;

        let previous = self.promotion_id;
        self.remove_promotion();
        self.insert_discount(promo);
        self.updated_at = Utc::now();

        Ok(match previous {
            Some(previous) => PromotionOutcome::Replaced { previous },
            None => PromotionOutcome::Applied,
        })
    }

    /// Re-evaluates the applied promotion against the current line items. Ineligible
    /// promotions are removed, eligible ones get a fresh discount line. Orders that are
    /// no longer editable are left alone.
    pub fn cleanup_promotion(&mut self, promo: Option<&Promotion>, today: NaiveDate) -> PromotionRefresh {
        if !self.status.is_editable() {
            return match self.promotion_id {
                Some(_) => PromotionRefresh::Kept,
                None => PromotionRefresh::NotApplied,
            };
        }
        let Some(applied) = self.promotion_id else {
            // Discount lines whose promotion reference was cleared (e.g. the promotion
            // was deleted) are dropped.
            let before = self.line_items.len();
            self.line_items.retain(|li| !li.is_promotion());
            return if self.line_items.len() < before {
                PromotionRefresh::Removed
            } else {
                PromotionRefresh::NotApplied
            };
        };

        match promo {
            Some(p) if p.id == applied && check_eligibility(p, &self.cart_snapshot(), today).is_ok() => {
                self.line_items.retain(|li| !li.is_promotion());
                self.insert_discount(p);
                PromotionRefresh::Kept
            }
            _ => {
                self.remove_promotion();
                PromotionRefresh::Removed
            }
        }
    }

    fn insert_discount(&mut self, promo: &Promotion) {
        if let Some(discount) = compute_discount(promo, &self.cart_snapshot()) {
            self.line_items.push(OrderLineItem::for_discount(promo.id, discount));
        }
        self.promotion_id = Some(promo.id);
    }

    pub fn set_product_cost(&mut self) {
        self.product_cost_cents = self.line_items_total(true);
    }

    /// Bookkeeping done before every save.
    pub fn prepare_for_save(&mut self) {
        self.set_product_cost();
        self.updated_at = Utc::now();
    }

    /// Product lines to check against or take from stock.
    pub fn stock_requests(&self) -> Vec<StockRequest> {
        self.line_items
            .iter()
            .filter(|li| !li.is_promotion())
            .filter_map(|li| {
                li.item_id.map(|item_id| StockRequest {
                    item_id,
                    name: li.name.clone(),
                    quantity: li.quantity,
                })
            })
            .collect()
    }
}

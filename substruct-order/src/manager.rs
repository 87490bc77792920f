use uuid::Uuid;
use std::sync::Arc;
use rand::Rng;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use substruct_catalog::{inventory, InventoryError, Item, ItemRepository};
use substruct_core::payment::PaymentError;
use substruct_core::BoxError;
use substruct_promo::{Ineligibility, PromotionRepository};
use substruct_shared::{Cents, Masked};

use crate::address::{is_valid_email, Address, AddressError};
use crate::models::{Order, OrderStatus, PaymentAccount, PromotionOutcome, PromotionRefresh, MAX_LINE_QUANTITY};
use crate::report::{totals_for_year, SalesTotals};
use crate::repository::{AffiliateRepository, OrderRepository};

const MAX_ORDER_NUMBER: i64 = 999_999_999;

/// Customer details collected at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutDetails {
    pub customer_email: String,
    pub billing_address: Address,
    /// Defaults to the billing address.
    pub shipping_address: Option<Address>,
    pub account: PaymentAccount,
    #[serde(default)]
    pub tax_rate: f64,
}

/// What an affiliate code did to the order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AffiliateCodeOutcome {
    pub promotion: Option<PromotionOutcome>,
    pub affiliate_id: Option<Uuid>,
}

/// Order lifecycle: cart edits, promotions, checkout details and admin changes.
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    items: Arc<dyn ItemRepository>,
    promotions: Arc<dyn PromotionRepository>,
    affiliates: Arc<dyn AffiliateRepository>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        items: Arc<dyn ItemRepository>,
        promotions: Arc<dyn PromotionRepository>,
        affiliates: Arc<dyn AffiliateRepository>,
    ) -> Self {
        Self { orders, items, promotions, affiliates }
    }

    /// Creates an empty cart with a fresh order number.
    #[instrument(skip(self))]
    pub async fn create_cart(&self) -> Result<Order, OrderError> {
        let order_number = self.generate_order_number().await?;
        let mut order = Order::new(order_number);
        self.save(&mut order).await?;
        info!("Created cart {} ({})", order.order_number, order.id);
        Ok(order)
    }

    /// Random number in 1..=999_999_999 not used by any other order.
    async fn generate_order_number(&self) -> Result<i64, OrderError> {
        loop {
            let candidate = rand::thread_rng().gen_range(1..=MAX_ORDER_NUMBER);
            if !self.orders.order_number_exists(candidate).await? {
                return Ok(candidate);
            }
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    pub async fn find_by_order_number(&self, order_number: i64) -> Result<Order, OrderError> {
        self.orders
            .find_by_order_number(order_number)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("order number {}", order_number)))
    }

    /// Saves the order. The applied promotion is re-evaluated and the product cost
    /// recomputed first.
    pub async fn save(&self, order: &mut Order) -> Result<(), OrderError> {
        self.refresh_promotion(order).await?;
        order.prepare_for_save();
        self.orders.save_order(order).await?;
        Ok(())
    }

    /// Saves a payment outcome. The amount has been charged, so the promotion is kept as
    /// it was when the charge was built.
    pub async fn save_settled(&self, order: &mut Order) -> Result<(), OrderError> {
        order.prepare_for_save();
        self.orders.save_order(order).await?;
        Ok(())
    }

    async fn refresh_promotion(&self, order: &mut Order) -> Result<(), OrderError> {
        if !order.status.is_editable() {
            return Ok(());
        }

        let promo = match order.promotion_id {
            Some(promotion_id) => self.promotions.get_promotion(promotion_id).await?,
            None => None,
        };
        if order.cleanup_promotion(promo.as_ref(), today()) == PromotionRefresh::Removed {
            info!("Removed promotion lines from order {}", order.order_number);
        }
        Ok(())
    }

    async fn load_item(&self, item_id: Uuid) -> Result<(Item, Option<Item>), OrderError> {
        let item = self
            .items
            .get_item(item_id)
            .await?
            .ok_or(OrderError::ItemNotFound(item_id))?;

        let parent = match item.product_id {
            Some(parent_id) => self.items.get_item(parent_id).await?,
            None => None,
        };

        Ok((item, parent))
    }

    /// Adds units of an item to the cart. Negative quantities remove units.
    #[instrument(skip(self))]
    pub async fn add_product(&self, order_id: Uuid, item_id: Uuid, quantity: i32) -> Result<Order, OrderError> {
        if quantity.unsigned_abs() > MAX_LINE_QUANTITY.unsigned_abs() {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        let mut order = self.get_order(order_id).await?;
        let (item, parent) = self.load_item(item_id).await?;

        order.add_product(&item, parent.as_ref(), quantity)?;
        self.save(&mut order).await?;
        Ok(order)
    }

    /// Removes `quantity` units, or the whole line when no quantity is given.
    #[instrument(skip(self))]
    pub async fn remove_product(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        quantity: Option<i32>,
    ) -> Result<Order, OrderError> {
        if let Some(q) = quantity {
            if q < 0 {
                return Err(OrderError::InvalidQuantity(q));
            }
        }

        let mut order = self.get_order(order_id).await?;
        order.remove_product(item_id, quantity)?;
        self.save(&mut order).await?;
        Ok(order)
    }

    pub async fn empty_cart(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let mut order = self.get_order(order_id).await?;
        order.empty()?;
        self.save(&mut order).await?;
        Ok(order)
    }

    /// Replaces the product lines with the given item quantities. Zero quantities are
    /// dropped. Used by the admin order editor.
    #[instrument(skip(self, quantities))]
    pub async fn set_line_items(&self, order_id: Uuid, quantities: &[(Uuid, i32)]) -> Result<Order, OrderError> {
        if let Some((_, q)) = quantities.iter().find(|(_, q)| !(0..=MAX_LINE_QUANTITY).contains(q)) {
            return Err(OrderError::InvalidQuantity(*q));
        }

        let mut order = self.get_order(order_id).await?;
        let mut products = Vec::new();
        for (item_id, quantity) in quantities.iter().filter(|(_, q)| *q > 0) {
            products.push((self.load_item(*item_id).await?, *quantity));
        }

        // Emptying drops the promotion reference; put it back so it is re-evaluated.
        let promotion_id = order.promotion_id;
        order.empty()?;
        for ((item, parent), quantity) in products {
            order.add_product(&item, parent.as_ref(), quantity)?;
        }
        order.promotion_id = promotion_id;

        self.save(&mut order).await?;
        Ok(order)
    }

    /// Applies a promotion by code. Surrounding whitespace is ignored.
    #[instrument(skip(self))]
    pub async fn apply_promotion_code(
        &self,
        order_id: Uuid,
        code: &str,
    ) -> Result<(Order, PromotionOutcome), OrderError> {
        let code = code.trim();
        let promo = self
            .promotions
            .find_by_code(code)
            .await?
            .ok_or_else(|| OrderError::PromotionNotFound(code.to_string()))?;

        let mut order = self.get_order(order_id).await?;
        let outcome = order.apply_promotion(&promo, today())?;
        if outcome != PromotionOutcome::AlreadyApplied {
            self.save(&mut order).await?;
            info!("Applied promotion {} to order {}", promo.code, order.order_number);
        }
        Ok((order, outcome))
    }

    /// An affiliate code is also tried as a promotion code; the order is linked to the
    /// affiliate with that code. Unknown or ineligible codes change nothing.
    #[instrument(skip(self))]
    pub async fn apply_affiliate_code(
        &self,
        order_id: Uuid,
        code: &str,
    ) -> Result<(Order, AffiliateCodeOutcome), OrderError> {
        let code = code.trim();
        let mut order = self.get_order(order_id).await?;
        let mut outcome = AffiliateCodeOutcome { promotion: None, affiliate_id: None };

        if code.is_empty() {
            return Ok((order, outcome));
        }
        if !order.status.is_editable() {
            return Err(OrderError::NotEditable(order.status.name().to_string()));
        }

        if let Some(promo) = self.promotions.find_by_code(code).await? {
            match order.apply_promotion(&promo, today()) {
                Ok(applied) => outcome.promotion = Some(applied),
                Err(OrderError::Ineligible(reason)) => {
                    info!("Affiliate code {} not applied as a promotion: {}", code, reason);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(affiliate) = self.affiliates.find_by_code(code).await? {
            if affiliate.is_enabled {
                order.affiliate_id = Some(affiliate.id);
                outcome.affiliate_id = Some(affiliate.id);
            }
        }

        self.save(&mut order).await?;
        Ok((order, outcome))
    }

    pub async fn remove_promotion(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let mut order = self.get_order(order_id).await?;
        if !order.status.is_editable() {
            return Err(OrderError::NotEditable(order.status.name().to_string()));
        }
        order.remove_promotion();
        self.save(&mut order).await?;
        Ok(order)
    }

    /// Removes lines that can't be filled from stock. Returns the order and the names of
    /// the removed lines.
    #[instrument(skip(self))]
    pub async fn check_inventory(&self, order_id: Uuid) -> Result<(Order, Vec<String>), OrderError> {
        let mut order = self.get_order(order_id).await?;
        let shortfalls = inventory::find_shortfalls(self.items.as_ref(), &order.stock_requests()).await?;

        if shortfalls.is_empty() {
            return Ok((order, Vec::new()));
        }

        let item_ids: Vec<Uuid> = shortfalls.iter().map(|s| s.item_id).collect();
        let removed = order.remove_lines_for_items(&item_ids);
        self.save(&mut order).await?;
        info!("Removed out of stock items from order {}: {:?}", order.order_number, removed);

        Ok((order, removed))
    }

    /// Stores the customer, addresses and card on the order.
    #[instrument(skip(self, details))]
    pub async fn update_checkout_details(
        &self,
        order_id: Uuid,
        details: CheckoutDetails,
        shipping_cost_cents: Cents,
    ) -> Result<Order, OrderError> {
        let mut order = self.get_order(order_id).await?;
        if !order.status.is_editable() {
            return Err(OrderError::NotEditable(order.status.name().to_string()));
        }

        let email = details.customer_email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(OrderError::InvalidCheckout("please enter a valid email address".to_string()));
        }
        validate_account(&details.account, today())?;

        let mut billing = details.billing_address;
        billing.normalize();
        billing.validate()?;

        let mut shipping = details.shipping_address.unwrap_or_else(|| billing.clone());
        shipping.normalize();
        shipping.validate()?;

        order.customer_email = Some(Masked::new(email));
        order.billing_address = Some(billing);
        order.shipping_address = Some(shipping);
        order.account = Some(details.account);
        order.tax_rate = details.tax_rate;
        order.shipping_cost_cents = shipping_cost_cents;

        self.save(&mut order).await?;
        Ok(order)
    }

    /// Admin status change, checked against the transition table.
    #[instrument(skip(self))]
    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order, OrderError> {
        let mut order = self.get_order(order_id).await?;
        if order.status == status {
            return Ok(order);
        }

        order.transition_to(status)?;
        self.save(&mut order).await?;
        info!("Order {} moved to {}", order.order_number, status.name());
        Ok(order)
    }

    pub async fn add_note(&self, order_id: Uuid, text: &str) -> Result<Order, OrderError> {
        let mut order = self.get_order(order_id).await?;
        order.add_note(text);
        self.save(&mut order).await?;
        Ok(order)
    }

    /// Deletes carts created before today.
    #[instrument(skip(self))]
    pub async fn destroy_old_carts(&self) -> Result<u64, OrderError> {
        let cutoff = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or_else(Utc::now);

        let deleted = self.orders.delete_carts_created_before(cutoff).await?;
        if deleted > 0 {
            info!("Destroyed {} old carts", deleted);
        }
        Ok(deleted)
    }

    /// Index 0 holds the whole year, 1..=12 the months.
    pub async fn sales_totals_for_year(&self, year: i32) -> Result<Vec<SalesTotals>, OrderError> {
        let orders = self.orders.find_completed_in_year(year).await?;
        Ok(totals_for_year(&orders, year))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn validate_account(account: &PaymentAccount, today: NaiveDate) -> Result<(), OrderError> {
    let digits: String = account
        .cc_number
        .expose()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();

    if !(13..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(OrderError::InvalidCheckout("card number is invalid".to_string()));
    }
    if !(1..=12).contains(&account.expiration_month) {
        return Err(OrderError::InvalidCheckout("expiration month is invalid".to_string()));
    }

    let expired = account.expiration_year < today.year()
        || (account.expiration_year == today.year() && account.expiration_month < today.month());
    if expired {
        return Err(OrderError::InvalidCheckout("card has expired".to_string()));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    #[error("Order can't be changed in status {0}")]
    NotEditable(String),

    #[error("Item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("Promotion not found: {0:?}")]
    PromotionNotFound(String),

    #[error("Promotion can't be applied: {0}")]
    Ineligible(#[from] Ineligibility),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Invalid checkout details: {0}")]
    InvalidCheckout(String),

    #[error("Order has not been placed: {0}")]
    NotPlaced(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Order storage failed: {0}")]
    Repository(String),
}

impl From<BoxError> for OrderError {
    fn from(e: BoxError) -> Self {
        OrderError::Repository(e.to_string())
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::NaiveDate;
use substruct_shared::money::percent_of;

use crate::models::{Discount, Promotion};

/// One line of the cart being evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartLine {
    pub item_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price_cents: i64,
    /// True for the discount line of an already applied promotion.
    pub is_promotion: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    pub fn new(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    pub fn subtotal_excluding_promotion(&self) -> i64 {
        self.lines
            .iter()
            .filter(|l| !l.is_promotion)
            .map(|l| l.quantity as i64 * l.unit_price_cents)
            .sum()
    }

    pub fn has_products(&self) -> bool {
        self.lines.iter().any(|l| !l.is_promotion)
    }

    fn product_line(&self, item_id: Uuid) -> Option<&CartLine> {
        self.lines
            .iter()
            .find(|l| !l.is_promotion && l.item_id == Some(item_id))
    }
}

/// Why a promotion can't be applied to (or kept on) an order.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum Ineligibility {
    #[error("promotion is not active")]
    Inactive,

    #[error("order has no items")]
    EmptyCart,

    #[error("order subtotal {subtotal_cents} is below the minimum of {minimum_cents}")]
    BelowMinimum { minimum_cents: i64, subtotal_cents: i64 },

    #[error("needs {required} of the promoted item, order has {present}")]
    TargetQuantityNotMet { required: i32, present: i32 },
}

/// Decides whether `promo` applies to `cart` today. Also used to decide whether an
/// applied promotion has to be removed.
pub fn check_eligibility(
    promo: &Promotion,
    cart: &CartSnapshot,
    today: NaiveDate,
) -> Result<(), Ineligibility> {
    if !promo.is_active_on(today) {
        return Err(Ineligibility::Inactive);
    }

    if !cart.has_products() {
        return Err(Ineligibility::EmptyCart);
    }

    if let Some(minimum_cents) = promo.minimum_cart_value_cents {
        let subtotal_cents = cart.subtotal_excluding_promotion();
        if subtotal_cents < minimum_cents {
            return Err(Ineligibility::BelowMinimum { minimum_cents, subtotal_cents });
        }
    }

    if let Discount::BuyNGetOneFree { n, item_id } = &promo.discount {
        let present = cart.product_line(*item_id).map(|l| l.quantity).unwrap_or(0);
        if present < *n || *n < 1 {
            return Err(Ineligibility::TargetQuantityNotMet { required: *n, present });
        }
    }

    Ok(())
}

/// The synthetic negative-price line a promotion adds to an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountLine {
    pub description: String,
    pub item_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl DiscountLine {
    pub fn total(&self) -> i64 {
        self.quantity as i64 * self.unit_price_cents
    }
}

/// Computes the discount line for an eligible cart. The discount never exceeds the
/// subtotal, so the line items total can't go negative.
pub fn compute_discount(promo: &Promotion, cart: &CartSnapshot) -> Option<DiscountLine> {
    let subtotal = cart.subtotal_excluding_promotion();

    let mut line = match &promo.discount {
        Discount::FlatAmount { amount_cents } => DiscountLine {
            description: promo.description.clone(),
            item_id: None,
            quantity: 1,
            unit_price_cents: -amount_cents,
        },
        Discount::Percent { percent } => DiscountLine {
            description: promo.description.clone(),
            item_id: None,
            quantity: 1,
            unit_price_cents: -percent_of(subtotal, *percent),
        },
        Discount::BuyNGetOneFree { n, item_id } => {
            if *n < 1 {
                return None;
            }
            let target = cart.product_line(*item_id)?;
            let free_units = target.quantity / n;
            if free_units == 0 {
                return None;
            }
            DiscountLine {
                description: promo.description.clone(),
                item_id: Some(*item_id),
                quantity: free_units,
                unit_price_cents: -target.unit_price_cents,
            }
        }
    };

    if -line.total() >= subtotal {
        line.quantity = 1;
        line.unit_price_cents = -subtotal;
    }

    Some(line)
}

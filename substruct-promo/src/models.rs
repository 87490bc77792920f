use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

use crate::rules::Ineligibility;

/// How a promotion discounts an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Discount {
    /// Fixed amount off the order.
    FlatAmount { amount_cents: i64 },
    /// Percent of the line items total.
    Percent { percent: f64 },
    /// For every `n` units of `item_id`, one unit is free.
    BuyNGetOneFree { n: i32, item_id: Uuid },
}

/// Stored discount type codes.
pub const DISCOUNT_TYPE_DOLLARS: i16 = 0;
pub const DISCOUNT_TYPE_PERCENT: i16 = 1;
pub const DISCOUNT_TYPE_BUY_N_GET_1: i16 = 2;

impl Discount {
    /// Flattens into `(discount_type, discount_amount, item_id)` columns.
    pub fn to_parts(&self) -> (i16, f64, Option<Uuid>) {
        match self {
            Discount::FlatAmount { amount_cents } => (DISCOUNT_TYPE_DOLLARS, *amount_cents as f64, None),
            Discount::Percent { percent } => (DISCOUNT_TYPE_PERCENT, *percent, None),
            Discount::BuyNGetOneFree { n, item_id } => (DISCOUNT_TYPE_BUY_N_GET_1, *n as f64, Some(*item_id)),
        }
    }

    pub fn from_parts(discount_type: i16, amount: f64, item_id: Option<Uuid>) -> Result<Self, PromotionError> {
        match (discount_type, item_id) {
            (DISCOUNT_TYPE_DOLLARS, _) => Ok(Discount::FlatAmount { amount_cents: amount.round() as i64 }),
            (DISCOUNT_TYPE_PERCENT, _) => Ok(Discount::Percent { percent: amount }),
            (DISCOUNT_TYPE_BUY_N_GET_1, Some(item_id)) => Ok(Discount::BuyNGetOneFree {
                n: amount as i32,
                item_id,
            }),
            (DISCOUNT_TYPE_BUY_N_GET_1, None) => {
                Err(PromotionError::Invalid("buy n get 1 promotion without an item".to_string()))
            }
            (other, _) => Err(PromotionError::Invalid(format!("unknown discount type {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promotion {
    pub id: Uuid,
    pub code: String,
    /// Also used as the name of the discount line item.
    pub description: String,
    pub discount: Discount,
    pub minimum_cart_value_cents: Option<i64>,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    pub fn new(
        code: &str,
        description: &str,
        discount: Discount,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.trim().to_string(),
            description: description.to_string(),
            discount,
            minimum_cart_value_cents: None,
            starts_on,
            ends_on,
            created_at: Utc::now(),
        }
    }

    pub fn with_minimum_cart_value(mut self, minimum_cents: i64) -> Self {
        self.minimum_cart_value_cents = Some(minimum_cents);
        self
    }

    /// Active between `starts_on` and `ends_on`, both inclusive.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.starts_on <= today && today <= self.ends_on
    }

    pub fn validate(&self) -> Result<(), PromotionError> {
        if !crate::codes::is_valid_code(&self.code) {
            return Err(PromotionError::Invalid(format!("invalid promotion code {:?}", self.code)));
        }
        if self.description.trim().is_empty() {
            return Err(PromotionError::Invalid("description can't be blank".to_string()));
        }
        if self.ends_on < self.starts_on {
            return Err(PromotionError::Invalid("promotion ends before it starts".to_string()));
        }
        if let Some(min) = self.minimum_cart_value_cents {
            if min < 0 {
                return Err(PromotionError::Invalid("minimum cart value can't be negative".to_string()));
            }
        }
        match &self.discount {
            Discount::FlatAmount { amount_cents } if *amount_cents < 0 => {
                Err(PromotionError::Invalid("discount amount can't be negative".to_string()))
            }
            Discount::Percent { percent } if !(0.0..=100.0).contains(percent) => {
                Err(PromotionError::Invalid("percent must be between 0 and 100".to_string()))
            }
            Discount::BuyNGetOneFree { n, .. } if *n < 1 => {
                Err(PromotionError::Invalid("buy n get 1 needs n of at least 1".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("Promotion not found: {0}")]
    NotFound(String),

    #[error("Invalid promotion: {0}")]
    Invalid(String),

    #[error("Promotion can't be applied: {0}")]
    Ineligible(#[from] Ineligibility),

    #[error("Promotion storage failed: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn test_active_range_is_inclusive() {
        let promo = Promotion::new(
            "WINTER",
            "Winter sale",
            Discount::FlatAmount { amount_cents: 500 },
            today(),
            today() + Duration::days(7),
        );

        assert!(promo.is_active_on(today()));
        assert!(promo.is_active_on(today() + Duration::days(7)));
        assert!(!promo.is_active_on(today() + Duration::days(8)));
        assert!(!promo.is_active_on(today() - Duration::days(1)));
    }

    #[test]
    fn test_discount_parts() {
        let item_id = Uuid::new_v4();
        let discount = Discount::BuyNGetOneFree { n: 3, item_id };
        let (kind, amount, item) = discount.to_parts();
        assert_eq!(Discount::from_parts(kind, amount, item).unwrap(), discount);

        assert!(Discount::from_parts(DISCOUNT_TYPE_BUY_N_GET_1, 2.0, None).is_err());
        assert!(Discount::from_parts(9, 1.0, None).is_err());
    }

    #[test]
    fn test_validate() {
        let mut promo = Promotion::new(
            "HALF",
            "Half off",
            Discount::Percent { percent: 50.0 },
            today(),
            today(),
        );
        assert!(promo.validate().is_ok());

        promo.discount = Discount::Percent { percent: 150.0 };
        assert!(promo.validate().is_err());

        promo.discount = Discount::Percent { percent: 10.0 };
        promo.code = "bad code".to_string();
        assert!(promo.validate().is_err());
    }

    #[test]
    fn test_discount_serialization_is_tagged() {
        let json = serde_json::to_value(Discount::FlatAmount { amount_cents: 250 }).unwrap();
        assert_eq!(json["type"], "FLAT_AMOUNT");
        assert_eq!(json["amount_cents"], 250);
    }
}

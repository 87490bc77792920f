use serde::{Deserialize, Serialize};
use uuid::Uuid;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use substruct_core::BoxError;

/// A sellable item: either a base product or a variation of one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    /// Units in stock.
    pub quantity: i32,
    pub weight: f64,
    /// Set for variations: the base product this item varies.
    pub product_id: Option<Uuid>,
    pub date_available: NaiveDate,
}

impl Item {
    pub fn new(name: &str, code: Option<&str>, price_cents: i64, quantity: i32) -> Self {
        let raw_code = match code {
            Some(c) if !c.trim().is_empty() => c,
            _ => name,
        };

        Self {
            id: Uuid::new_v4(),
            code: clean_code(raw_code),
            name: name.to_string(),
            price_cents,
            quantity,
            weight: 0.0,
            product_id: None,
            date_available: Utc::now().date_naive(),
        }
    }

    /// A variation of `parent`. Its code defaults to `<PARENT-CODE>-<SHORT-NAME>` and a zero
    /// price means "use the parent's price".
    pub fn variation(parent: &Item, short_name: &str, price_cents: i64, quantity: i32) -> Self {
        let mut item = Item::new(short_name, None, price_cents, quantity);
        item.code = clean_code(&format!("{}-{}", parent.code, short_name));
        item.product_id = Some(parent.id);
        if price_cents == parent.price_cents {
            item.price_cents = 0;
        }
        item
    }

    pub fn is_variation(&self) -> bool {
        self.product_id.is_some()
    }

    /// Name output for product suggestion lists.
    pub fn suggestion_name(&self) -> String {
        format!("{}: {}", self.code, self.name)
    }

    /// Effective selling price, falling back to the parent for price-less variations.
    pub fn effective_price(&self, parent: Option<&Item>) -> i64 {
        match parent {
            Some(p) if self.product_id == Some(p.id) && self.price_cents == 0 => p.price_cents,
            _ => self.price_cents,
        }
    }

    /// Display name; variations include the parent name.
    pub fn display_name(&self, parent: Option<&Item>) -> String {
        match parent {
            Some(p) if self.product_id == Some(p.id) => format!("{} - {}", p.name, self.name),
            _ => self.name.clone(),
        }
    }
}

/// Upper-cases a code and makes it URL safe: runs of non-alphanumerics become a
/// single `-`, leading and trailing dashes are dropped.
pub fn clean_code(raw: &str) -> String {
    let mut code = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            code.extend(c.to_uppercase());
        } else if !code.ends_with('-') {
            code.push('-');
        }
    }
    code.trim_matches('-').to_string()
}

/// Repository trait for live item/stock data
#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn get_item(&self, id: Uuid) -> Result<Option<Item>, BoxError>;

    async fn save_item(&self, item: &Item) -> Result<(), BoxError>;

    async fn list_items(&self) -> Result<Vec<Item>, BoxError>;

    /// Subtracts `quantity` from stock in one step. Returns the new stock level, or `None`
    /// when the item no longer exists.
    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<Option<i32>, BoxError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error("Item not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid item: {0}")]
    Invalid(String),
}

/// Validation applied before an item is stored.
pub fn validate_item(item: &Item) -> Result<(), ProductError> {
    if item.name.trim().is_empty() {
        return Err(ProductError::Invalid("name can't be blank".to_string()));
    }
    if item.code.is_empty() {
        return Err(ProductError::Invalid("code can't be blank".to_string()));
    }
    if item.price_cents < 0 {
        return Err(ProductError::Invalid("price can't be negative".to_string()));
    }
    Ok(())
}

use uuid::Uuid;
use std::collections::HashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use substruct_core::BoxError;

use crate::product::{Item, ItemRepository};

/// A product line as seen by the inventory reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRequest {
    pub item_id: Uuid,
    pub name: String,
    pub quantity: i32,
}

/// A line that can no longer be filled from stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockShortfall {
    pub item_id: Uuid,
    pub name: String,
    pub requested: i32,
    pub available: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Inventory lookup failed: {0}")]
    Lookup(String),
}

/// Compares each requested quantity against live stock. Items that no longer exist are
/// skipped, not reported.
pub async fn find_shortfalls(
    items: &dyn ItemRepository,
    requests: &[StockRequest],
) -> Result<Vec<StockShortfall>, InventoryError> {
    let mut shortfalls = Vec::new();

    for request in requests {
        let item = items
            .get_item(request.item_id)
            .await
            .map_err(|e| InventoryError::Lookup(e.to_string()))?;

        let Some(item) = item else { continue };

        if request.quantity > item.quantity {
            shortfalls.push(StockShortfall {
                item_id: request.item_id,
                name: request.name.clone(),
                requested: request.quantity,
                available: item.quantity,
            });
        }
    }

    Ok(shortfalls)
}

/// Decrements stock after a successful payment. Missing items and storage errors are
/// logged and skipped; the order is never compensated. Returns how many lines were applied.
pub async fn decrement_stock(items: &dyn ItemRepository, requests: &[StockRequest]) -> usize {
    let mut applied = 0;

    for request in requests {
        match items.decrement_stock(request.item_id, request.quantity).await {
            Ok(Some(remaining)) => {
                info!("Decremented stock for {} by {}: {} left", request.item_id, request.quantity, remaining);
                applied += 1;
            }
            Ok(None) => {
                info!("Item {} no longer exists, skipping stock decrement", request.item_id);
            }
            Err(e) => {
                warn!("Failed to decrement stock for {}: {}", request.item_id, e);
            }
        }
    }

    applied
}

/// In-memory item store, used by tests and local runs.
pub struct InMemoryItemRepository {
    items: RwLock<HashMap<Uuid, Item>>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|i| (i.id, i)).collect()),
        }
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Item> {
        self.items.write().await.remove(id)
    }
}

impl Default for InMemoryItemRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn get_item(&self, id: Uuid) -> Result<Option<Item>, BoxError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn save_item(&self, item: &Item) -> Result<(), BoxError> {
        self.items.write().await.insert(item.id, item.clone());
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<Item>, BoxError> {
        let mut items: Vec<Item> = self.items.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(items)
    }

    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<Option<i32>, BoxError> {
        let mut items = self.items.write().await;
        Ok(items.get_mut(&id).map(|item| {
            item.quantity -= quantity;
            item.quantity
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(item: &Item, quantity: i32) -> StockRequest {
        StockRequest {
            item_id: item.id,
            name: item.name.clone(),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_find_shortfalls() {
        let coat = Item::new("Grey Coat", None, 15000, 1);
        let saber = Item::new("Lightsaber", None, 2000, 10);
        let repo = InMemoryItemRepository::with_items(vec![coat.clone(), saber.clone()]);

        let missing = StockRequest {
            item_id: Uuid::new_v4(),
            name: "Deleted".to_string(),
            quantity: 5,
        };

        let shortfalls = find_shortfalls(&repo, &[request(&coat, 2), request(&saber, 10), missing])
            .await
            .unwrap();

        assert_eq!(shortfalls.len(), 1);
        assert_eq!(shortfalls[0].name, "Grey Coat");
        assert_eq!(shortfalls[0].available, 1);
    }

    #[tokio::test]
    async fn test_decrement_skips_missing_items() {
        let saber = Item::new("Lightsaber", None, 2000, 10);
        let repo = InMemoryItemRepository::with_items(vec![saber.clone()]);

        let gone = Item::new("Gone", None, 100, 1);
        let applied = decrement_stock(&repo, &[request(&saber, 3), request(&gone, 1)]).await;

        assert_eq!(applied, 1);
        assert_eq!(repo.get_item(saber.id).await.unwrap().unwrap().quantity, 7);
    }
}

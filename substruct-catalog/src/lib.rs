pub mod product;
pub mod inventory;

pub use product::{Item, ItemRepository, ProductError};
pub use inventory::{InMemoryItemRepository, InventoryError, StockRequest, StockShortfall};

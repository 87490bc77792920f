use uuid::Uuid;
use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;
use substruct_core::BoxError;

use crate::models::Promotion;

#[async_trait]
pub trait PromotionRepository: Send + Sync {
    async fn get_promotion(&self, id: Uuid) -> Result<Option<Promotion>, BoxError>;

    /// Exact match on the code.
    async fn find_by_code(&self, code: &str) -> Result<Option<Promotion>, BoxError>;

    async fn save_promotion(&self, promotion: &Promotion) -> Result<(), BoxError>;

    async fn list_promotions(&self) -> Result<Vec<Promotion>, BoxError>;

    async fn delete_promotion(&self, id: Uuid) -> Result<bool, BoxError>;
}

pub struct InMemoryPromotionRepository {
    promotions: RwLock<HashMap<Uuid, Promotion>>,
}

impl InMemoryPromotionRepository {
    pub fn new() -> Self {
        Self {
            promotions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_promotions(promotions: Vec<Promotion>) -> Self {
        Self {
            promotions: RwLock::new(promotions.into_iter().map(|p| (p.id, p)).collect()),
        }
    }
}

impl Default for InMemoryPromotionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PromotionRepository for InMemoryPromotionRepository {
    async fn get_promotion(&self, id: Uuid) -> Result<Option<Promotion>, BoxError> {
        Ok(self.promotions.read().await.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Promotion>, BoxError> {
        Ok(self
            .promotions
            .read()
            .await
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn save_promotion(&self, promotion: &Promotion) -> Result<(), BoxError> {
        let mut promotions = self.promotions.write().await;
        if promotions
            .values()
            .any(|p| p.code == promotion.code && p.id != promotion.id)
        {
            return Err(format!("promotion code {} is already taken", promotion.code).into());
        }
        promotions.insert(promotion.id, promotion.clone());
        Ok(())
    }

    async fn list_promotions(&self) -> Result<Vec<Promotion>, BoxError> {
        let mut promotions: Vec<Promotion> = self.promotions.read().await.values().cloned().collect();
        promotions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(promotions)
    }

    async fn delete_promotion(&self, id: Uuid) -> Result<bool, BoxError> {
        Ok(self.promotions.write().await.remove(&id).is_some())
    }
}

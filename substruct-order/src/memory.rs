use uuid::Uuid;
use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tokio::sync::RwLock;
use substruct_core::BoxError;

use crate::affiliate::{Affiliate, AffiliatePayment};
use crate::models::{Order, OrderStatus};
use crate::repository::{AffiliateRepository, OrderRepository};

/// In-memory order store, used by tests and local runs.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, BoxError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_order_number(&self, order_number: i64) -> Result<Option<Order>, BoxError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn order_number_exists(&self, order_number: i64) -> Result<bool, BoxError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .any(|o| o.order_number == order_number))
    }

    async fn transaction_recorded_elsewhere(&self, transaction_id: &str, order_id: Uuid) -> Result<bool, BoxError> {
        Ok(self.orders.read().await.values().any(|o| {
            o.id != order_id && o.auth_transaction_id.as_deref() == Some(transaction_id)
        }))
    }

    async fn save_order(&self, order: &Order) -> Result<(), BoxError> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|o| o.order_number == order.order_number && o.id != order.id)
        {
            return Err(format!("order number {} is already taken", order.order_number).into());
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete_carts_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, BoxError> {
        let mut orders = self.orders.write().await;
        let before = orders.len();
        orders.retain(|_, o| !(o.status == OrderStatus::Cart && o.created_at < cutoff));
        Ok((before - orders.len()) as u64)
    }

    async fn find_by_affiliate(&self, affiliate_id: Uuid) -> Result<Vec<Order>, BoxError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.affiliate_id == Some(affiliate_id))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn find_completed_in_year(&self, year: i32) -> Result<Vec<Order>, BoxError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.created_at.year() == year && (5..=7).contains(&o.status.code()))
            .cloned()
            .collect())
    }

    async fn mark_affiliate_paid(&self, order_ids: &[Uuid], payment_id: Uuid) -> Result<(), BoxError> {
        let mut orders = self.orders.write().await;
        for id in order_ids {
            if let Some(order) = orders.get_mut(id) {
                order.affiliate_payment_id = Some(payment_id);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAffiliateRepository {
    affiliates: RwLock<HashMap<Uuid, Affiliate>>,
    payments: RwLock<Vec<AffiliatePayment>>,
}

impl InMemoryAffiliateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AffiliateRepository for InMemoryAffiliateRepository {
    async fn get_affiliate(&self, id: Uuid) -> Result<Option<Affiliate>, BoxError> {
        Ok(self.affiliates.read().await.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Affiliate>, BoxError> {
        Ok(self
            .affiliates
            .read()
            .await
            .values()
            .find(|a| a.code == code)
            .cloned())
    }

    async fn list_affiliates(&self) -> Result<Vec<Affiliate>, BoxError> {
        let mut affiliates: Vec<Affiliate> = self.affiliates.read().await.values().cloned().collect();
        affiliates.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(affiliates)
    }

    async fn save_affiliate(&self, affiliate: &Affiliate) -> Result<(), BoxError> {
        let mut affiliates = self.affiliates.write().await;
        for other in affiliates.values().filter(|a| a.id != affiliate.id) {
            if other.code == affiliate.code {
                return Err(format!("affiliate code {} is already taken", affiliate.code).into());
            }
            if other.email_address.eq_ignore_ascii_case(&affiliate.email_address) {
                return Err("affiliate email address already in use".into());
            }
        }
        affiliates.insert(affiliate.id, affiliate.clone());
        Ok(())
    }

    async fn save_payment(&self, payment: &AffiliatePayment) -> Result<(), BoxError> {
        self.payments.write().await.push(payment.clone());
        Ok(())
    }

    async fn payments_for(&self, affiliate_id: Uuid) -> Result<Vec<AffiliatePayment>, BoxError> {
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .filter(|p| p.affiliate_id == affiliate_id)
            .cloned()
            .collect())
    }
}

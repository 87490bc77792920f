use uuid::Uuid;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use substruct_core::BoxError;

use crate::affiliate::{Affiliate, AffiliatePayment};
use crate::models::Order;

/// Repository trait for orders and their line items
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, BoxError>;

    async fn find_by_order_number(&self, order_number: i64) -> Result<Option<Order>, BoxError>;

    async fn order_number_exists(&self, order_number: i64) -> Result<bool, BoxError>;

    /// True when an order other than `order_id` already carries `transaction_id`.
    async fn transaction_recorded_elsewhere(&self, transaction_id: &str, order_id: Uuid) -> Result<bool, BoxError>;

    /// Inserts or replaces the order with its line items.
    async fn save_order(&self, order: &Order) -> Result<(), BoxError>;

    /// Deletes orders still in the cart status created before `cutoff`.
    async fn delete_carts_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, BoxError>;

    async fn find_by_affiliate(&self, affiliate_id: Uuid) -> Result<Vec<Order>, BoxError>;

    /// Orders with status 5, 6 or 7 created during `year`.
    async fn find_completed_in_year(&self, year: i32) -> Result<Vec<Order>, BoxError>;

    async fn mark_affiliate_paid(&self, order_ids: &[Uuid], payment_id: Uuid) -> Result<(), BoxError>;
}

#[async_trait]
pub trait AffiliateRepository: Send + Sync {
    async fn get_affiliate(&self, id: Uuid) -> Result<Option<Affiliate>, BoxError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Affiliate>, BoxError>;

    async fn list_affiliates(&self) -> Result<Vec<Affiliate>, BoxError>;

    /// Fails when the code or email address belongs to another affiliate.
    async fn save_affiliate(&self, affiliate: &Affiliate) -> Result<(), BoxError>;

    async fn save_payment(&self, payment: &AffiliatePayment) -> Result<(), BoxError>;

    async fn payments_for(&self, affiliate_id: Uuid) -> Result<Vec<AffiliatePayment>, BoxError>;
}

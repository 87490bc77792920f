use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tracing::{info, instrument};
use substruct_core::BoxError;
use substruct_promo::codes::{is_valid_code, random_code};
use substruct_shared::Cents;

use crate::address::is_valid_email;
use crate::models::Order;
use crate::repository::{AffiliateRepository, OrderRepository};

const AFFILIATE_CODE_SIZE: usize = 10;

/// Someone who refers customers and earns a share of their orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Affiliate {
    pub id: Uuid,
    pub code: String,
    pub email_address: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: Option<String>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Affiliate {
    pub fn new(code: &str, email_address: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.trim().to_string(),
            email_address: email_address.trim().to_string(),
            first_name: String::new(),
            last_name: String::new(),
            company: None,
            is_enabled: true,
            created_at: Utc::now(),
        }
    }

    /// Company name when set, the person's name otherwise.
    pub fn name(&self) -> String {
        match self.company.as_deref().map(str::trim) {
            Some(company) if !company.is_empty() => company.to_string(),
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }

    pub fn validate(&self) -> Result<(), AffiliateError> {
        if !is_valid_code(&self.code) {
            return Err(AffiliateError::Invalid(
                "affiliate code must only contain letters, numbers, '_' or '-'".to_string(),
            ));
        }
        if !is_valid_email(&self.email_address) {
            return Err(AffiliateError::Invalid("please enter a valid email address".to_string()));
        }
        Ok(())
    }
}

/// A payout covering an affiliate's earnings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffiliatePayment {
    pub id: Uuid,
    pub affiliate_id: Uuid,
    pub amount_cents: Cents,
    pub order_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AffiliatePayment {
    /// Reference shown on statements, e.g. `PMT-1A2B3C4D`.
    pub fn number(&self) -> String {
        let simple = self.id.simple().to_string();
        format!("PMT-{}", simple[..8].to_uppercase())
    }
}

/// Earnings for one calendar month.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MonthlyEarnings {
    pub start_date: NaiveDate,
    pub num_total_orders: u32,
    pub num_valid_orders: u32,
    pub revenue_cents: Cents,
    pub earnings_cents: Cents,
}

/// Earnings, payouts and authentication for affiliates.
pub struct AffiliateService {
    affiliates: Arc<dyn AffiliateRepository>,
    orders: Arc<dyn OrderRepository>,
    revenue_percentage: f64,
    paid_order_delay_days: i64,
}

impl AffiliateService {
    pub fn new(
        affiliates: Arc<dyn AffiliateRepository>,
        orders: Arc<dyn OrderRepository>,
        revenue_percentage: f64,
        paid_order_delay_days: i64,
    ) -> Self {
        Self {
            affiliates,
            orders,
            revenue_percentage,
            paid_order_delay_days,
        }
    }

    /// A code no other affiliate uses.
    pub async fn generate_code(&self) -> Result<String, AffiliateError> {
        loop {
            let code = random_code(AFFILIATE_CODE_SIZE);
            if self.affiliates.find_by_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
    }

    /// Validates and stores an affiliate. A blank code is replaced by a generated one.
    #[instrument(skip(self, affiliate), fields(email = %affiliate.email_address))]
    pub async fn create(&self, mut affiliate: Affiliate) -> Result<Affiliate, AffiliateError> {
        if affiliate.code.trim().is_empty() {
            affiliate.code = self.generate_code().await?;
        }
        affiliate.validate()?;
        self.affiliates
            .save_affiliate(&affiliate)
            .await
            .map_err(|e| AffiliateError::Invalid(e.to_string()))?;
        info!("Created affiliate {}", affiliate.code);
        Ok(affiliate)
    }

    pub async fn get(&self, affiliate_id: Uuid) -> Result<Affiliate, AffiliateError> {
        self.affiliates
            .get_affiliate(affiliate_id)
            .await?
            .ok_or(AffiliateError::NotFound(affiliate_id))
    }

    /// Enabled affiliate with this email address and code.
    pub async fn authenticate(&self, email: &str, code: &str) -> Result<Option<Affiliate>, AffiliateError> {
        let affiliate = self.affiliates.find_by_code(code.trim()).await?;
        Ok(affiliate.filter(|a| a.is_enabled && a.email_address.eq_ignore_ascii_case(email.trim())))
    }

    fn earnings(&self, orders: &[Order]) -> Cents {
        orders
            .iter()
            .map(|o| o.affiliate_earnings(self.revenue_percentage))
            .sum()
    }

    pub async fn total_earnings(&self, affiliate: &Affiliate) -> Result<Cents, AffiliateError> {
        let orders = self.orders.find_by_affiliate(affiliate.id).await?;
        Ok(self.earnings(&orders))
    }

    pub async fn total_amount_paid(&self, affiliate: &Affiliate) -> Result<Cents, AffiliateError> {
        let payments = self.affiliates.payments_for(affiliate.id).await?;
        Ok(payments.iter().map(|p| p.amount_cents).sum())
    }

    /// Earnings minus payouts.
    pub async fn total_owed(&self, affiliate: &Affiliate) -> Result<Cents, AffiliateError> {
        Ok(self.total_earnings(affiliate).await? - self.total_amount_paid(affiliate).await?)
    }

    /// One entry per month with referred orders, oldest first.
    pub async fn earnings_by_month(&self, affiliate: &Affiliate) -> Result<Vec<MonthlyEarnings>, AffiliateError> {
        let orders = self.orders.find_by_affiliate(affiliate.id).await?;
        let mut months: BTreeMap<NaiveDate, MonthlyEarnings> = BTreeMap::new();

        for order in &orders {
            let created = order.created_at.date_naive();
            let Some(start_date) = NaiveDate::from_ymd_opt(created.year(), created.month(), 1) else {
                continue;
            };
            let entry = months.entry(start_date).or_insert_with(|| MonthlyEarnings {
                start_date,
                num_total_orders: 0,
                num_valid_orders: 0,
                revenue_cents: 0,
                earnings_cents: 0,
            });

            entry.num_total_orders += 1;
            if order.status.is_payable_to_affiliate() {
                entry.num_valid_orders += 1;
                entry.revenue_cents += order.total();
                entry.earnings_cents += order.affiliate_earnings(self.revenue_percentage);
            }
        }

        Ok(months.into_values().collect())
    }

    /// Enabled affiliates that are owed money.
    pub async fn find_unpaid(&self) -> Result<Vec<Affiliate>, AffiliateError> {
        let mut unpaid = Vec::new();
        for affiliate in self.affiliates.list_affiliates().await? {
            if affiliate.is_enabled && self.total_owed(&affiliate).await? > 0 {
                unpaid.push(affiliate);
            }
        }
        Ok(unpaid)
    }

    /// Builds (without storing) a payment of everything owed. It covers payable orders
    /// older than the paid-order delay that no payment covers yet. `None` when nothing is
    /// owed or the affiliate is disabled.
    pub async fn new_payment_for(&self, affiliate: &Affiliate) -> Result<Option<AffiliatePayment>, AffiliateError> {
        if !affiliate.is_enabled {
            return Ok(None);
        }
        let owed = self.total_owed(affiliate).await?;
        if owed <= 0 {
            return Ok(None);
        }

        let cutoff = Utc::now() - Duration::days(self.paid_order_delay_days);
        let order_ids = self
            .orders
            .find_by_affiliate(affiliate.id)
            .await?
            .into_iter()
            .filter(|o| {
                o.status.is_payable_to_affiliate() && o.affiliate_payment_id.is_none() && o.created_at <= cutoff
            })
            .map(|o| o.id)
            .collect();

        Ok(Some(AffiliatePayment {
            id: Uuid::new_v4(),
            affiliate_id: affiliate.id,
            amount_cents: owed,
            order_ids,
            created_at: Utc::now(),
        }))
    }

    pub async fn new_payments_for_all_unpaid(&self) -> Result<Vec<AffiliatePayment>, AffiliateError> {
        let mut payments = Vec::new();
        for affiliate in self.find_unpaid().await? {
            if let Some(payment) = self.new_payment_for(&affiliate).await? {
                payments.push(payment);
            }
        }
        Ok(payments)
    }

    /// Stores a payment and marks its orders as paid.
    #[instrument(skip(self, payment), fields(number = %payment.number()))]
    pub async fn record_payment(&self, payment: &AffiliatePayment) -> Result<(), AffiliateError> {
        self.affiliates.save_payment(payment).await?;
        self.orders.mark_affiliate_paid(&payment.order_ids, payment.id).await?;
        info!(
            "Recorded affiliate payment {} of {} cents covering {} orders",
            payment.number(),
            payment.amount_cents,
            payment.order_ids.len()
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AffiliateError {
    #[error("Affiliate not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid affiliate: {0}")]
    Invalid(String),

    #[error("Affiliate storage failed: {0}")]
    Storage(String),
}

impl From<BoxError> for AffiliateError {
    fn from(e: BoxError) -> Self {
        AffiliateError::Storage(e.to_string())
    }
}

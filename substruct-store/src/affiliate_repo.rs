use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use substruct_core::BoxError;
use substruct_order::{Affiliate, AffiliatePayment, AffiliateRepository};

pub struct PostgresAffiliateRepository {
    pool: PgPool,
}

impl PostgresAffiliateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const AFFILIATE_COLUMNS: &str = "id, code, email_address, first_name, last_name, company, is_enabled, created_at";

#[derive(sqlx::FromRow)]
struct AffiliateRow {
    id: Uuid,
    code: String,
    email_address: String,
    first_name: String,
    last_name: String,
    company: Option<String>,
    is_enabled: bool,
    created_at: DateTime<Utc>,
}

impl From<AffiliateRow> for Affiliate {
    fn from(row: AffiliateRow) -> Self {
        Affiliate {
            id: row.id,
            code: row.code,
            email_address: row.email_address,
            first_name: row.first_name,
            last_name: row.last_name,
            company: row.company,
            is_enabled: row.is_enabled,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    affiliate_id: Uuid,
    amount_cents: i64,
    order_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<PaymentRow> for AffiliatePayment {
    fn from(row: PaymentRow) -> Self {
        AffiliatePayment {
            id: row.id,
            affiliate_id: row.affiliate_id,
            amount_cents: row.amount_cents,
            order_ids: row.order_ids,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AffiliateRepository for PostgresAffiliateRepository {
    async fn get_affiliate(&self, id: Uuid) -> Result<Option<Affiliate>, BoxError> {
        let sql = format!("SELECT {} FROM affiliates WHERE id = $1", AFFILIATE_COLUMNS);
        let row: Option<AffiliateRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Affiliate::from))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Affiliate>, BoxError> {
        let sql = format!("SELECT {} FROM affiliates WHERE code = $1", AFFILIATE_COLUMNS);
        let row: Option<AffiliateRow> = sqlx::query_as(&sql).bind(code).fetch_optional(&self.pool).await?;
        Ok(row.map(Affiliate::from))
    }

    async fn list_affiliates(&self) -> Result<Vec<Affiliate>, BoxError> {
        let sql = format!("SELECT {} FROM affiliates ORDER BY created_at", AFFILIATE_COLUMNS);
        let rows: Vec<AffiliateRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Affiliate::from).collect())
    }

    async fn save_affiliate(&self, affiliate: &Affiliate) -> Result<(), BoxError> {
        // Unique indexes on code and email_address reject clashes with other affiliates.
        sqlx::query(
            r#"
            INSERT INTO affiliates (id, code, email_address, first_name, last_name, company, is_enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                email_address = EXCLUDED.email_address,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                company = EXCLUDED.company,
                is_enabled = EXCLUDED.is_enabled
            "#,
        )
        .bind(affiliate.id)
        .bind(&affiliate.code)
        .bind(&affiliate.email_address)
        .bind(&affiliate.first_name)
        .bind(&affiliate.last_name)
        .bind(affiliate.company.as_deref())
        .bind(affiliate.is_enabled)
        .bind(affiliate.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_payment(&self, payment: &AffiliatePayment) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            INSERT INTO affiliate_payments (id, affiliate_id, amount_cents, order_ids, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(payment.id)
        .bind(payment.affiliate_id)
        .bind(payment.amount_cents)
        .bind(&payment.order_ids)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn payments_for(&self, affiliate_id: Uuid) -> Result<Vec<AffiliatePayment>, BoxError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            "SELECT id, affiliate_id, amount_cents, order_ids, created_at FROM affiliate_payments \
             WHERE affiliate_id = $1 ORDER BY created_at",
        )
        .bind(affiliate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AffiliatePayment::from).collect())
    }
}

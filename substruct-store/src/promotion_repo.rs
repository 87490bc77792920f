use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use substruct_core::BoxError;
use substruct_promo::models::Discount;
use substruct_promo::{Promotion, PromotionRepository};

pub struct PostgresPromotionRepository {
    pool: PgPool,
}

impl PostgresPromotionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PROMOTION_COLUMNS: &str = "id, code, description, discount_type, discount_amount, item_id, \
     minimum_cart_value_cents, starts_on, ends_on, created_at";

#[derive(sqlx::FromRow)]
struct PromotionRow {
    id: Uuid,
    code: String,
    description: String,
    discount_type: i16,
    discount_amount: f64,
    item_id: Option<Uuid>,
    minimum_cart_value_cents: Option<i64>,
    starts_on: NaiveDate,
    ends_on: NaiveDate,
    created_at: DateTime<Utc>,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = BoxError;

    fn try_from(row: PromotionRow) -> Result<Self, Self::Error> {
        Ok(Promotion {
            id: row.id,
            discount: Discount::from_parts(row.discount_type, row.discount_amount, row.item_id)?,
            code: row.code,
            description: row.description,
            minimum_cart_value_cents: row.minimum_cart_value_cents,
            starts_on: row.starts_on,
            ends_on: row.ends_on,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl PromotionRepository for PostgresPromotionRepository {
    async fn get_promotion(&self, id: Uuid) -> Result<Option<Promotion>, BoxError> {
        let sql = format!("SELECT {} FROM promotions WHERE id = $1", PROMOTION_COLUMNS);
        let row: Option<PromotionRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(Promotion::try_from).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Promotion>, BoxError> {
        let sql = format!("SELECT {} FROM promotions WHERE code = $1", PROMOTION_COLUMNS);
        let row: Option<PromotionRow> = sqlx::query_as(&sql).bind(code).fetch_optional(&self.pool).await?;
        row.map(Promotion::try_from).transpose()
    }

    async fn save_promotion(&self, promotion: &Promotion) -> Result<(), BoxError> {
        let (discount_type, discount_amount, item_id) = promotion.discount.to_parts();

        // The unique index on code rejects duplicates.
        sqlx::query(
            r#"
            INSERT INTO promotions (id, code, description, discount_type, discount_amount, item_id,
                minimum_cart_value_cents, starts_on, ends_on, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                description = EXCLUDED.description,
                discount_type = EXCLUDED.discount_type,
                discount_amount = EXCLUDED.discount_amount,
                item_id = EXCLUDED.item_id,
                minimum_cart_value_cents = EXCLUDED.minimum_cart_value_cents,
                starts_on = EXCLUDED.starts_on,
                ends_on = EXCLUDED.ends_on
            "#,
        )
        .bind(promotion.id)
        .bind(&promotion.code)
        .bind(&promotion.description)
        .bind(discount_type)
        .bind(discount_amount)
        .bind(item_id)
        .bind(promotion.minimum_cart_value_cents)
        .bind(promotion.starts_on)
        .bind(promotion.ends_on)
        .bind(promotion.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_promotions(&self) -> Result<Vec<Promotion>, BoxError> {
        let sql = format!("SELECT {} FROM promotions ORDER BY created_at DESC", PROMOTION_COLUMNS);
        let rows: Vec<PromotionRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Promotion::try_from).collect()
    }

    async fn delete_promotion(&self, id: Uuid) -> Result<bool, BoxError> {
        let result = sqlx::query("DELETE FROM promotions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

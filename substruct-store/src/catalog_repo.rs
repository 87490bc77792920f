use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;
use substruct_catalog::{Item, ItemRepository};
use substruct_core::BoxError;

pub struct PostgresItemRepository {
    pool: PgPool,
}

impl PostgresItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    code: String,
    name: String,
    price_cents: i64,
    quantity: i32,
    weight: f64,
    product_id: Option<Uuid>,
    date_available: NaiveDate,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            code: row.code,
            name: row.name,
            price_cents: row.price_cents,
            quantity: row.quantity,
            weight: row.weight,
            product_id: row.product_id,
            date_available: row.date_available,
        }
    }
}

#[async_trait]
impl ItemRepository for PostgresItemRepository {
    async fn get_item(&self, id: Uuid) -> Result<Option<Item>, BoxError> {
        let row: Option<ItemRow> = sqlx::query_as(
            "SELECT id, code, name, price_cents, quantity, weight, product_id, date_available FROM items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Item::from))
    }

    async fn save_item(&self, item: &Item) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            INSERT INTO items (id, code, name, price_cents, quantity, weight, product_id, date_available)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                quantity = EXCLUDED.quantity,
                weight = EXCLUDED.weight,
                product_id = EXCLUDED.product_id,
                date_available = EXCLUDED.date_available
            "#,
        )
        .bind(item.id)
        .bind(&item.code)
        .bind(&item.name)
        .bind(item.price_cents)
        .bind(item.quantity)
        .bind(item.weight)
        .bind(item.product_id)
        .bind(item.date_available)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<Item>, BoxError> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, code, name, price_cents, quantity, weight, product_id, date_available FROM items ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<Option<i32>, BoxError> {
        // One statement so concurrent checkouts can't lose an update.
        let remaining: Option<i32> = sqlx::query_scalar(
            "UPDATE items SET quantity = quantity - $2 WHERE id = $1 RETURNING quantity",
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(remaining)
    }
}

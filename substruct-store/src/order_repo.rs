use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;
use substruct_core::BoxError;
use substruct_order::models::{OrderLineItem, OrderNote, OrderStatus, PaymentAccount};
use substruct_order::{Address, Order, OrderRepository};
use substruct_shared::Masked;

pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, BoxError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let line_rows: Vec<LineItemRow> = sqlx::query_as(
            "SELECT id, order_id, item_id, promotion_id, name, quantity, unit_price_cents \
             FROM order_line_items WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<Uuid, Vec<OrderLineItem>> = HashMap::new();
        for row in line_rows {
            lines.entry(row.order_id).or_default().push(row.into_line_item());
        }

        rows.into_iter()
            .map(|row| {
                let line_items = lines.remove(&row.id).unwrap_or_default();
                row.into_order(line_items)
            })
            .collect()
    }
}

const ORDER_COLUMNS: &str = "id, order_number, status, billing_address, shipping_address, customer_email, \
     account, promotion_id, affiliate_id, affiliate_payment_id, tax_rate, shipping_cost_cents, \
     product_cost_cents, auth_transaction_id, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: i64,
    status: i16,
    billing_address: Option<Json<Address>>,
    shipping_address: Option<Json<Address>>,
    customer_email: Option<String>,
    account: Option<Json<PaymentAccount>>,
    promotion_id: Option<Uuid>,
    affiliate_id: Option<Uuid>,
    affiliate_payment_id: Option<Uuid>,
    tax_rate: f64,
    shipping_cost_cents: i64,
    product_cost_cents: i64,
    auth_transaction_id: Option<String>,
    notes: Json<Vec<OrderNote>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, line_items: Vec<OrderLineItem>) -> Result<Order, BoxError> {
        let status = OrderStatus::from_code(self.status)
            .ok_or_else(|| format!("order {} has unknown status code {}", self.order_number, self.status))?;

        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            status,
            line_items,
            billing_address: self.billing_address.map(|a| a.0),
            shipping_address: self.shipping_address.map(|a| a.0),
            customer_email: self.customer_email.map(Masked::new),
            account: self.account.map(|a| a.0),
            promotion_id: self.promotion_id,
            affiliate_id: self.affiliate_id,
            affiliate_payment_id: self.affiliate_payment_id,
            tax_rate: self.tax_rate,
            shipping_cost_cents: self.shipping_cost_cents,
            product_cost_cents: self.product_cost_cents,
            auth_transaction_id: self.auth_transaction_id,
            notes: self.notes.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    order_id: Uuid,
    item_id: Option<Uuid>,
    promotion_id: Option<Uuid>,
    name: String,
    quantity: i32,
    unit_price_cents: i64,
}

impl LineItemRow {
    fn into_line_item(self) -> OrderLineItem {
        OrderLineItem {
            id: self.id,
            item_id: self.item_id,
            promotion_id: self.promotion_id,
            name: self.name,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
        }
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, BoxError> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let rows: Vec<OrderRow> = sqlx::query_as(&sql).bind(id).fetch_all(&self.pool).await?;
        Ok(self.load(rows).await?.into_iter().next())
    }

    async fn find_by_order_number(&self, order_number: i64) -> Result<Option<Order>, BoxError> {
        let sql = format!("SELECT {} FROM orders WHERE order_number = $1", ORDER_COLUMNS);
        let rows: Vec<OrderRow> = sqlx::query_as(&sql).bind(order_number).fetch_all(&self.pool).await?;
        Ok(self.load(rows).await?.into_iter().next())
    }

    async fn order_number_exists(&self, order_number: i64) -> Result<bool, BoxError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_number = $1)")
            .bind(order_number)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn transaction_recorded_elsewhere(&self, transaction_id: &str, order_id: Uuid) -> Result<bool, BoxError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE auth_transaction_id = $1 AND id <> $2)",
        )
        .bind(transaction_id)
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn save_order(&self, order: &Order) -> Result<(), BoxError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, status, billing_address, shipping_address, customer_email,
                account, promotion_id, affiliate_id, affiliate_payment_id, tax_rate, shipping_cost_cents,
                product_cost_cents, auth_transaction_id, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                order_number = EXCLUDED.order_number,
                status = EXCLUDED.status,
                billing_address = EXCLUDED.billing_address,
                shipping_address = EXCLUDED.shipping_address,
                customer_email = EXCLUDED.customer_email,
                account = EXCLUDED.account,
                promotion_id = EXCLUDED.promotion_id,
                affiliate_id = EXCLUDED.affiliate_id,
                affiliate_payment_id = EXCLUDED.affiliate_payment_id,
                tax_rate = EXCLUDED.tax_rate,
                shipping_cost_cents = EXCLUDED.shipping_cost_cents,
                product_cost_cents = EXCLUDED.product_cost_cents,
                auth_transaction_id = EXCLUDED.auth_transaction_id,
                notes = EXCLUDED.notes,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(order.id)
        .bind(order.order_number)
        .bind(order.status.code())
        .bind(order.billing_address.as_ref().map(Json))
        .bind(order.shipping_address.as_ref().map(Json))
        .bind(order.customer_email.as_ref().map(|e| e.expose().clone()))
        .bind(order.account.as_ref().map(Json))
        .bind(order.promotion_id)
        .bind(order.affiliate_id)
        .bind(order.affiliate_payment_id)
        .bind(order.tax_rate)
        .bind(order.shipping_cost_cents)
        .bind(order.product_cost_cents)
        .bind(order.auth_transaction_id.as_deref())
        .bind(Json(&order.notes))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_line_items WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

        for (position, line) in order.line_items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_line_items (id, order_id, item_id, promotion_id, name, quantity, unit_price_cents, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(line.id)
            .bind(order.id)
            .bind(line.item_id)
            .bind(line.promotion_id)
            .bind(&line.name)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_carts_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, BoxError> {
        let result = sqlx::query("DELETE FROM orders WHERE status = $1 AND created_at < $2")
            .bind(OrderStatus::Cart.code())
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_by_affiliate(&self, affiliate_id: Uuid) -> Result<Vec<Order>, BoxError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE affiliate_id = $1 ORDER BY created_at",
            ORDER_COLUMNS
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql).bind(affiliate_id).fetch_all(&self.pool).await?;
        self.load(rows).await
    }

    async fn find_completed_in_year(&self, year: i32) -> Result<Vec<Order>, BoxError> {
        let start = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| format!("invalid year {}", year))?;
        let end = Utc
            .with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| format!("invalid year {}", year + 1))?;

        let sql = format!(
            "SELECT {} FROM orders WHERE status IN (5, 6, 7) AND created_at >= $1 AND created_at < $2 ORDER BY created_at",
            ORDER_COLUMNS
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        self.load(rows).await
    }

    async fn mark_affiliate_paid(&self, order_ids: &[Uuid], payment_id: Uuid) -> Result<(), BoxError> {
        sqlx::query("UPDATE orders SET affiliate_payment_id = $1 WHERE id = ANY($2)")
            .bind(payment_id)
            .bind(order_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

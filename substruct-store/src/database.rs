use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};
use substruct_core::preferences::split_addresses;
use substruct_core::StorePreferences;
use substruct_shared::money::parse_cents;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays the `preferences` table on the configured defaults.
    pub async fn fetch_store_preferences(&self, defaults: StorePreferences) -> Result<StorePreferences, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT name, value FROM preferences")
            .fetch_all(&self.pool)
            .await?;

        let mut prefs = defaults;
        for (name, value) in rows {
            apply_preference(&mut prefs, &name, &value);
        }
        Ok(prefs)
    }
}

fn is_true(value: &str) -> bool {
    matches!(value.trim(), "1" | "true")
}

/// Applies one stored preference. Unknown names and unparseable values are skipped.
pub fn apply_preference(prefs: &mut StorePreferences, name: &str, value: &str) {
    match name {
        "store_name" => prefs.store_name = value.to_string(),
        "cc_processor" => match value.parse() {
            Ok(processor) => prefs.cc_processor = processor,
            Err(e) => warn!("Ignoring preference: {}", e),
        },
        "cc_login" => prefs.cc_login = value.trim().to_string(),
        "cc_clear_after_order" => prefs.cc_clear_after_order = is_true(value),
        "store_use_inventory_control" => prefs.store_use_inventory_control = is_true(value),
        "store_test_transactions" => prefs.store_test_transactions = is_true(value),
        "store_handling_fee" => match parse_cents(value) {
            Ok(cents) => prefs.store_handling_fee_cents = cents,
            Err(e) => warn!("Ignoring store_handling_fee {:?}: {}", value, e),
        },
        "affiliate_revenue_percentage" => match value.trim().parse() {
            Ok(pct) => prefs.affiliate_revenue_percentage = pct,
            Err(_) => warn!("Ignoring affiliate_revenue_percentage {:?}", value),
        },
        "affiliate_paid_order_delay" => match value.trim().parse() {
            Ok(days) => prefs.affiliate_paid_order_delay_days = days,
            Err(_) => warn!("Ignoring affiliate_paid_order_delay {:?}", value),
        },
        "mail_from" => prefs.mail_from = value.trim().to_string(),
        "mail_copy_to" => prefs.mail_copy_to = split_addresses(value),
        "receipt_template" => prefs.receipt_template = Some(value.to_string()),
        _ => {}
    }
}

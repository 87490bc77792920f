use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

/// Store counters, kept in a registry owned by the app state.
pub struct Metrics {
    registry: Registry,
    pub carts_created: IntCounter,
    pub transactions: IntCounterVec,
    pub ipn_notifications: IntCounterVec,
    pub inventory_removals: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("substruct".to_string()), None)?;

        let carts_created = IntCounter::new("carts_created_total", "Carts created")?;
        let transactions = IntCounterVec::new(
            Opts::new("payment_transactions_total", "Checkout transactions by outcome"),
            &["outcome"],
        )?;
        let ipn_notifications = IntCounterVec::new(
            Opts::new("ipn_notifications_total", "PayPal notifications by outcome"),
            &["outcome"],
        )?;
        let inventory_removals = IntCounter::new(
            "inventory_removals_total",
            "Cart lines removed at checkout for lack of stock",
        )?;

        registry.register(Box::new(carts_created.clone()))?;
        registry.register(Box::new(transactions.clone()))?;
        registry.register(Box::new(ipn_notifications.clone()))?;
        registry.register(Box::new(inventory_removals.clone()))?;

        Ok(Self {
            registry,
            carts_created,
            transactions,
            ipn_notifications,
            inventory_removals,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String, AppError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::InternalServerError(format!("metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| AppError::InternalServerError(e.to_string()))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

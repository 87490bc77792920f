use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use substruct_api::{
    app,
    state::{AppState, AuthConfig, Integrations, Repositories},
    worker::start_cart_sweeper,
};
use substruct_store::{
    AuthorizeNetGateway, Config, DbClient, PaypalIpnVerifier, PostgresAffiliateRepository, PostgresItemRepository,
    PostgresMailOutbox, PostgresOrderRepository, PostgresPromotionRepository,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "substruct_api=debug,substruct_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Substruct API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let preferences = db
        .fetch_store_preferences(config.store.clone())
        .await
        .context("Failed to load store preferences")?;
    if preferences.store_test_transactions {
        tracing::warn!("Card transactions are running in test mode");
    }

    let gateway_timeout = Duration::from_secs(config.payment.timeout_seconds);
    let gateway = AuthorizeNetGateway::new(
        &config.payment.authorize_net_url,
        &preferences.cc_login,
        &config.payment.authorize_net_transaction_key,
        preferences.store_test_transactions,
        gateway_timeout,
    )?;
    let verifier = PaypalIpnVerifier::new(&config.payment.paypal_ipn_url, gateway_timeout)?;

    let repos = Repositories {
        orders: Arc::new(PostgresOrderRepository::new(db.pool.clone())),
        items: Arc::new(PostgresItemRepository::new(db.pool.clone())),
        promotions: Arc::new(PostgresPromotionRepository::new(db.pool.clone())),
        affiliates: Arc::new(PostgresAffiliateRepository::new(db.pool.clone())),
    };
    let integrations = Integrations {
        gateway: Arc::new(gateway),
        verifier: Arc::new(verifier),
        mailer: Arc::new(PostgresMailOutbox::new(db.pool.clone())),
    };
    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };

    let app_state = AppState::new(repos, integrations, preferences, auth)?;

    tokio::spawn(start_cart_sweeper(
        app_state.orders.clone(),
        Duration::from_secs(config.maintenance.cart_sweep_interval_seconds),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

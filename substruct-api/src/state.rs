use std::sync::Arc;
use std::time::Duration;
use substruct_catalog::ItemRepository;
use substruct_core::mailer::Mailer;
use substruct_core::payment::{CardGateway, IpnVerifier};
use substruct_core::StorePreferences;
use substruct_order::{AffiliateRepository, AffiliateService, IpnReconciler, OrderRepository, OrderService, PaymentOrchestrator};
use substruct_promo::PromotionRepository;

use crate::metrics::Metrics;
use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct ResiliencyState {
    pub payment_cb: Arc<CircuitBreaker>,
}

impl Default for ResiliencyState {
    fn default() -> Self {
        Self {
            payment_cb: Arc::new(CircuitBreaker::new("payment", 5, Duration::from_secs(30))),
        }
    }
}

/// Storage behind the services.
pub struct Repositories {
    pub orders: Arc<dyn OrderRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub promotions: Arc<dyn PromotionRepository>,
    pub affiliates: Arc<dyn AffiliateRepository>,
}

/// Outside systems the payment path talks to.
pub struct Integrations {
    pub gateway: Arc<dyn CardGateway>,
    pub verifier: Arc<dyn IpnVerifier>,
    pub mailer: Arc<dyn Mailer>,
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub ipn: Arc<IpnReconciler>,
    pub affiliates: Arc<AffiliateService>,
    pub items: Arc<dyn ItemRepository>,
    pub promotions: Arc<dyn PromotionRepository>,
    pub preferences: Arc<StorePreferences>,
    pub auth: AuthConfig,
    pub resiliency: ResiliencyState,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        integrations: Integrations,
        preferences: StorePreferences,
        auth: AuthConfig,
    ) -> Result<Self, prometheus::Error> {
        let orders = Arc::new(OrderService::new(
            repos.orders.clone(),
            repos.items.clone(),
            repos.promotions.clone(),
            repos.affiliates.clone(),
        ));
        let payments = Arc::new(PaymentOrchestrator::new(
            orders.clone(),
            repos.items.clone(),
            integrations.gateway,
            integrations.mailer,
            preferences.clone(),
        ));
        let ipn = Arc::new(IpnReconciler::new(
            orders.clone(),
            repos.orders.clone(),
            payments.clone(),
            integrations.verifier,
        ));
        let affiliates = Arc::new(AffiliateService::new(
            repos.affiliates,
            repos.orders,
            preferences.affiliate_revenue_percentage,
            preferences.affiliate_paid_order_delay_days,
        ));

        Ok(Self {
            orders,
            payments,
            ipn,
            affiliates,
            items: repos.items,
            promotions: repos.promotions,
            preferences: Arc::new(preferences),
            auth,
            resiliency: ResiliencyState::default(),
            metrics: Arc::new(Metrics::new()?),
        })
    }
}

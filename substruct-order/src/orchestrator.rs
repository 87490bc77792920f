use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use substruct_catalog::{inventory, ItemRepository};
use substruct_core::mailer::Mailer;
use substruct_core::payment::{CardGateway, ChargeRequest, CreditCard};
use substruct_core::{CardProcessor, StorePreferences};

use crate::mail;
use crate::manager::{OrderError, OrderService};
use crate::models::{Order, OrderStatus};

/// How a checkout transaction ended.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionOutcome {
    Paid { authorization: Option<String> },
    Failed { message: String },
    /// Payment happens at the processor; a notification will settle the order.
    AwaitingNotification { status: OrderStatus },
}

/// Runs checkout payments through the configured processor and applies the result.
pub struct PaymentOrchestrator {
    service: Arc<OrderService>,
    items: Arc<dyn ItemRepository>,
    gateway: Arc<dyn CardGateway>,
    mailer: Arc<dyn Mailer>,
    preferences: StorePreferences,
}

impl PaymentOrchestrator {
    pub fn new(
        service: Arc<OrderService>,
        items: Arc<dyn ItemRepository>,
        gateway: Arc<dyn CardGateway>,
        mailer: Arc<dyn Mailer>,
        preferences: StorePreferences,
    ) -> Self {
        Self {
            service,
            items,
            gateway,
            mailer,
            preferences,
        }
    }

    pub fn preferences(&self) -> &StorePreferences {
        &self.preferences
    }

    #[instrument(skip(self, order), fields(order_number = order.order_number))]
    pub async fn run_transaction(&self, order: &mut Order) -> Result<TransactionOutcome, OrderError> {
        if order.status.is_complete() {
            return Err(OrderError::NotEditable(order.status.name().to_string()));
        }
        if order.is_empty() {
            return Err(OrderError::NotPlaced("the cart is empty".to_string()));
        }

        match self.preferences.cc_processor {
            CardProcessor::AuthorizeNet => self.run_transaction_authorize(order).await,
            CardProcessor::PaypalIpn => self.run_transaction_paypal_ipn(order).await,
        }
    }

    /// Charges the order total synchronously. Gateway transport errors are returned
    /// with the order untouched.
    async fn run_transaction_authorize(&self, order: &mut Order) -> Result<TransactionOutcome, OrderError> {
        // The charged total must be the one that gets stored.
        self.service.save(order).await?;

        let request = {
            let (Some(billing), Some(account)) = (order.billing_address.as_ref(), order.account.as_ref()) else {
                return Err(OrderError::NotPlaced(
                    "billing address and payment account are required".to_string(),
                ));
            };

            ChargeRequest {
                order_id: order.id,
                order_number: order.order_number,
                amount_cents: order.total(),
                card: CreditCard {
                    number: account.cc_number.clone(),
                    month: account.expiration_month,
                    year: account.expiration_year,
                    first_name: billing.first_name.clone(),
                    last_name: billing.last_name.clone(),
                },
                billing: billing.to_billing_details(),
            }
        };

        let response = self.gateway.purchase(&request).await?;
        order.auth_transaction_id = response.authorization.clone();

        if response.success {
            info!("Order {} charged, transaction {:?}", order.order_number, response.authorization);
            self.cleanup_successful(order).await?;
            self.deliver_receipt(order).await;
            Ok(TransactionOutcome::Paid {
                authorization: response.authorization,
            })
        } else {
            error!("Order {} failed: {}", order.order_number, response.message);
            self.cleanup_failed(order, &response.message).await?;
            self.deliver_failed(order).await;
            Ok(TransactionOutcome::Failed {
                message: response.message,
            })
        }
    }

    /// The customer pays at PayPal; the IPN settles the order later.
    async fn run_transaction_paypal_ipn(&self, order: &mut Order) -> Result<TransactionOutcome, OrderError> {
        if order.status == OrderStatus::Cart {
            order.set_status(OrderStatus::OnHoldAwaitingPayment);
            order.add_note("The order was processed at PayPal but not yet confirmed.");
        }
        self.service.save(order).await?;

        Ok(TransactionOutcome::AwaitingNotification { status: order.status })
    }

    /// Takes stock (when inventory control is on), marks the order paid and optionally
    /// clears card data.
    pub async fn cleanup_successful(&self, order: &mut Order) -> Result<(), OrderError> {
        if self.preferences.store_use_inventory_control {
            let applied = inventory::decrement_stock(self.items.as_ref(), &order.stock_requests()).await;
            info!("Decremented stock for {} lines of order {}", applied, order.order_number);
        }

        order.set_status(OrderStatus::OrderedPaidToShip);
        order.add_note("Order completed.");

        if self.preferences.cc_clear_after_order {
            if let Some(account) = order.account.as_mut() {
                account.clear_personal_information();
            }
        }

        self.service.save_settled(order).await
    }

    pub async fn cleanup_failed(&self, order: &mut Order, message: &str) -> Result<(), OrderError> {
        order.set_status(OrderStatus::OnHoldPaymentFailed);
        order.add_note(&format!("Order failed! {}", message));
        self.service.save_settled(order).await
    }

    /// Best effort; failures are logged.
    pub async fn deliver_receipt(&self, order: &Order) {
        let email = match mail::receipt_email(order, &self.preferences) {
            Ok(email) => email,
            Err(e) => {
                error!("Receipt for order {} not sent: {}", order.order_number, e);
                return;
            }
        };

        if let Err(e) = self.mailer.deliver(email).await {
            error!("Failed to send the receipt for order {}: {}", order.order_number, e);
        }
    }

    /// Best effort; failures are logged.
    pub async fn deliver_failed(&self, order: &Order) {
        if let Err(e) = self.mailer.deliver(mail::failed_email(order, &self.preferences)).await {
            warn!("Failed to send the failure notice for order {}: {}", order.order_number, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::sync::Mutex;
    use chrono::Utc;
    use substruct_core::mailer::{MailError, OutgoingEmail};
    use substruct_core::payment::{ChargeResponse, PaymentError};

    use super::*;

    pub enum GatewayReply {
        Approve(&'static str),
        Decline(&'static str),
        Unreachable,
    }

    pub struct StubGateway {
        pub reply: GatewayReply,
        pub charged: Mutex<Vec<i64>>,
    }

    impl StubGateway {
        pub fn new(reply: GatewayReply) -> Self {
            Self { reply, charged: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl CardGateway for StubGateway {
        async fn purchase(&self, request: &ChargeRequest) -> Result<ChargeResponse, PaymentError> {
            self.charged.lock().unwrap().push(request.amount_cents);
            match self.reply {
                GatewayReply::Approve(id) => Ok(ChargeResponse {
                    success: true,
                    authorization: Some(id.to_string()),
                    message: "This transaction has been approved.".to_string(),
                    processed_at: Utc::now(),
                }),
                GatewayReply::Decline(message) => Ok(ChargeResponse {
                    success: false,
                    authorization: Some("0".to_string()),
                    message: message.to_string(),
                    processed_at: Utc::now(),
                }),
                GatewayReply::Unreachable => Err(PaymentError::Transport("connection refused".to_string())),
            }
        }
    }

    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn deliver(&self, email: OutgoingEmail) -> Result<(), MailError> {
            if email.to.is_empty() {
                return Err(MailError::NoRecipients(email.subject));
            }
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::{Datelike, Utc};
    use substruct_catalog::{InMemoryItemRepository, Item};
    use chrono::Duration;
    use substruct_promo::{Discount, InMemoryPromotionRepository, Promotion, PromotionRepository};
    use substruct_shared::Masked;

    use crate::address::Address;
    use crate::memory::{InMemoryAffiliateRepository, InMemoryOrderRepository};
    use crate::models::PaymentAccount;
    use crate::repository::OrderRepository;

    struct Fixture {
        orchestrator: PaymentOrchestrator,
        items: Arc<InMemoryItemRepository>,
        orders: Arc<InMemoryOrderRepository>,
        promotions: Arc<InMemoryPromotionRepository>,
        gateway: Arc<StubGateway>,
        mailer: Arc<RecordingMailer>,
    }

    fn prefs(processor: CardProcessor) -> StorePreferences {
        StorePreferences {
            cc_processor: processor,
            cc_clear_after_order: true,
            mail_copy_to: vec!["staff@example.com".to_string()],
            receipt_template: Some("Thanks!".to_string()),
            ..Default::default()
        }
    }

    fn fixture(reply: GatewayReply, preferences: StorePreferences) -> Fixture {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let items = Arc::new(InMemoryItemRepository::new());
        let promotions = Arc::new(InMemoryPromotionRepository::new());
        let service = Arc::new(OrderService::new(
            orders.clone(),
            items.clone(),
            promotions.clone(),
            Arc::new(InMemoryAffiliateRepository::new()),
        ));
        let gateway = Arc::new(StubGateway::new(reply));
        let mailer = Arc::new(RecordingMailer::default());
        let orchestrator = PaymentOrchestrator::new(service, items.clone(), gateway.clone(), mailer.clone(), preferences);
        Fixture { orchestrator, items, orders, promotions, gateway, mailer }
    }

    async fn placed_order(f: &Fixture, stock: i32, qty: i32) -> (Order, Item) {
        let saber = Item::new("Lightsaber", None, 2000, stock);
        f.items.save_item(&saber).await.unwrap();

        let mut order = Order::new(1001);
        order.add_product(&saber, None, qty).unwrap();
        order.shipping_cost_cents = 500;
        order.customer_email = Some(Masked::new("luke@example.com".to_string()));
        order.billing_address = Some(Address {
            first_name: "Luke".to_string(),
            last_name: "Skywalker".to_string(),
            address: "1 Moisture Farm Rd".to_string(),
            city: "Anchorhead".to_string(),
            state: "CA".to_string(),
            zip: "90210".to_string(),
            country: "United States of America".to_string(),
            telephone: "555-0000".to_string(),
        });
        order.account = Some(PaymentAccount {
            cc_number: Masked::new("4007000000027".to_string()),
            expiration_month: 1,
            expiration_year: Utc::now().year() + 1,
        });
        f.orders.save_order(&order).await.unwrap();
        (order, saber)
    }

    #[tokio::test]
    async fn test_successful_charge() {
        let f = fixture(GatewayReply::Approve("TXN-1"), prefs(CardProcessor::AuthorizeNet));
        let (mut order, saber) = placed_order(&f, 10, 3).await;

        let outcome = f.orchestrator.run_transaction(&mut order).await.unwrap();

        assert_eq!(outcome, TransactionOutcome::Paid { authorization: Some("TXN-1".to_string()) });
        assert_eq!(*f.gateway.charged.lock().unwrap(), vec![6500]);
        assert_eq!(order.status, OrderStatus::OrderedPaidToShip);
        assert_eq!(order.auth_transaction_id.as_deref(), Some("TXN-1"));
        assert_eq!(order.notes.last().unwrap().text, "Order completed.");
        assert_eq!(order.account.as_ref().unwrap().cc_number.expose(), "XXXXXXXXX0027");

        assert_eq!(f.items.get_item(saber.id).await.unwrap().unwrap().quantity, 7);
        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::OrderedPaidToShip);

        let sent = f.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["luke@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_expired_promotion_dropped_before_charge() {
        let f = fixture(GatewayReply::Approve("TXN-5"), prefs(CardProcessor::AuthorizeNet));
        let (mut order, _) = placed_order(&f, 10, 3).await;

        let today = Utc::now().date_naive();
        let mut five = Promotion::new("FIVE", "5 off", Discount::FlatAmount { amount_cents: 500 }, today, today + Duration::days(5));
        f.promotions.save_promotion(&five).await.unwrap();
        order.apply_promotion(&five, today).unwrap();
        assert_eq!(order.total(), 6000);
        f.orders.save_order(&order).await.unwrap();

        five.ends_on = today - Duration::days(1);
        f.promotions.save_promotion(&five).await.unwrap();

        f.orchestrator.run_transaction(&mut order).await.unwrap();

        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.promotion_id, None);
        assert_eq!(*f.gateway.charged.lock().unwrap(), vec![stored.total()]);
        assert_eq!(stored.total(), 6500);
    }

    #[tokio::test]
    async fn test_inventory_control_off_keeps_stock() {
        let mut p = prefs(CardProcessor::AuthorizeNet);
        p.store_use_inventory_control = false;
        let f = fixture(GatewayReply::Approve("TXN-2"), p);
        let (mut order, saber) = placed_order(&f, 10, 3).await;

        f.orchestrator.run_transaction(&mut order).await.unwrap();
        assert_eq!(f.items.get_item(saber.id).await.unwrap().unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn test_declined_charge() {
        let f = fixture(GatewayReply::Decline("The credit card has expired."), prefs(CardProcessor::AuthorizeNet));
        let (mut order, saber) = placed_order(&f, 10, 1).await;

        let outcome = f.orchestrator.run_transaction(&mut order).await.unwrap();

        assert_eq!(outcome, TransactionOutcome::Failed { message: "The credit card has expired.".to_string() });
        assert_eq!(order.status, OrderStatus::OnHoldPaymentFailed);
        assert_eq!(order.notes.last().unwrap().text, "Order failed! The credit card has expired.");
        assert_eq!(f.items.get_item(saber.id).await.unwrap().unwrap().quantity, 10);

        let sent = f.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["staff@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_error_leaves_order_unchanged() {
        let f = fixture(GatewayReply::Unreachable, prefs(CardProcessor::AuthorizeNet));
        let (mut order, _) = placed_order(&f, 10, 1).await;

        let result = f.orchestrator.run_transaction(&mut order).await;

        assert!(matches!(result, Err(OrderError::Payment(_))));
        assert_eq!(order.status, OrderStatus::Cart);
        assert!(order.notes.is_empty());
        assert!(f.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_failure_does_not_fail_payment() {
        let mut p = prefs(CardProcessor::AuthorizeNet);
        p.receipt_template = None;
        let f = fixture(GatewayReply::Approve("TXN-3"), p);
        let (mut order, _) = placed_order(&f, 10, 1).await;

        let outcome = f.orchestrator.run_transaction(&mut order).await.unwrap();
        assert!(matches!(outcome, TransactionOutcome::Paid { .. }));
        assert!(f.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unplaced_order_rejected() {
        let f = fixture(GatewayReply::Approve("TXN-4"), prefs(CardProcessor::AuthorizeNet));
        let mut order = Order::new(5);
        assert!(matches!(
            f.orchestrator.run_transaction(&mut order).await,
            Err(OrderError::NotPlaced(_))
        ));
    }

    #[tokio::test]
    async fn test_paypal_checkout_awaits_notification() {
        let f = fixture(GatewayReply::Unreachable, prefs(CardProcessor::PaypalIpn));
        let (mut order, _) = placed_order(&f, 10, 1).await;

        let outcome = f.orchestrator.run_transaction(&mut order).await.unwrap();

        assert_eq!(
            outcome,
            TransactionOutcome::AwaitingNotification { status: OrderStatus::OnHoldAwaitingPayment }
        );
        assert!(f.gateway.charged.lock().unwrap().is_empty());
        assert_eq!(
            order.notes.last().unwrap().text,
            "The order was processed at PayPal but not yet confirmed."
        );
    }
}

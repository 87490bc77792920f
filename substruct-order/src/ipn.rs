use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use substruct_core::payment::{IpnVerifier, PaymentError};
use substruct_shared::money::{format_cents, parse_cents};
use substruct_shared::Cents;

use crate::manager::{OrderError, OrderService};
use crate::models::{Order, OrderStatus};
use crate::orchestrator::PaymentOrchestrator;
use crate::repository::OrderRepository;

const FRAUD_ALERT: &str = "FRAUD ALERT -- please investigate.";

/// The fields of a PayPal Instant Payment Notification we act on.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct IpnNotification {
    pub txn_id: String,
    /// Our order number.
    pub invoice: String,
    pub mc_gross: String,
    pub payment_status: String,
    pub business: String,
    pub receiver_email: String,
    pub memo: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
}

impl IpnNotification {
    /// Reads a form-encoded notification body. Unknown fields are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut n = IpnNotification::default();
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "txn_id" => n.txn_id = value,
                "invoice" => n.invoice = value,
                "mc_gross" => n.mc_gross = value,
                "payment_status" => n.payment_status = value,
                "business" => n.business = value,
                "receiver_email" => n.receiver_email = value,
                "memo" => n.memo = Some(value),
                "address_street" => n.address_street = Some(value),
                "address_city" => n.address_city = Some(value),
                "address_state" => n.address_state = Some(value),
                "address_zip" => n.address_zip = Some(value),
                _ => {}
            }
        }
        n
    }

    pub fn is_complete(&self) -> bool {
        self.payment_status == "Completed"
    }

    pub fn order_number(&self) -> Result<i64, IpnError> {
        self.invoice
            .trim()
            .parse()
            .map_err(|_| IpnError::Malformed(format!("invoice {:?} is not an order number", self.invoice)))
    }

    /// `business`, falling back to `receiver_email`.
    pub fn merchant(&self) -> &str {
        if self.business.trim().is_empty() {
            self.receiver_email.trim()
        } else {
            self.business.trim()
        }
    }
}

/// Why a notification doesn't match its order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cause", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpnMismatch {
    NotCompleted { payment_status: String },
    Gross { expected_cents: Cents, received: String },
    Business { received: String },
    MissingTransactionId,
    DuplicateTransaction { txn_id: String },
}

impl fmt::Display for IpnMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpnMismatch::NotCompleted { payment_status } => {
                write!(f, "payment status is {:?}, not Completed", payment_status)
            }
            IpnMismatch::Gross { expected_cents, received } => write!(
                f,
                "PayPal total {} doesn't match the order total {}",
                received,
                format_cents(*expected_cents)
            ),
            IpnMismatch::Business { received } => {
                write!(f, "payment went to {:?}, not the store account", received)
            }
            IpnMismatch::MissingTransactionId => write!(f, "no transaction id"),
            IpnMismatch::DuplicateTransaction { txn_id } => {
                write!(f, "transaction {} is already recorded on another order", txn_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpnOutcome {
    /// PayPal didn't confirm it sent the notification.
    Ignored,
    Passed,
    Failed { causes: Vec<IpnMismatch> },
    /// Repeat of a notification that already paid the order.
    AlreadyProcessed,
    /// A different transaction for an order past payment. Only a note is recorded.
    OrderAlreadyPaid { txn_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum IpnError {
    #[error("Malformed notification: {0}")]
    Malformed(String),

    #[error("No order for invoice {0}")]
    UnknownInvoice(i64),

    #[error("Notification verification failed: {0}")]
    Verification(#[from] PaymentError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Settles orders paid through PayPal when their notification arrives.
pub struct IpnReconciler {
    service: Arc<OrderService>,
    orders: Arc<dyn OrderRepository>,
    orchestrator: Arc<PaymentOrchestrator>,
    verifier: Arc<dyn IpnVerifier>,
}

impl IpnReconciler {
    pub fn new(
        service: Arc<OrderService>,
        orders: Arc<dyn OrderRepository>,
        orchestrator: Arc<PaymentOrchestrator>,
        verifier: Arc<dyn IpnVerifier>,
    ) -> Self {
        Self {
            service,
            orders,
            orchestrator,
            verifier,
        }
    }

    #[instrument(skip(self, raw))]
    pub async fn handle(&self, raw: &str) -> Result<IpnOutcome, IpnError> {
        let notification = IpnNotification::parse(raw);
        let order_number = notification.order_number()?;

        let mut order = match self.service.find_by_order_number(order_number).await {
            Ok(order) => order,
            Err(OrderError::NotFound(_)) => return Err(IpnError::UnknownInvoice(order_number)),
            Err(e) => return Err(e.into()),
        };

        if !self.verifier.acknowledge(raw).await? {
            warn!("PayPal did not acknowledge the notification for order {}", order_number);
            return Ok(IpnOutcome::Ignored);
        }

        let already_paid = order.status.is_complete()
            && !notification.txn_id.is_empty()
            && order.auth_transaction_id.as_deref() == Some(notification.txn_id.as_str());
        if already_paid && notification.is_complete() {
            info!("Repeated notification {} for order {}", notification.txn_id, order_number);
            return Ok(IpnOutcome::AlreadyProcessed);
        }

        if order.status.is_complete() {
            warn!(
                "Notification {} arrived for order {} which is already {}",
                notification.txn_id,
                order_number,
                order.status.name()
            );
            order.add_note(&format!(
                "{} PayPal sent transaction {:?} for an order that is already paid.",
                FRAUD_ALERT, notification.txn_id
            ));
            self.service.save_settled(&mut order).await?;
            return Ok(IpnOutcome::OrderAlreadyPaid {
                txn_id: notification.txn_id,
            });
        }

        match self.reconcile(&mut order, &notification).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Processing the notification for order {} failed: {}", order_number, e);
                order.set_status(OrderStatus::OnHoldPaymentFailed);
                if let Err(save_err) = self.orders.save_order(&order).await {
                    error!("Could not put order {} on hold: {}", order_number, save_err);
                }
                Err(e)
            }
        }
    }

    async fn reconcile(&self, order: &mut Order, notification: &IpnNotification) -> Result<IpnOutcome, IpnError> {
        let causes = self.mismatches(order, notification).await?;
        record_customer_notes(order, notification);

        if causes.is_empty() {
            self.pass(order, &notification.txn_id).await?;
            return Ok(IpnOutcome::Passed);
        }

        for cause in &causes {
            error!("PayPal notification for order {} rejected: {}", order.order_number, cause);
        }
        self.fail(order, &causes).await?;
        Ok(IpnOutcome::Failed { causes })
    }

    async fn mismatches(&self, order: &Order, notification: &IpnNotification) -> Result<Vec<IpnMismatch>, IpnError> {
        let mut causes = Vec::new();

        if !notification.is_complete() {
            causes.push(IpnMismatch::NotCompleted {
                payment_status: notification.payment_status.clone(),
            });
        }

        let expected_cents = order.total();
        if parse_cents(&notification.mc_gross).ok() != Some(expected_cents) {
            causes.push(IpnMismatch::Gross {
                expected_cents,
                received: notification.mc_gross.clone(),
            });
        }

        if notification.merchant() != self.orchestrator.preferences().cc_login.trim() {
            causes.push(IpnMismatch::Business {
                received: notification.merchant().to_string(),
            });
        }

        let txn_id = notification.txn_id.trim();
        if txn_id.is_empty() {
            causes.push(IpnMismatch::MissingTransactionId);
        } else if self
            .orders
            .transaction_recorded_elsewhere(txn_id, order.id)
            .await
            .map_err(OrderError::from)?
        {
            causes.push(IpnMismatch::DuplicateTransaction {
                txn_id: txn_id.to_string(),
            });
        }

        Ok(causes)
    }

    async fn pass(&self, order: &mut Order, txn_id: &str) -> Result<(), IpnError> {
        order.auth_transaction_id = Some(txn_id.trim().to_string());
        order.add_note("Order paid through PayPal. Ready to ship.");
        self.orchestrator.cleanup_successful(order).await?;
        self.orchestrator.deliver_receipt(order).await;
        info!("Order {} paid through PayPal ({})", order.order_number, txn_id);
        Ok(())
    }

    async fn fail(&self, order: &mut Order, causes: &[IpnMismatch]) -> Result<(), IpnError> {
        let details: Vec<String> = causes.iter().map(ToString::to_string).collect();
        order.add_note(&format!("{} {}", FRAUD_ALERT, details.join("; ")));
        self.orchestrator.cleanup_failed(order, FRAUD_ALERT).await?;
        self.orchestrator.deliver_failed(order).await;
        Ok(())
    }
}

/// Customer remarks and a PayPal shipping street that differs from ours become notes.
fn record_customer_notes(order: &mut Order, notification: &IpnNotification) {
    if let Some(memo) = notification.memo.as_deref().filter(|m| !m.trim().is_empty()) {
        order.add_note(&format!("CUSTOMER REMARKS: {}", memo));
    }

    if let Some(street) = notification.address_street.as_deref() {
        let ours = order.shipping_address.as_ref().map(|a| a.address.as_str());
        if ours != Some(street) {
            let note = format!(
                "The shipping address supplied by PayPal doesn't match the shipping address for this order. \
                 PayPal sent: {}, {}, {} {}. Please contact the customer for clarification.",
                street,
                notification.address_city.as_deref().unwrap_or(""),
                notification.address_state.as_deref().unwrap_or(""),
                notification.address_zip.as_deref().unwrap_or("")
            );
            order.add_note(&note);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use substruct_catalog::{InMemoryItemRepository, Item, ItemRepository};
    use substruct_core::{BoxError, CardProcessor, StorePreferences};
    use substruct_promo::InMemoryPromotionRepository;
    use substruct_shared::Masked;
    use uuid::Uuid;

    use crate::address::Address;
    use crate::memory::{InMemoryAffiliateRepository, InMemoryOrderRepository};
    use crate::orchestrator::test_support::{GatewayReply, RecordingMailer, StubGateway};

    const MERCHANT: &str = "seller@example.com";

    struct StubVerifier(bool);

    #[async_trait]
    impl IpnVerifier for StubVerifier {
        async fn acknowledge(&self, _raw: &str) -> Result<bool, PaymentError> {
            Ok(self.0)
        }
    }

    struct Fixture {
        reconciler: IpnReconciler,
        orders: Arc<InMemoryOrderRepository>,
        items: Arc<InMemoryItemRepository>,
        mailer: Arc<RecordingMailer>,
    }

    fn fixture(acknowledged: bool) -> Fixture {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let items = Arc::new(InMemoryItemRepository::new());
        let service = Arc::new(OrderService::new(
            orders.clone(),
            items.clone(),
            Arc::new(InMemoryPromotionRepository::new()),
            Arc::new(InMemoryAffiliateRepository::new()),
        ));
        let mailer = Arc::new(RecordingMailer::default());
        let preferences = StorePreferences {
            cc_processor: CardProcessor::PaypalIpn,
            cc_login: MERCHANT.to_string(),
            mail_copy_to: vec!["staff@example.com".to_string()],
            receipt_template: Some("Thanks!".to_string()),
            ..Default::default()
        };
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            service.clone(),
            items.clone(),
            Arc::new(StubGateway::new(GatewayReply::Unreachable)),
            mailer.clone(),
            preferences,
        ));
        let reconciler = IpnReconciler::new(service, orders.clone(), orchestrator, Arc::new(StubVerifier(acknowledged)));
        Fixture { reconciler, orders, items, mailer }
    }

    /// Order 5150 for two items at 10.00 plus 2.50 shipping.
    async fn awaiting_order(f: &Fixture) -> (Order, Item) {
        let item = Item::new("Hoverboard", None, 1000, 5);
        f.items.save_item(&item).await.unwrap();

        let mut order = Order::new(5150);
        order.add_product(&item, None, 2).unwrap();
        order.shipping_cost_cents = 250;
        order.customer_email = Some(Masked::new("marty@example.com".to_string()));
        order.shipping_address = Some(Address {
            address: "9303 Lyon Drive".to_string(),
            ..Default::default()
        });
        order.set_status(OrderStatus::OnHoldAwaitingPayment);
        order.prepare_for_save();
        f.orders.save_order(&order).await.unwrap();
        (order, item)
    }

    fn ipn(txn_id: &str, gross: &str, business: &str) -> String {
        format!(
            "txn_id={}&invoice=5150&mc_gross={}&payment_status=Completed&business={}",
            txn_id,
            gross,
            business.replace('@', "%40")
        )
    }

    #[test]
    fn test_parse_notification() {
        let n = IpnNotification::parse("invoice=12&mc_gross=21.75&receiver_email=a%40b.com&memo=Leave+at+door&x=1");
        assert_eq!(n.order_number().unwrap(), 12);
        assert_eq!(n.mc_gross, "21.75");
        assert_eq!(n.merchant(), "a@b.com");
        assert_eq!(n.memo.as_deref(), Some("Leave at door"));
        assert!(!n.is_complete());

        assert!(IpnNotification::parse("invoice=abc").order_number().is_err());
    }

    #[tokio::test]
    async fn test_matching_notification_pays_order() {
        let f = fixture(true);
        let (order, item) = awaiting_order(&f).await;

        let outcome = f.reconciler.handle(&ipn("TXN-9", "22.50", MERCHANT)).await.unwrap();
        assert_eq!(outcome, IpnOutcome::Passed);

        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::OrderedPaidToShip);
        assert_eq!(stored.auth_transaction_id.as_deref(), Some("TXN-9"));
        assert!(stored.notes.iter().any(|n| n.text == "Order paid through PayPal. Ready to ship."));
        assert_eq!(f.items.get_item(item.id).await.unwrap().unwrap().quantity, 3);
        assert_eq!(f.mailer.sent.lock().unwrap().len(), 1);

        // A repeat changes nothing.
        let outcome = f.reconciler.handle(&ipn("TXN-9", "22.50", MERCHANT)).await.unwrap();
        assert_eq!(outcome, IpnOutcome::AlreadyProcessed);
        assert_eq!(f.items.get_item(item.id).await.unwrap().unwrap().quantity, 3);
    }

    #[tokio::test]
    async fn test_new_transaction_for_shipped_order_changes_nothing() {
        let f = fixture(true);
        let (order, item) = awaiting_order(&f).await;
        f.reconciler.handle(&ipn("TXN-20", "22.50", MERCHANT)).await.unwrap();

        let mut shipped = f.orders.get_order(order.id).await.unwrap().unwrap();
        shipped.set_status(OrderStatus::OrderedPaidShipped);
        f.orders.save_order(&shipped).await.unwrap();

        let outcome = f.reconciler.handle(&ipn("TXN-21", "22.50", MERCHANT)).await.unwrap();
        assert_eq!(outcome, IpnOutcome::OrderAlreadyPaid { txn_id: "TXN-21".to_string() });

        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::OrderedPaidShipped);
        assert_eq!(stored.auth_transaction_id.as_deref(), Some("TXN-20"));
        assert!(stored.notes.last().unwrap().text.contains("TXN-21"));
        assert_eq!(f.items.get_item(item.id).await.unwrap().unwrap().quantity, 3);
        assert_eq!(f.mailer.sent.lock().unwrap().len(), 1);
    }

    /// Delegates to the in-memory store but can't look up transactions.
    struct BrokenLookup(Arc<InMemoryOrderRepository>);

    #[async_trait]
    impl OrderRepository for BrokenLookup {
        async fn get_order(&self, id: Uuid) -> Result<Option<Order>, BoxError> {
            self.0.get_order(id).await
        }

        async fn find_by_order_number(&self, order_number: i64) -> Result<Option<Order>, BoxError> {
            self.0.find_by_order_number(order_number).await
        }

        async fn order_number_exists(&self, order_number: i64) -> Result<bool, BoxError> {
            self.0.order_number_exists(order_number).await
        }

        async fn transaction_recorded_elsewhere(&self, _transaction_id: &str, _order_id: Uuid) -> Result<bool, BoxError> {
            Err("connection reset".into())
        }

        async fn save_order(&self, order: &Order) -> Result<(), BoxError> {
            self.0.save_order(order).await
        }

        async fn delete_carts_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, BoxError> {
            self.0.delete_carts_created_before(cutoff).await
        }

        async fn find_by_affiliate(&self, affiliate_id: Uuid) -> Result<Vec<Order>, BoxError> {
            self.0.find_by_affiliate(affiliate_id).await
        }

        async fn find_completed_in_year(&self, year: i32) -> Result<Vec<Order>, BoxError> {
            self.0.find_completed_in_year(year).await
        }

        async fn mark_affiliate_paid(&self, order_ids: &[Uuid], payment_id: Uuid) -> Result<(), BoxError> {
            self.0.mark_affiliate_paid(order_ids, payment_id).await
        }
    }

    #[tokio::test]
    async fn test_storage_error_puts_order_on_hold() {
        let f = fixture(true);
        let (order, item) = awaiting_order(&f).await;
        let broken = IpnReconciler::new(
            f.reconciler.service.clone(),
            Arc::new(BrokenLookup(f.orders.clone())),
            f.reconciler.orchestrator.clone(),
            Arc::new(StubVerifier(true)),
        );

        let result = broken.handle(&ipn("TXN-30", "22.50", MERCHANT)).await;
        assert!(matches!(result, Err(IpnError::Order(OrderError::Repository(_)))));

        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::OnHoldPaymentFailed);
        assert_eq!(stored.auth_transaction_id, None);
        assert_eq!(f.items.get_item(item.id).await.unwrap().unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_mismatches_fail_order_with_causes_in_notes() {
        let f = fixture(true);
        let (order, item) = awaiting_order(&f).await;

        let outcome = f
            .reconciler
            .handle(&ipn("TXN-10", "0.01", "thief@example.com"))
            .await
            .unwrap();

        let IpnOutcome::Failed { causes } = outcome else {
            panic!("expected a failed notification");
        };
        assert_eq!(causes.len(), 2);
        assert!(matches!(causes[0], IpnMismatch::Gross { expected_cents: 2250, .. }));
        assert!(matches!(causes[1], IpnMismatch::Business { .. }));

        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status.code(), 3);
        let fraud_note = stored.notes.iter().find(|n| n.text.starts_with(FRAUD_ALERT)).unwrap();
        assert!(fraud_note.text.contains("0.01"));
        assert!(fraud_note.text.contains("thief@example.com"));
        assert_eq!(f.items.get_item(item.id).await.unwrap().unwrap().quantity, 5);
        assert_eq!(f.mailer.sent.lock().unwrap()[0].to, vec!["staff@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_transaction_reused_from_another_order() {
        let f = fixture(true);
        let (order, _) = awaiting_order(&f).await;

        let mut other = Order::new(7);
        other.auth_transaction_id = Some("TXN-OLD".to_string());
        f.orders.save_order(&other).await.unwrap();

        let outcome = f.reconciler.handle(&ipn("TXN-OLD", "22.50", MERCHANT)).await.unwrap();
        assert_eq!(
            outcome,
            IpnOutcome::Failed {
                causes: vec![IpnMismatch::DuplicateTransaction { txn_id: "TXN-OLD".to_string() }]
            }
        );
        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::OnHoldPaymentFailed);
    }

    #[tokio::test]
    async fn test_pending_payment_fails() {
        let f = fixture(true);
        awaiting_order(&f).await;
        let raw = ipn("TXN-11", "22.50", MERCHANT).replace("Completed", "Pending");

        let outcome = f.reconciler.handle(&raw).await.unwrap();
        assert!(matches!(
            outcome,
            IpnOutcome::Failed { ref causes } if causes == &vec![IpnMismatch::NotCompleted { payment_status: "Pending".to_string() }]
        ));
    }

    #[tokio::test]
    async fn test_unacknowledged_notification_ignored() {
        let f = fixture(false);
        let (order, _) = awaiting_order(&f).await;

        let outcome = f.reconciler.handle(&ipn("TXN-12", "22.50", MERCHANT)).await.unwrap();
        assert_eq!(outcome, IpnOutcome::Ignored);
        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::OnHoldAwaitingPayment);
    }

    #[tokio::test]
    async fn test_unknown_invoice() {
        let f = fixture(true);
        let result = f.reconciler.handle(&ipn("TXN-13", "22.50", MERCHANT)).await;
        assert!(matches!(result, Err(IpnError::UnknownInvoice(5150))));
    }

    #[tokio::test]
    async fn test_memo_and_address_notes() {
        let f = fixture(true);
        let (order, _) = awaiting_order(&f).await;
        let raw = format!(
            "{}&memo=Gift+wrap+please&address_street=1640+Riverside+Drive&address_city=Hill+Valley&address_state=CA&address_zip=95420",
            ipn("TXN-14", "22.50", MERCHANT)
        );

        assert_eq!(f.reconciler.handle(&raw).await.unwrap(), IpnOutcome::Passed);

        let stored = f.orders.get_order(order.id).await.unwrap().unwrap();
        assert!(stored.notes.iter().any(|n| n.text == "CUSTOMER REMARKS: Gift wrap please"));
        assert!(stored
            .notes
            .iter()
            .any(|n| n.text.contains("PayPal sent: 1640 Riverside Drive, Hill Valley, CA 95420")));
    }
}

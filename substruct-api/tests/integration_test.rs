use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use substruct_api::{
    app,
    middleware::auth::issue_admin_token,
    state::{AppState, AuthConfig, Integrations, Repositories},
};
use substruct_catalog::{InMemoryItemRepository, Item, ItemRepository};
use substruct_core::mailer::{MailError, Mailer, OutgoingEmail};
use substruct_core::payment::{CardGateway, ChargeRequest, ChargeResponse, IpnVerifier, PaymentError};
use substruct_core::preferences::CardProcessor;
use substruct_core::StorePreferences;
use substruct_order::{InMemoryAffiliateRepository, InMemoryOrderRepository};
use substruct_promo::{Discount, InMemoryPromotionRepository, Promotion};
use tower::ServiceExt;

struct StubGateway {
    approve: bool,
}

#[async_trait]
impl CardGateway for StubGateway {
    async fn purchase(&self, _request: &ChargeRequest) -> Result<ChargeResponse, PaymentError> {
        Ok(ChargeResponse {
            success: self.approve,
            authorization: self.approve.then(|| "AUTH-1".to_string()),
            message: if self.approve {
                "This transaction has been approved.".to_string()
            } else {
                "This transaction has been declined.".to_string()
            },
            processed_at: Utc::now(),
        })
    }
}

struct StubVerifier;

#[async_trait]
impl IpnVerifier for StubVerifier {
    async fn acknowledge(&self, _raw_notification: &str) -> Result<bool, PaymentError> {
        Ok(true)
    }
}

struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn deliver(&self, _email: OutgoingEmail) -> Result<(), MailError> {
        Ok(())
    }
}

const MERCHANT: &str = "merchant@store.test";

struct TestApp {
    router: Router,
    state: AppState,
    widget: Item,
    scarce: Item,
}

fn setup(preferences: StorePreferences, approve: bool) -> TestApp {
    let widget = Item::new("Widget", Some("WIDGET"), 1500, 10);
    let scarce = Item::new("Rare Print", Some("PRINT"), 5000, 1);
    let today = Utc::now().date_naive();
    let promotion = Promotion::new(
        "SAVE5",
        "Five dollars off",
        Discount::FlatAmount { amount_cents: 500 },
        today - Duration::days(1),
        today + Duration::days(1),
    );

    let repos = Repositories {
        orders: Arc::new(InMemoryOrderRepository::new()),
        items: Arc::new(InMemoryItemRepository::with_items(vec![widget.clone(), scarce.clone()])),
        promotions: Arc::new(InMemoryPromotionRepository::with_promotions(vec![promotion])),
        affiliates: Arc::new(InMemoryAffiliateRepository::new()),
    };
    let integrations = Integrations {
        gateway: Arc::new(StubGateway { approve }),
        verifier: Arc::new(StubVerifier),
        mailer: Arc::new(NullMailer),
    };
    let auth = AuthConfig {
        secret: "integration-secret".to_string(),
        expiration: 3600,
    };

    let state = AppState::new(repos, integrations, preferences, auth).unwrap();
    TestApp {
        router: app(state.clone()),
        state,
        widget,
        scarce,
    }
}

fn card_store() -> StorePreferences {
    StorePreferences {
        cc_login: "api-login".to_string(),
        ..StorePreferences::default()
    }
}

fn paypal_store() -> StorePreferences {
    StorePreferences {
        cc_processor: CardProcessor::PaypalIpn,
        cc_login: MERCHANT.to_string(),
        ..StorePreferences::default()
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn new_cart(router: &Router) -> String {
    let (status, cart) = send(router, Method::POST, "/store/cart", None, None).await;
    assert_eq!(status, StatusCode::CREATED);
    cart["id"].as_str().unwrap().to_string()
}

fn checkout_details() -> Value {
    json!({
        "customer_email": "buyer@example.com",
        "billing_address": {
            "first_name": "Ada",
            "last_name": "Lovelace",
            "address": "12 Analytical Way",
            "city": "Portland",
            "state": "OR",
            "zip": "97201",
            "country": "US",
            "telephone": "503-555-0100"
        },
        "account": {
            "cc_number": "4007000000027",
            "expiration_month": 12,
            "expiration_year": 2099
        }
    })
}

#[tokio::test]
async fn test_cart_and_promotion_flow() {
    let t = setup(card_store(), true);
    let cart_id = new_cart(&t.router).await;

    let (status, cart) = send(
        &t.router,
        Method::POST,
        &format!("/store/cart/{}/items", cart_id),
        Some(json!({ "item_id": t.widget.id, "quantity": 2 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["total_cents"], 3000);

    let (status, applied) = send(
        &t.router,
        Method::POST,
        &format!("/store/cart/{}/promotion", cart_id),
        Some(json!({ "code": "SAVE5" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applied["result"]["result"], "APPLIED");
    assert_eq!(applied["order"]["total_cents"], 2500);

    let (status, _) = send(
        &t.router,
        Method::POST,
        &format!("/store/cart/{}/promotion", cart_id),
        Some(json!({ "code": "NOPE" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cart) = send(
        &t.router,
        Method::DELETE,
        &format!("/store/cart/{}/items/{}?quantity=1", cart_id, t.widget.id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["line_items_total_cents"], 1000);
}

#[tokio::test]
async fn test_checkout_and_card_payment() {
    let t = setup(card_store(), true);
    let cart_id = new_cart(&t.router).await;
    send(
        &t.router,
        Method::POST,
        &format!("/store/cart/{}/items", cart_id),
        Some(json!({ "item_id": t.widget.id, "quantity": 2 })),
        None,
    )
    .await;

    let (status, order) = send(
        &t.router,
        Method::POST,
        &format!("/store/checkout/{}", cart_id),
        Some(checkout_details()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["card_number"], "XXXXXXXXX0027");

    let (status, paid) = send(&t.router, Method::POST, &format!("/store/checkout/{}/pay", cart_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["result"]["result"], "PAID");
    assert_eq!(paid["order"]["status_code"], 5);

    let widget = t.state.items.get_item(t.widget.id).await.unwrap().unwrap();
    assert_eq!(widget.quantity, 8);

    // A completed order can't be charged twice.
    let (status, _) = send(&t.router, Method::POST, &format!("/store/checkout/{}/pay", cart_id), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_declined_card_puts_order_on_hold() {
    let t = setup(card_store(), false);
    let cart_id = new_cart(&t.router).await;
    send(
        &t.router,
        Method::POST,
        &format!("/store/cart/{}/items", cart_id),
        Some(json!({ "item_id": t.widget.id, "quantity": 1 })),
        None,
    )
    .await;
    send(
        &t.router,
        Method::POST,
        &format!("/store/checkout/{}", cart_id),
        Some(checkout_details()),
        None,
    )
    .await;

    let (status, failed) = send(&t.router, Method::POST, &format!("/store/checkout/{}/pay", cart_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(failed["result"]["result"], "FAILED");
    assert_eq!(failed["order"]["status_code"], 3);
}

#[tokio::test]
async fn test_checkout_drops_lines_without_stock() {
    let t = setup(card_store(), true);
    let cart_id = new_cart(&t.router).await;
    for (item_id, quantity) in [(t.widget.id, 1), (t.scarce.id, 3)] {
        send(
            &t.router,
            Method::POST,
            &format!("/store/cart/{}/items", cart_id),
            Some(json!({ "item_id": item_id, "quantity": quantity })),
            None,
        )
        .await;
    }

    let (status, body) = send(
        &t.router,
        Method::POST,
        &format!("/store/checkout/{}", cart_id),
        Some(checkout_details()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["removed_items"].as_array().unwrap().len(), 1);
    assert!(body["order"]["customer_email"].is_null());
}

#[tokio::test]
async fn test_empty_cart_cannot_be_paid() {
    let t = setup(card_store(), true);
    let cart_id = new_cart(&t.router).await;

    let (status, _) = send(&t.router, Method::POST, &format!("/store/checkout/{}/pay", cart_id), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_paypal_notification_settles_order() {
    let t = setup(paypal_store(), true);
    let cart_id = new_cart(&t.router).await;
    send(
        &t.router,
        Method::POST,
        &format!("/store/cart/{}/items", cart_id),
        Some(json!({ "item_id": t.widget.id, "quantity": 1 })),
        None,
    )
    .await;
    send(
        &t.router,
        Method::POST,
        &format!("/store/checkout/{}", cart_id),
        Some(checkout_details()),
        None,
    )
    .await;

    let (status, pending) = send(&t.router, Method::POST, &format!("/store/checkout/{}/pay", cart_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["result"]["result"], "AWAITING_NOTIFICATION");
    let order_number = pending["order"]["order_number"].as_i64().unwrap();

    let ipn = format!(
        "txn_id=9XY123&invoice={}&mc_gross=15.00&payment_status=Completed&business=merchant%40store.test",
        order_number
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/store/paypal/ipn")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(ipn))
        .unwrap();
    let response = t.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let outcome: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(outcome["result"], "PASSED");

    let order = t.state.orders.get_order(cart_id.parse().unwrap()).await.unwrap();
    assert_eq!(order.status.code(), 5);
    assert_eq!(order.auth_transaction_id.as_deref(), Some("9XY123"));
}

#[tokio::test]
async fn test_admin_routes_require_admin_token() {
    let t = setup(card_store(), true);

    let (status, _) = send(&t.router, Method::GET, "/admin/promotions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = issue_admin_token(&t.state.auth, "ops").unwrap();
    let (status, promotions) = send(&t.router, Method::GET, "/admin/promotions", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promotions.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &t.router,
        Method::POST,
        "/admin/promotions",
        Some(json!({
            "code": "SAVE5",
            "description": "Duplicate",
            "discount": { "type": "PERCENT", "percent": 10.0 },
            "minimum_cart_value_cents": null,
            "starts_on": "2020-01-01",
            "ends_on": "2030-01-01"
        })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_admin_order_notes_and_status() {
    let t = setup(card_store(), true);
    let token = issue_admin_token(&t.state.auth, "ops").unwrap();
    let cart_id = new_cart(&t.router).await;

    let (status, order) = send(
        &t.router,
        Method::POST,
        &format!("/admin/orders/{}/notes", cart_id),
        Some(json!({ "text": "Customer called about gift wrap" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["notes"][0]["text"], "Customer called about gift wrap");

    // Customers never see notes.
    let (_, cart) = send(&t.router, Method::GET, &format!("/store/cart/{}", cart_id), None, None).await;
    assert!(cart.get("notes").is_none());

    let (status, _) = send(
        &t.router,
        Method::PUT,
        &format!("/admin/orders/{}/status", cart_id),
        Some(json!({ "status": "ORDERED_PAID_SHIPPED" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_affiliate_login_and_earnings() {
    let t = setup(card_store(), true);
    let admin = issue_admin_token(&t.state.auth, "ops").unwrap();

    let (status, _) = send(
        &t.router,
        Method::POST,
        "/admin/affiliates",
        Some(json!({ "code": "PARTNER1", "email_address": "partner@example.com" })),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &t.router,
        Method::POST,
        "/affiliates/login",
        Some(json!({ "email": "partner@example.com", "code": "WRONG" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = send(
        &t.router,
        Method::POST,
        "/affiliates/login",
        Some(json!({ "email": "partner@example.com", "code": "PARTNER1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap().to_string();

    let (status, earnings) = send(&t.router, Method::GET, "/affiliates/me/earnings", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(earnings["total_owed_cents"], 0);

    // Affiliate tokens don't open admin routes.
    let (status, _) = send(&t.router, Method::GET, "/admin/promotions", None, Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_metrics_endpoint_counts_carts() {
    let t = setup(card_store(), true);
    new_cart(&t.router).await;

    let (status, body) = send(&t.router, Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("substruct_carts_created_total 1"));
}

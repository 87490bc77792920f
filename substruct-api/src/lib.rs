use axum::{
    http::Method,
    middleware::from_fn_with_state,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod orders;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

use middleware::{admin_auth_middleware, resiliency::circuit_breaker_middleware};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let admin = admin::routes().route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .merge(cart::routes())
        .merge(checkout::routes())
        .merge(webhooks::routes())
        .merge(auth::routes(state.clone()))
        .merge(metrics::routes())
        .merge(admin)
        .layer(from_fn_with_state(state.clone(), circuit_breaker_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

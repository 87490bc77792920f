pub mod auth;
pub mod resiliency;

pub use auth::{admin_auth_middleware, affiliate_auth_middleware, AdminClaims, AffiliateClaims};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use substruct_catalog::ProductError;
use substruct_order::{AffiliateError, IpnError, OrderError};
use substruct_promo::PromotionError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UnprocessableError(String),
    GatewayError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnprocessableError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::GatewayError(msg) => {
                tracing::warn!("Upstream payment error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let msg = err.to_string();
        match err {
            OrderError::NotFound(_) | OrderError::ItemNotFound(_) | OrderError::PromotionNotFound(_) => {
                AppError::NotFoundError(msg)
            }
            OrderError::InvalidTransition { .. } | OrderError::NotEditable(_) | OrderError::NotPlaced(_) => {
                AppError::ConflictError(msg)
            }
            OrderError::Ineligible(_) | OrderError::InvalidAddress(_) | OrderError::InvalidCheckout(_) => {
                AppError::UnprocessableError(msg)
            }
            OrderError::InvalidQuantity(_) => AppError::ValidationError(msg),
            OrderError::Payment(_) => AppError::GatewayError(msg),
            OrderError::Inventory(_) | OrderError::Repository(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<IpnError> for AppError {
    fn from(err: IpnError) -> Self {
        match err {
            IpnError::Malformed(msg) => AppError::ValidationError(msg),
            IpnError::UnknownInvoice(number) => AppError::NotFoundError(format!("No order for invoice {}", number)),
            IpnError::Verification(e) => AppError::GatewayError(e.to_string()),
            IpnError::Order(e) => e.into(),
        }
    }
}

impl From<AffiliateError> for AppError {
    fn from(err: AffiliateError) -> Self {
        let msg = err.to_string();
        match err {
            AffiliateError::NotFound(_) => AppError::NotFoundError(msg),
            AffiliateError::Invalid(_) => AppError::UnprocessableError(msg),
            AffiliateError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<PromotionError> for AppError {
    fn from(err: PromotionError) -> Self {
        let msg = err.to_string();
        match err {
            PromotionError::NotFound(_) => AppError::NotFoundError(msg),
            PromotionError::Invalid(_) | PromotionError::Ineligible(_) => AppError::UnprocessableError(msg),
            PromotionError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<ProductError> for AppError {
    fn from(err: ProductError) -> Self {
        let msg = err.to_string();
        match err {
            ProductError::NotFound(_) => AppError::NotFoundError(msg),
            ProductError::Invalid(_) => AppError::UnprocessableError(msg),
        }
    }
}

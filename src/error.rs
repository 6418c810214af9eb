use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bigdecimal::BigDecimal;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Amount mismatch: expected {expected}, paid {paid}")]
    AmountMismatch { expected: BigDecimal, paid: BigDecimal },

    #[error("Order {0} has no gateway trade number")]
    MissingTradeNo(String),

    #[error("Payment gateway is not configured")]
    MissingGatewayConfig,

    #[error("Order {order_id} is {status} and cannot be refunded")]
    NotRefundable { order_id: String, status: String },

    #[error("Invalid payment notification: {0}")]
    InvalidNotification(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Stable error kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::OrderNotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::AmountMismatch { .. }
            | AppError::MissingTradeNo(_)
            | AppError::MissingGatewayConfig
            | AppError::NotRefundable { .. }
            | AppError::InvalidNotification(_) => "validation",
            AppError::Transport(_) => "transport",
            AppError::Database(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "validation" => StatusCode::BAD_REQUEST,
            "transport" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

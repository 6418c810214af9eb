use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::queries;
use crate::error::AppError;
use crate::gateway::{GatewayError, PaymentGateway, RefundRequest, RefundVerdict};
use crate::middleware::auth::AdminAuthorizer;
use crate::services::compensation::CompensationService;

/// Longest gateway diagnostic echoed back to the caller, in characters.
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub ok: bool,
    /// True once the gateway accepted and the order was compensated.
    pub processed: bool,
    pub message: String,
}

#[derive(Clone)]
pub struct RefundService {
    pool: PgPool,
    gateway: Option<Arc<dyn PaymentGateway>>,
    compensation: CompensationService,
}

impl RefundService {
    pub fn new(
        pool: PgPool,
        gateway: Option<Arc<dyn PaymentGateway>>,
        compensation: CompensationService,
    ) -> Self {
        Self {
            pool,
            gateway,
            compensation,
        }
    }

    /// Circuit state of the refund gateway, or "not_configured".
    pub fn gateway_state(&self) -> &'static str {
        self.gateway
            .as_ref()
            .map(|gateway| gateway.circuit_state())
            .unwrap_or("not_configured")
    }

    /// Asks the payment processor to refund `order_id` and compensates the
    /// order when it agrees. A refusal is not an error: it comes back as
    /// `processed: false` with the processor's reply.
    pub async fn initiate_refund(
        &self,
        auth: &dyn AdminAuthorizer,
        order_id: &str,
    ) -> Result<RefundOutcome, AppError> {
        if !auth.is_authorized_admin() {
            return Err(AppError::Unauthorized(
                "admin capability required".to_string(),
            ));
        }

        let order = queries::get_order(&self.pool, order_id)
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        let trade_no = order
            .trade_no
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::MissingTradeNo(order_id.to_string()))?;

        let gateway = self.gateway.as_ref().ok_or(AppError::MissingGatewayConfig)?;

        if !order.status.is_refundable() {
            return Err(AppError::NotRefundable {
                order_id: order_id.to_string(),
                status: order.status.as_str().to_string(),
            });
        }

        let request = RefundRequest {
            order_id: order.order_id,
            trade_no,
            amount: order.amount,
        };

        let verdict = gateway.refund(&request).await.map_err(|e| {
            warn!(order_id, error = %e, "Refund request to gateway failed");
            match e {
                GatewayError::Status { status, body } => AppError::Transport(format!(
                    "gateway responded with status {}: {}",
                    status,
                    truncate_chars(&body, MAX_DIAGNOSTIC_CHARS)
                )),
                other => AppError::Transport(other.to_string()),
            }
        })?;

        match verdict {
            RefundVerdict::Accepted => {
                self.compensation.compensate(order_id).await?;
                info!(order_id, "Refund accepted by gateway");
                Ok(RefundOutcome {
                    ok: true,
                    processed: true,
                    message: "Refund accepted by gateway".to_string(),
                })
            }
            RefundVerdict::Declined { body } => {
                info!(order_id, "Gateway has not processed the refund");
                Ok(RefundOutcome {
                    ok: true,
                    processed: false,
                    message: truncate_chars(&body, MAX_DIAGNOSTIC_CHARS),
                })
            }
        }
    }
}

/// Cuts `text` to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_chars("declined", 500), "declined");
    }

    #[test]
    fn test_truncate_long_text() {
        let body = "x".repeat(800);
        assert_eq!(truncate_chars(&body, MAX_DIAGNOSTIC_CHARS).len(), 500);
    }

    #[test]
    fn test_truncate_respects_multibyte_chars() {
        let body = "退款失败".repeat(200);
        let cut = truncate_chars(&body, MAX_DIAGNOSTIC_CHARS);
        assert_eq!(cut.chars().count(), 500);
        assert!(body.starts_with(&cut));
    }
}

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{Order, OrderStatus};
use crate::db::queries;
use crate::error::AppError;
use crate::handlers::auth::VerifiedNotification;
use crate::AppState;

/// Payment confirmation forwarded by the checkout flow.
#[derive(Debug, Deserialize, Serialize)]
pub struct PaymentNotification {
    pub order_id: String,
    pub amount: BigDecimal,
    pub trade_no: String,
}

/// What anyone holding an order id may see. The card key is only handed
/// out through the delivery channel.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order_id: String,
    pub product_id: String,
    pub amount: BigDecimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id,
            product_id: order.product_id,
            amount: order.amount,
            status: order.status,
            created_at: order.created_at,
            paid_at: order.paid_at,
            delivered_at: order.delivered_at,
        }
    }
}

pub async fn notify(
    State(state): State<AppState>,
    notification: VerifiedNotification,
) -> Result<impl IntoResponse, AppError> {
    let payload: PaymentNotification = serde_json::from_slice(&notification.body)
        .map_err(|e| AppError::InvalidNotification(e.to_string()))?;

    let outcome = state
        .fulfillment
        .fulfill(&payload.order_id, &payload.amount, &payload.trade_no)
        .await?;

    Ok(Json(outcome))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let order = queries::get_order(&state.db, &order_id)
        .await?
        .ok_or_else(|| AppError::OrderNotFound(order_id.clone()))?;

    Ok(Json(OrderView::from(order)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_view_hides_secrets() {
        let order = Order {
            order_id: "ord-1".to_string(),
            product_id: "prod-a".to_string(),
            amount: "9.99".parse().unwrap(),
            status: OrderStatus::Delivered,
            trade_no: Some("T-1".to_string()),
            card_key: Some("KEY-SECRET".to_string()),
            user_id: Some(7),
            points_used: 0,
            created_at: Utc::now(),
            paid_at: Some(Utc::now()),
            delivered_at: Some(Utc::now()),
        };

        let json = serde_json::to_value(OrderView::from(order)).unwrap();

        assert_eq!(json["status"], "delivered");
        assert!(json.get("card_key").is_none());
        assert!(json.get("trade_no").is_none());
        assert!(!json.to_string().contains("KEY-SECRET"));
    }
}

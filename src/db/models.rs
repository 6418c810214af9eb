use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::BigDecimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Only unpaid orders may be settled by a payment notification. Every
    /// other status means the notification was already handled.
    pub fn accepts_payment(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Cancelled)
    }

    /// Refunds reverse a payment, so only paid or delivered orders qualify.
    pub fn is_refundable(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Delivered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub order_id: String,
    pub product_id: String,
    pub amount: BigDecimal,
    pub status: OrderStatus,
    pub trade_no: Option<String>,
    pub card_key: Option<String>,
    pub user_id: Option<i64>,
    pub points_used: i64,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// The card handed to an order by a successful claim.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct ClaimedCard {
    pub id: i64,
    pub card_key: String,
}

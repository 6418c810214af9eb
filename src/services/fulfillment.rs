//! Settles paid orders by claiming one unused card for them.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Acquire, PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::{info, warn};

use crate::config::FulfillmentPolicy;
use crate::db::cards::{self, ClaimStrategy};
use crate::db::models::{ClaimedCard, Order, OrderStatus};
use crate::db::schema::SchemaCapabilities;
use crate::db::{has_sqlstate, queries, UNDEFINED_COLUMN};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Processed,
    AlreadyProcessed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FulfillmentOutcome {
    pub success: bool,
    pub status: FulfillmentStatus,
    /// Status of the order once the call returns.
    pub order_status: OrderStatus,
}

#[derive(Clone)]
pub struct FulfillmentService {
    pool: PgPool,
    capabilities: SchemaCapabilities,
    policy: FulfillmentPolicy,
}

impl FulfillmentService {
    pub fn new(pool: PgPool, capabilities: SchemaCapabilities, policy: FulfillmentPolicy) -> Self {
        Self {
            pool,
            capabilities,
            policy,
        }
    }

    /// Applies a payment notification to `order_id`.
    ///
    /// The order row stays locked from the status check to the final update,
    /// so duplicate notifications racing each other settle the order once and
    /// the rest report `AlreadyProcessed`. Any error rolls back the card claim
    /// together with the order update.
    pub async fn fulfill(
        &self,
        order_id: &str,
        paid_amount: &BigDecimal,
        trade_no: &str,
    ) -> Result<FulfillmentOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let order = queries::lock_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if !amounts_match(&order.amount, paid_amount, &self.policy.amount_epsilon) {
            warn!(order_id, expected = %order.amount, paid = %paid_amount, "Paid amount does not match order");
            return Err(AppError::AmountMismatch {
                expected: order.amount,
                paid: paid_amount.clone(),
            });
        }

        if !order.status.accepts_payment() {
            tx.rollback().await?;
            info!(order_id, status = order.status.as_str(), "Payment notification already processed");
            return Ok(FulfillmentOutcome {
                success: true,
                status: FulfillmentStatus::AlreadyProcessed,
                order_status: order.status,
            });
        }

        let now = Utc::now();
        let order_status = match self.claim_card(&mut tx, &order, now).await? {
            Some(card) => {
                queries::mark_delivered(&mut tx, order_id, trade_no, &card.card_key, now).await?;
                info!(order_id, card_id = card.id, product_id = %order.product_id, "Order delivered");
                OrderStatus::Delivered
            }
            None => {
                queries::mark_paid_unfulfilled(&mut tx, order_id, trade_no, now).await?;
                warn!(order_id, product_id = %order.product_id, "No card in stock, order left paid");
                OrderStatus::Paid
            }
        };

        tx.commit().await?;

        Ok(FulfillmentOutcome {
            success: true,
            status: FulfillmentStatus::Processed,
            order_status,
        })
    }

    async fn claim_card(
        &self,
        tx: &mut SqlxTransaction<'_, Postgres>,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedCard>, sqlx::Error> {
        let strategy = ClaimStrategy::for_schema(self.capabilities.supports_reservations());

        if strategy == ClaimStrategy::ReservationAware {
            let stale_before = now - self.policy.reservation_freshness;
            match claim_with_reservations(tx, order, stale_before, now).await {
                Ok(claimed) => return Ok(claimed),
                Err(e) if has_sqlstate(&e, UNDEFINED_COLUMN) => {
                    if self.capabilities.downgrade_reservations() {
                        warn!(error = %e, "Reservation columns missing, falling back to legacy claims");
                    }
                }
                Err(e) => return Err(e),
            }
        }

        cards::claim_available_legacy(tx, &order.product_id, now).await
    }
}

/// Tries the card reserved for this order, then any unreserved or stale one.
/// Runs under a savepoint so a schema mismatch leaves the outer transaction usable.
async fn claim_with_reservations(
    tx: &mut SqlxTransaction<'_, Postgres>,
    order: &Order,
    stale_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<ClaimedCard>, sqlx::Error> {
    let mut savepoint = (&mut *tx).begin().await?;

    let claimed = match cards::claim_reserved(&mut savepoint, &order.order_id, now).await {
        Ok(Some(card)) => Ok(Some(card)),
        Ok(None) => cards::claim_available(&mut savepoint, &order.product_id, stale_before, now).await,
        Err(e) => Err(e),
    };

    match claimed {
        Ok(card) => {
            savepoint.commit().await?;
            Ok(card)
        }
        Err(e) => {
            savepoint.rollback().await?;
            Err(e)
        }
    }
}

/// True when the two amounts differ by strictly less than `epsilon`. A full
/// cent off, such as 10.00 against 9.99, is a mismatch.
pub fn amounts_match(expected: &BigDecimal, paid: &BigDecimal, epsilon: &BigDecimal) -> bool {
    (expected - paid).abs() < *epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_amounts_within_epsilon_match() {
        let epsilon = FulfillmentPolicy::default().amount_epsilon;
        assert!(amounts_match(&dec("9.99"), &dec("9.99"), &epsilon));
        assert!(amounts_match(&dec("9.99"), &dec("9.995"), &epsilon));
        assert!(amounts_match(&dec("9.99"), &dec("9.9901"), &epsilon));
    }

    #[test]
    fn test_amounts_beyond_epsilon_mismatch() {
        let epsilon = FulfillmentPolicy::default().amount_epsilon;
        assert!(!amounts_match(&dec("9.99"), &dec("10.00"), &epsilon));
        assert!(!amounts_match(&dec("9.99"), &dec("10.01"), &epsilon));
        assert!(!amounts_match(&dec("9.99"), &dec("0.01"), &epsilon));
        assert!(!amounts_match(&dec("9.99"), &dec("9.97"), &epsilon));
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let outcome = FulfillmentOutcome {
            success: true,
            status: FulfillmentStatus::AlreadyProcessed,
            order_status: OrderStatus::Delivered,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "already_processed");
        assert_eq!(json["order_status"], "delivered");
    }
}

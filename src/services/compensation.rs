//! Reverses a fulfilled order on refund.
//!
//! The points credit and the status change are mandatory and commit or fail
//! together. Returning the card and closing the refund request are optional
//! steps: each runs under its own savepoint, and a failure is rolled back to
//! that savepoint, logged and reported without aborting the refund.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Acquire, PgPool, Postgres, Transaction as SqlxTransaction};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{refund_views, InvalidationSink};
use crate::db::models::Order;
use crate::db::{cards, has_sqlstate, queries, UNDEFINED_TABLE};
use crate::error::AppError;

/// Result of one optional compensation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    /// Nothing to do: no card on the order, no matching row, or no table.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CompensationReport {
    pub success: bool,
    pub points_credited: i64,
    pub card_returned: StepOutcome,
    pub refund_request: StepOutcome,
}

#[derive(Clone)]
pub struct CompensationService {
    pool: PgPool,
    invalidation: Arc<dyn InvalidationSink>,
}

impl CompensationService {
    pub fn new(pool: PgPool, invalidation: Arc<dyn InvalidationSink>) -> Self {
        Self { pool, invalidation }
    }

    /// Refunds a paid or delivered `order_id` in one transaction. Any other
    /// status is rejected before anything is written.
    pub async fn compensate(&self, order_id: &str) -> Result<CompensationReport, AppError> {
        let mut tx = self.pool.begin().await?;

        let order = queries::lock_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if !order.status.is_refundable() {
            tx.rollback().await?;
            return Err(AppError::NotRefundable {
                order_id: order_id.to_string(),
                status: order.status.as_str().to_string(),
            });
        }

        let points_credited = credit_points(&mut tx, &order).await?;
        queries::mark_refunded(&mut tx, order_id).await?;

        let now = Utc::now();
        let card_returned = return_card(&mut tx, &order).await?;
        let refund_request = close_refund_request(&mut tx, order_id, now).await?;

        tx.commit().await?;

        info!(
            order_id,
            had_card = order.card_key.is_some(),
            points_credited,
            card_returned = ?card_returned,
            refund_request = ?refund_request,
            "Order refunded"
        );

        self.invalidation.invalidate(refund_views(order_id));

        Ok(CompensationReport {
            success: true,
            points_credited,
            card_returned,
            refund_request,
        })
    }
}

async fn credit_points(
    tx: &mut SqlxTransaction<'_, Postgres>,
    order: &Order,
) -> Result<i64, sqlx::Error> {
    let user_id = match order.user_id {
        Some(user_id) if order.points_used > 0 => user_id,
        _ => return Ok(0),
    };

    let updated = queries::credit_user_points(tx, user_id, order.points_used).await?;
    if updated == 0 {
        warn!(order_id = %order.order_id, user_id, "User missing, points not credited");
        return Ok(0);
    }
    Ok(order.points_used)
}

async fn return_card(
    tx: &mut SqlxTransaction<'_, Postgres>,
    order: &Order,
) -> Result<StepOutcome, sqlx::Error> {
    let Some(card_key) = order.card_key.as_deref() else {
        return Ok(StepOutcome::Skipped);
    };

    let mut savepoint = (&mut *tx).begin().await?;
    let result = cards::return_to_stock(&mut savepoint, &order.product_id, card_key).await;
    settle_step(savepoint, "card_return", &order.order_id, result).await
}

async fn close_refund_request(
    tx: &mut SqlxTransaction<'_, Postgres>,
    order_id: &str,
    now: DateTime<Utc>,
) -> Result<StepOutcome, sqlx::Error> {
    let mut savepoint = (&mut *tx).begin().await?;
    let result = queries::mark_refund_request_processed(&mut savepoint, order_id, now).await;
    settle_step(savepoint, "refund_request", order_id, result).await
}

/// Releases the savepoint on success, rolls back to it on failure. Only a
/// failure of the savepoint commands themselves is returned as an error.
async fn settle_step(
    savepoint: SqlxTransaction<'_, Postgres>,
    step: &'static str,
    order_id: &str,
    result: Result<u64, sqlx::Error>,
) -> Result<StepOutcome, sqlx::Error> {
    match result {
        Ok(0) => {
            savepoint.commit().await?;
            debug!(order_id, step, "Compensation step matched no rows");
            Ok(StepOutcome::Skipped)
        }
        Ok(_) => {
            savepoint.commit().await?;
            Ok(StepOutcome::Applied)
        }
        Err(e) if has_sqlstate(&e, UNDEFINED_TABLE) => {
            savepoint.rollback().await?;
            debug!(order_id, step, "Compensation step table not deployed");
            Ok(StepOutcome::Skipped)
        }
        Err(e) => {
            savepoint.rollback().await?;
            warn!(order_id, step, error = %e, "Best-effort compensation step failed");
            Ok(StepOutcome::Failed {
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_outcome_serialization() {
        let applied = serde_json::to_value(StepOutcome::Applied).unwrap();
        assert_eq!(applied["outcome"], "applied");

        let failed = serde_json::to_value(StepOutcome::Failed {
            reason: "deadlock detected".to_string(),
        })
        .unwrap();
        assert_eq!(failed["outcome"], "failed");
        assert_eq!(failed["reason"], "deadlock detected");
    }
}

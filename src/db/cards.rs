//! Card inventory queries.
//!
//! Every claim flips exactly one row from `is_used = FALSE` to `TRUE` in a
//! single `UPDATE`, choosing the row with `FOR UPDATE SKIP LOCKED`: a row
//! locked by a concurrent claimer is passed over instead of waited on, so two
//! claimers never pick the same card and never queue behind each other.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Result, Transaction as SqlxTransaction};

use crate::db::models::ClaimedCard;

/// How eligible cards are selected, depending on the deployed schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStrategy {
    /// Honors pins from `reserved_order_id` / `reserved_at`.
    ReservationAware,
    /// Only `is_used` decides availability.
    Legacy,
}

impl ClaimStrategy {
    pub fn for_schema(reservations: bool) -> Self {
        if reservations {
            ClaimStrategy::ReservationAware
        } else {
            ClaimStrategy::Legacy
        }
    }
}

/// Claims the card pinned to `order_id` by an earlier reservation, if any.
pub async fn claim_reserved(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<ClaimedCard>> {
    sqlx::query_as::<_, ClaimedCard>(
        r#"
        UPDATE cards
        SET is_used = TRUE, used_at = $2, reserved_order_id = NULL, reserved_at = NULL
        WHERE id = (
            SELECT id FROM cards
            WHERE reserved_order_id = $1 AND is_used = FALSE
            ORDER BY id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND is_used = FALSE
        RETURNING id, card_key
        "#,
    )
    .bind(order_id)
    .bind(now)
    .fetch_optional(&mut **executor)
    .await
}

/// Claims any unused card of `product_id` that is not freshly reserved.
/// Reservations taken before `stale_before` no longer protect their card.
pub async fn claim_available(
    executor: &mut SqlxTransaction<'_, Postgres>,
    product_id: &str,
    stale_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<ClaimedCard>> {
    sqlx::query_as::<_, ClaimedCard>(
        r#"
        UPDATE cards
        SET is_used = TRUE, used_at = $3, reserved_order_id = NULL, reserved_at = NULL
        WHERE id = (
            SELECT id FROM cards
            WHERE product_id = $1
              AND is_used = FALSE
              AND (reserved_at IS NULL OR reserved_at < $2)
            ORDER BY id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND is_used = FALSE
        RETURNING id, card_key
        "#,
    )
    .bind(product_id)
    .bind(stale_before)
    .bind(now)
    .fetch_optional(&mut **executor)
    .await
}

/// Claim for schemas without reservation columns.
pub async fn claim_available_legacy(
    executor: &mut SqlxTransaction<'_, Postgres>,
    product_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<ClaimedCard>> {
    sqlx::query_as::<_, ClaimedCard>(
        r#"
        UPDATE cards
        SET is_used = TRUE, used_at = $2
        WHERE id = (
            SELECT id FROM cards
            WHERE product_id = $1 AND is_used = FALSE
            ORDER BY id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND is_used = FALSE
        RETURNING id, card_key
        "#,
    )
    .bind(product_id)
    .bind(now)
    .fetch_optional(&mut **executor)
    .await
}

/// Puts a claimed card back into stock. Returns the number of rows touched,
/// zero when the card no longer exists or a delivered order still holds it.
pub async fn return_to_stock(
    executor: &mut SqlxTransaction<'_, Postgres>,
    product_id: &str,
    card_key: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE cards
        SET is_used = FALSE, used_at = NULL
        WHERE product_id = $1 AND card_key = $2
          AND NOT EXISTS (
              SELECT 1 FROM orders
              WHERE product_id = $1 AND card_key = $2 AND status = 'delivered'
          )
        "#,
    )
    .bind(product_id)
    .bind(card_key)
    .execute(&mut **executor)
    .await?;
    Ok(result.rows_affected())
}

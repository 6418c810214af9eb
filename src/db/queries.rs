use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use crate::db::models::Order;
use chrono::{DateTime, Utc};

const ORDER_COLUMNS: &str = "order_id, product_id, amount, status, trade_no, card_key, \
    user_id, points_used, created_at, paid_at, delivered_at";

// --- Order Queries ---

pub async fn get_order(pool: &PgPool, order_id: &str) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE order_id = $1",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await
}

/// Loads an order and holds its row lock until the transaction ends, so the
/// status check and the status write cannot interleave with another writer.
pub async fn lock_order(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: &str,
) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE order_id = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn mark_delivered(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: &str,
    trade_no: &str,
    card_key: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE orders
        SET status = 'delivered', paid_at = $3, delivered_at = $3, trade_no = $2, card_key = $4
        WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .bind(trade_no)
    .bind(now)
    .bind(card_key)
    .execute(&mut **executor)
    .await?;
    Ok(())
}

/// Records the payment of an order no card could be found for.
pub async fn mark_paid_unfulfilled(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: &str,
    trade_no: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE orders
        SET status = 'paid', paid_at = $3, trade_no = $2, card_key = NULL
        WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .bind(trade_no)
    .bind(now)
    .execute(&mut **executor)
    .await?;
    Ok(())
}

/// A refunded order gives up its card: only delivered orders hold a `card_key`.
pub async fn mark_refunded(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: &str,
) -> Result<()> {
    sqlx::query("UPDATE orders SET status = 'refunded', card_key = NULL WHERE order_id = $1")
        .bind(order_id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

// --- User Queries ---

pub async fn credit_user_points(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: i64,
    points: i64,
) -> Result<u64> {
    let result = sqlx::query("UPDATE users SET points = points + $2 WHERE id = $1")
        .bind(user_id)
        .bind(points)
        .execute(&mut **executor)
        .await?;
    Ok(result.rows_affected())
}

// --- Refund Request Queries ---

pub async fn mark_refund_request_processed(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: &str,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE refund_requests
        SET status = 'processed', processed_at = $2
        WHERE order_id = $1 AND status <> 'processed'
        "#,
    )
    .bind(order_id)
    .bind(now)
    .execute(&mut **executor)
    .await?;
    Ok(result.rows_affected())
}

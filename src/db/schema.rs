//! Detection of optional schema features.
//!
//! Older deployments lack the card reservation columns. The probe runs once at
//! startup and the result is shared by every claimer; a claimer that later
//! trips over a missing column downgrades the shared flag for good.

use sqlx::PgPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const RESERVATION_COLUMNS: [&str; 2] = ["reserved_order_id", "reserved_at"];

#[derive(Debug, Clone)]
pub struct SchemaCapabilities {
    reservations: Arc<AtomicBool>,
}

impl SchemaCapabilities {
    pub fn new(reservations: bool) -> Self {
        Self {
            reservations: Arc::new(AtomicBool::new(reservations)),
        }
    }

    pub fn supports_reservations(&self) -> bool {
        self.reservations.load(Ordering::Acquire)
    }

    /// Marks reservations unsupported. Returns true only for the call that
    /// actually flipped the flag.
    pub fn downgrade_reservations(&self) -> bool {
        self.reservations.swap(false, Ordering::AcqRel)
    }
}

pub async fn probe_capabilities(pool: &PgPool) -> Result<SchemaCapabilities, sqlx::Error> {
    let found: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM information_schema.columns
        WHERE table_schema = current_schema()
          AND table_name = 'cards'
          AND column_name::text = ANY($1)
        "#,
    )
    .bind(&RESERVATION_COLUMNS[..])
    .fetch_one(pool)
    .await?;

    let reservations = found == RESERVATION_COLUMNS.len() as i64;
    if reservations {
        tracing::info!("Card reservations supported by schema");
    } else {
        tracing::warn!("Card reservation columns absent, claiming without reservations");
    }

    Ok(SchemaCapabilities::new(reservations))
}

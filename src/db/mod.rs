use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use crate::config::Config;

pub mod cards;
pub mod models;
pub mod queries;
pub mod schema;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
}

/// SQLSTATE raised by Postgres when a statement names a column the table lacks.
pub const UNDEFINED_COLUMN: &str = "42703";
/// SQLSTATE raised by Postgres when a statement names a missing relation.
pub const UNDEFINED_TABLE: &str = "42P01";

/// Returns true when `err` is a database error carrying the given SQLSTATE.
pub fn has_sqlstate(err: &sqlx::Error, code: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(code),
        _ => false,
    }
}

pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod startup;

use axum::{Router, routing::{get, post}};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::cache::InvalidationSink;
use crate::config::FulfillmentPolicy;
use crate::db::schema::SchemaCapabilities;
use crate::gateway::PaymentGateway;
use crate::services::{CompensationService, FulfillmentService, RefundService};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub capabilities: SchemaCapabilities,
    pub fulfillment: FulfillmentService,
    pub compensation: CompensationService,
    pub refunds: RefundService,
    pub admin_api_key: String,
    pub notify_secret: String,
}

impl AppState {
    pub fn new(
        db: sqlx::PgPool,
        capabilities: SchemaCapabilities,
        policy: FulfillmentPolicy,
        gateway: Option<Arc<dyn PaymentGateway>>,
        invalidation: Arc<dyn InvalidationSink>,
        admin_api_key: String,
        notify_secret: String,
    ) -> Self {
        let fulfillment = FulfillmentService::new(db.clone(), capabilities.clone(), policy);
        let compensation = CompensationService::new(db.clone(), invalidation);
        let refunds = RefundService::new(db.clone(), gateway, compensation.clone());

        Self {
            db,
            capabilities,
            fulfillment,
            compensation,
            refunds,
            admin_api_key,
            notify_secret,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments/notify", post(handlers::payments::notify))
        .route("/orders/:order_id", get(handlers::payments::get_order))
        .route("/admin/orders/:order_id/refund", post(handlers::admin::initiate_refund))
        .route("/admin/orders/:order_id/compensate", post(handlers::admin::compensate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

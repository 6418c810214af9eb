//! Invalidation of cached admin and order views.
//!
//! Invalidations are fire-and-forget: a failure to publish never fails the
//! operation that produced it.

use redis::AsyncCommands;
use std::fmt;

const INVALIDATION_CHANNEL: &str = "cardvault:invalidate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    AdminOrders,
    AdminRefunds,
    OrderDetail(String),
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::AdminOrders => write!(f, "admin:orders"),
            View::AdminRefunds => write!(f, "admin:refunds"),
            View::OrderDetail(order_id) => write!(f, "order:{}", order_id),
        }
    }
}

/// Views that go stale when an order is refunded.
pub fn refund_views(order_id: &str) -> Vec<View> {
    vec![
        View::AdminOrders,
        View::AdminRefunds,
        View::OrderDetail(order_id.to_string()),
    ]
}

pub trait InvalidationSink: Send + Sync {
    fn invalidate(&self, views: Vec<View>);
}

/// Sink used when no cache is deployed. Only logs.
#[derive(Debug, Clone, Default)]
pub struct LogInvalidationSink;

impl InvalidationSink for LogInvalidationSink {
    fn invalidate(&self, views: Vec<View>) {
        for view in views {
            tracing::debug!(view = %view, "View invalidated");
        }
    }
}

/// Publishes each stale view key on a Redis channel for the page cache to consume.
#[derive(Clone)]
pub struct RedisInvalidationSink {
    redis_client: redis::Client,
    channel: String,
}

impl RedisInvalidationSink {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            channel: INVALIDATION_CHANNEL.to_string(),
        })
    }

    async fn publish(&self, views: &[View]) -> redis::RedisResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        for view in views {
            let _: i64 = conn.publish(&self.channel, view.to_string()).await?;
        }
        Ok(())
    }
}

impl InvalidationSink for RedisInvalidationSink {
    fn invalidate(&self, views: Vec<View>) {
        let sink = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.publish(&views).await {
                tracing::warn!(error = %e, count = views.len(), "Failed to publish view invalidations");
            }
        });
    }
}

use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

const DEFAULT_FRESHNESS_SECS: i64 = 60;
const DEFAULT_AMOUNT_EPSILON: &str = "0.01";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub admin_api_key: String,
    pub notify_secret: String,
    pub reservation_freshness_secs: i64,
    pub amount_epsilon: String,
    pub gateway: Option<GatewayConfig>,
}

/// Credentials and endpoint of the payment processor's refund API.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GatewayConfig {
    pub url: String,
    pub merchant_id: String,
    pub merchant_key: String,
}

/// Tunables of the fulfillment algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentPolicy {
    /// A reservation younger than this pins its card to the reserving order.
    pub reservation_freshness: chrono::Duration,
    /// Maximum absolute difference between the paid and recorded amount.
    pub amount_epsilon: BigDecimal,
}

impl Default for FulfillmentPolicy {
    fn default() -> Self {
        Self {
            reservation_freshness: chrono::Duration::seconds(DEFAULT_FRESHNESS_SECS),
            amount_epsilon: BigDecimal::from_str(DEFAULT_AMOUNT_EPSILON)
                .unwrap_or_else(|_| BigDecimal::from(0)),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let config = Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            admin_api_key: env::var("ADMIN_API_KEY")?,
            notify_secret: env::var("PAYMENT_NOTIFY_SECRET")?,
            reservation_freshness_secs: env::var("RESERVATION_FRESHNESS_SECS")
                .unwrap_or_else(|_| DEFAULT_FRESHNESS_SECS.to_string())
                .parse()?,
            amount_epsilon: env::var("AMOUNT_EPSILON")
                .unwrap_or_else(|_| DEFAULT_AMOUNT_EPSILON.to_string()),
            gateway: gateway_from_parts(
                env::var("GATEWAY_URL").ok(),
                env::var("GATEWAY_MERCHANT_ID").ok(),
                env::var("GATEWAY_MERCHANT_KEY").ok(),
            ),
        };

        // Fail at startup rather than on the first payment.
        config.fulfillment_policy()?;
        Ok(config)
    }

    pub fn fulfillment_policy(&self) -> anyhow::Result<FulfillmentPolicy> {
        if self.reservation_freshness_secs < 0 {
            anyhow::bail!("RESERVATION_FRESHNESS_SECS must not be negative");
        }
        let amount_epsilon = BigDecimal::from_str(self.amount_epsilon.trim())
            .map_err(|e| anyhow::anyhow!("AMOUNT_EPSILON is not a decimal: {}", e))?;
        if amount_epsilon < BigDecimal::from(0) {
            anyhow::bail!("AMOUNT_EPSILON must not be negative");
        }

        Ok(FulfillmentPolicy {
            reservation_freshness: chrono::Duration::seconds(self.reservation_freshness_secs),
            amount_epsilon,
        })
    }
}

/// The gateway is only usable when all three settings are present and non-empty.
fn gateway_from_parts(
    url: Option<String>,
    merchant_id: Option<String>,
    merchant_key: Option<String>,
) -> Option<GatewayConfig> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    Some(GatewayConfig {
        url: non_empty(url)?,
        merchant_id: non_empty(merchant_id)?,
        merchant_key: non_empty(merchant_key)?,
    })
}

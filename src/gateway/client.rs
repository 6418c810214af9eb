use async_trait::async_trait;
use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Gateway responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// What the core asks the processor to refund.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub order_id: String,
    pub trade_no: String,
    pub amount: BigDecimal,
}

/// How the processor answered a refund that reached it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundVerdict {
    Accepted,
    Declined { body: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submits a refund. `Err` means the processor could not be reached or
    /// answered outside 2xx; a business refusal is `Ok(Declined)`.
    async fn refund(&self, request: &RefundRequest) -> Result<RefundVerdict, GatewayError>;

    /// "closed" while calls are let through, "open" while they are rejected.
    fn circuit_state(&self) -> &'static str {
        "closed"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundForm<'a> {
    merchant_id: &'a str,
    merchant_key: &'a str,
    trade_no: &'a str,
    order_id: &'a str,
    amount: String,
}

/// Amounts go over the wire with exactly two decimals, rounded half-up.
pub fn format_amount(amount: &BigDecimal) -> String {
    amount.round(2).with_scale(2).to_string()
}

/// Recognizes a success reply: a JSON `code` of 1, a JSON `status`/`msg`/`message`
/// of "success", or any body mentioning "success". Matching ignores case and
/// "unsuccessful" never counts.
pub fn interpret_reply(body: &str) -> RefundVerdict {
    let structured = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(fields)) => {
            let code_ok = match fields.get("code") {
                Some(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
                Some(serde_json::Value::String(s)) => s.trim() == "1",
                _ => false,
            };
            code_ok
                || ["status", "msg", "message"].iter().any(|key| {
                    fields
                        .get(*key)
                        .and_then(|v| v.as_str())
                        .map(|s| s.trim().eq_ignore_ascii_case("success"))
                        .unwrap_or(false)
                })
        }
        _ => false,
    };

    if structured || mentions_success(body) {
        RefundVerdict::Accepted
    } else {
        RefundVerdict::Declined {
            body: body.to_string(),
        }
    }
}

fn mentions_success(body: &str) -> bool {
    body.to_lowercase()
        .replace("unsuccess", "")
        .contains("success")
}

/// HTTP client for the payment processor's refund endpoint
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_circuit_breaker(config, 3, 60)
    }

    pub fn with_circuit_breaker(
        config: GatewayConfig,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HttpGateway {
            client,
            config,
            circuit_breaker,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn refund(&self, request: &RefundRequest) -> Result<RefundVerdict, GatewayError> {
        let form = RefundForm {
            merchant_id: &self.config.merchant_id,
            merchant_key: &self.config.merchant_key,
            trade_no: &request.trade_no,
            order_id: &request.order_id,
            amount: format_amount(&request.amount),
        };
        let call = self.client.post(&self.config.url).form(&form).send();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = call.await?;
                let status = response.status();
                let body = response.text().await?;
                if !status.is_success() {
                    return Err(GatewayError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(body)
            })
            .await;

        match result {
            Ok(body) => Ok(interpret_reply(&body)),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "Payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }
}

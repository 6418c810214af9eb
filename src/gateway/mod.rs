pub mod client;

pub use client::{
    format_amount, interpret_reply, GatewayError, HttpGateway, PaymentGateway, RefundRequest,
    RefundVerdict,
};

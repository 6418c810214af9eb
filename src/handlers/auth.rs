use axum::{
    async_trait,
    body::{Bytes, HttpBody},
    extract::FromRequest,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    BoxError,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Payment-Signature";

/// Extractor that verifies the X-Payment-Signature header
/// against the request body using HMAC-SHA256
pub struct VerifiedNotification {
    pub body: Bytes,
}

impl VerifiedNotification {
    fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> Result<(), SignatureError> {
        let expected_signature = hex::decode(signature_header.trim())
            .map_err(|_| SignatureError::InvalidSignatureFormat)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(body);

        // verify_slice compares in constant time
        mac.verify_slice(&expected_signature)
            .map_err(|_| SignatureError::SignatureMismatch)
    }
}

/// Hex-encoded HMAC-SHA256 of `body`, as the payment notifier sends it.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl<B> FromRequest<AppState, B> for VerifiedNotification
where
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = SignatureError;

    async fn from_request(req: Request<B>, state: &AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or(SignatureError::MissingSignature)?;

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|_| SignatureError::BodyReadError)?;

        Self::verify_signature(&state.notify_secret, &body, &signature)?;

        Ok(VerifiedNotification { body })
    }
}

#[derive(Debug)]
pub enum SignatureError {
    MissingSignature,
    InvalidSignatureFormat,
    InvalidSecret,
    SignatureMismatch,
    BodyReadError,
}

impl IntoResponse for SignatureError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SignatureError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, "Missing X-Payment-Signature header")
            }
            SignatureError::InvalidSignatureFormat => {
                (StatusCode::UNAUTHORIZED, "Invalid signature format")
            }
            SignatureError::InvalidSecret => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid notification secret configuration")
            }
            SignatureError::SignatureMismatch => {
                (StatusCode::UNAUTHORIZED, "Signature verification failed")
            }
            SignatureError::BodyReadError => {
                (StatusCode::BAD_REQUEST, "Failed to read request body")
            }
        };

        tracing::warn!("Payment notification rejected: {:?}", self);
        (status, message).into_response()
    }
}

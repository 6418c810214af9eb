use axum::http::HeaderMap;

/// Capability check for operations reserved to administrators.
pub trait AdminAuthorizer: Send + Sync {
    fn is_authorized_admin(&self) -> bool;
}

/// Grants admin capability to requests presenting the configured API key,
/// either as `Authorization: Bearer <key>` or as the bare key.
pub struct ApiKeyAuthorizer<'a> {
    presented: Option<&'a str>,
    admin_api_key: &'a str,
}

impl<'a> ApiKeyAuthorizer<'a> {
    pub fn from_headers(headers: &'a HeaderMap, admin_api_key: &'a str) -> Self {
        let presented = headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok());
        Self {
            presented,
            admin_api_key,
        }
    }
}

impl AdminAuthorizer for ApiKeyAuthorizer<'_> {
    fn is_authorized_admin(&self) -> bool {
        if self.admin_api_key.is_empty() {
            return false;
        }
        match self.presented {
            Some(auth) => {
                auth.strip_prefix("Bearer ").unwrap_or(auth) == self.admin_api_key
            }
            None => false,
        }
    }
}

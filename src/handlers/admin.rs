use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};

use crate::error::AppError;
use crate::middleware::auth::{AdminAuthorizer, ApiKeyAuthorizer};
use crate::AppState;

pub async fn initiate_refund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let auth = ApiKeyAuthorizer::from_headers(&headers, &state.admin_api_key);
    let outcome = state.refunds.initiate_refund(&auth, &order_id).await?;

    Ok(Json(outcome))
}

pub async fn compensate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let auth = ApiKeyAuthorizer::from_headers(&headers, &state.admin_api_key);
    if !auth.is_authorized_admin() {
        return Err(AppError::Unauthorized("admin capability required".to_string()));
    }

    let report = state.compensation.compensate(&order_id).await?;
    Ok(Json(report))
}

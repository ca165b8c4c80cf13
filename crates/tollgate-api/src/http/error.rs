//! Application error type mapping gateway errors to HTTP responses.
//!
//! Local failures are rendered in the JSON envelope (see
//! [`crate::http::response`]). Upstream errors pass through with the
//! provider's own status and body.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use tollgate_types::error::{GatewayError, TokenError};

use crate::http::response::ErrorEnvelope;

/// Set on 401 responses caused by an expired token.
pub const TOKEN_EXPIRED_HEADER: &str = "x-llm-token-expired";

/// Set on 403 responses caused by the monthly spend limit.
pub const SPEND_REACHED_HEADER: &str = "x-llm-monthly-spend-reached";

/// Seconds a rate-limited client should wait before retrying.
const RETRY_AFTER_SECS: &str = "60";

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub struct AppError(pub GatewayError);

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        AppError(e)
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        AppError(e.into())
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            GatewayError::TokenInvalid => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID"),
            GatewayError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            GatewayError::NoCountryCode => (StatusCode::FORBIDDEN, "NO_COUNTRY_CODE"),
            GatewayError::TorNetworkBlocked { .. } => {
                (StatusCode::FORBIDDEN, "TOR_NETWORK_BLOCKED")
            }
            GatewayError::RegionRestricted { .. } => (StatusCode::FORBIDDEN, "REGION_RESTRICTED"),
            GatewayError::ModelNotAvailable { .. } => {
                (StatusCode::FORBIDDEN, "MODEL_NOT_AVAILABLE")
            }
            GatewayError::AccountTooYoung { .. } => (StatusCode::FORBIDDEN, "ACCOUNT_TOO_YOUNG"),
            GatewayError::SpendingLimitReached => {
                (StatusCode::FORBIDDEN, "SPENDING_LIMIT_REACHED")
            }
            GatewayError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
            }
            GatewayError::UnknownModel { .. } => (StatusCode::NOT_FOUND, "UNKNOWN_MODEL"),
            GatewayError::ProviderNotSupported(_) => {
                (StatusCode::BAD_REQUEST, "PROVIDER_NOT_SUPPORTED")
            }
            GatewayError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            GatewayError::ProviderConfigMissing(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_CONFIG_MISSING")
            }
            GatewayError::Upstream { status, .. } => (upstream_status(*status), "UPSTREAM_ERROR"),
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

/// The provider's status when it is an error status, 502 otherwise.
fn upstream_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if let GatewayError::Upstream { body, .. } = self.0 {
            let content_type = if serde_json::from_str::<serde_json::Value>(&body).is_ok() {
                "application/json"
            } else {
                "text/plain; charset=utf-8"
            };
            return (status, [(header::CONTENT_TYPE, content_type)], body).into_response();
        }

        if status.is_server_error() {
            tracing::error!(code, error = %self.0, "request failed");
        }

        let body = serde_json::to_string(&ErrorEnvelope::new(code, self.0.to_string()))
            .unwrap_or_else(|_| {
                r#"{"data":null,"errors":[{"code":"SERIALIZATION_ERROR","message":"Failed to serialize response"}]}"#.to_string()
            });
        let mut response = (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response();

        let headers = response.headers_mut();
        match self.0 {
            GatewayError::TokenExpired => {
                headers.insert(TOKEN_EXPIRED_HEADER, HeaderValue::from_static("true"));
            }
            GatewayError::SpendingLimitReached => {
                headers.insert(SPEND_REACHED_HEADER, HeaderValue::from_static("true"));
            }
            GatewayError::RateLimitExceeded { .. } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
            }
            _ => {}
        }
        response
    }
}

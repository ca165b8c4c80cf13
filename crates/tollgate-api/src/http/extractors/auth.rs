//! Access token authentication extractor.
//!
//! Extracts the token from `Authorization: Bearer <token>` and verifies it
//! against the signing secret. Runs before the request body is read, so a
//! bad token is rejected before anything else happens.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use tollgate_infra::token::verify_token;
use tollgate_types::error::GatewayError;
use tollgate_types::token::AccessToken;

use crate::http::error::AppError;
use crate::state::AppState;

/// A verified access token for the current request.
pub struct LlmAuth(pub AccessToken);

impl FromRequestParts<AppState> for LlmAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(GatewayError::TokenInvalid)?;
        match verify_token(token, &state.token_secret) {
            Ok(access) => Ok(LlmAuth(access)),
            Err(e) => {
                tracing::debug!(error = %e, "token rejected");
                Err(e.into())
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

//! POST /completion - forward a provider-native request and stream the
//! provider's response back unmodified.
//!
//! Request body: `{ "provider": "...", "model": "...", "provider_request": "..." }`.
//! `provider_request` is the provider-native request as JSON text; an
//! inline JSON object is accepted too.
//! The response is `text/event-stream`; its bytes are exactly what the
//! provider sent. The stream ends early if the server shuts down.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::Response;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::field::{Empty, display};
use tracing::{Instrument, Span};

use tollgate_core::gateway::{CompletionRequest, RequestPhase};
use tollgate_observe::attrs;
use tollgate_types::error::GatewayError;
use tollgate_types::provider::Provider;
use tollgate_types::token::AccessToken;

use crate::http::error::AppError;
use crate::http::extractors::auth::LlmAuth;
use crate::http::extractors::country::CountryCode;
use crate::state::AppState;

/// Wire shape of a completion request. `provider` stays a string here so
/// an unknown provider is reported as unsupported rather than malformed.
#[derive(Debug, Deserialize)]
struct CompletionBody {
    provider: String,
    model: String,
    provider_request: Value,
}

pub async fn perform_completion(
    State(state): State<AppState>,
    LlmAuth(token): LlmAuth,
    CountryCode(country_code): CountryCode,
    body: Bytes,
) -> Result<Response, AppError> {
    let span = tracing::info_span!(
        "completion",
        tollgate.user_id = Empty,
        gen_ai.provider.name = Empty,
        gen_ai.request.model = Empty,
        tollgate.country_code = Empty,
        tollgate.phase = Empty,
    );
    handle_completion(state, token, country_code, body)
        .instrument(span)
        .await
}

async fn handle_completion(
    state: AppState,
    token: AccessToken,
    country_code: Option<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let span = Span::current();
    let user_id = token.user_id();
    span.record(attrs::USER_ID, user_id);
    span.record(attrs::PHASE, display(RequestPhase::Received));
    if let Some(code) = &country_code {
        span.record(attrs::COUNTRY_CODE, code.as_str());
    }

    if !state
        .rate_limiter
        .acquire(&user_id.to_string(), &state.completion_limit)
    {
        return Err(GatewayError::RateLimitExceeded {
            limit: state.completion_limit.name().to_string(),
        }
        .into());
    }

    let body: CompletionBody = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::BadRequest(format!("invalid request body: {e}")))?;
    let provider: Provider = body
        .provider
        .parse()
        .map_err(|_| GatewayError::ProviderNotSupported(body.provider.clone()))?;
    span.record(attrs::PROVIDER, provider.as_str());
    span.record(attrs::REQUEST_MODEL, body.model.as_str());
    let provider_request = decode_provider_request(body.provider_request)?;

    let request = CompletionRequest {
        provider,
        model: body.model,
        provider_request,
        token,
        country_code,
    };
    let stream = match state.gateway.perform_completion(request).await {
        Ok(stream) => stream,
        Err(e) => {
            span.record(attrs::PHASE, display(RequestPhase::Failed));
            return Err(e.into());
        }
    };
    span.record(attrs::PHASE, display(RequestPhase::Streaming));

    let stream = stream.take_until(state.shutdown.clone().cancelled_owned());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| GatewayError::Internal(format!("failed to build response: {e}")).into())
}

/// Unwraps a provider request sent as JSON text.
fn decode_provider_request(raw: Value) -> Result<Value, GatewayError> {
    match raw {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| GatewayError::BadRequest(format!("provider_request is not valid JSON: {e}"))),
        other => Ok(other),
    }
}

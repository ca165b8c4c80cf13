use thiserror::Error;

use crate::provider::Provider;

/// Every way a gateway request can fail.
///
/// Authorization-stage errors are terminal for the request; the gateway
/// never retries on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("invalid token")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("no country code provided")]
    NoCountryCode,

    #[error("access to {provider} models is not available over TOR")]
    TorNetworkBlocked { provider: Provider },

    #[error("access to {provider} models is not available in your region ({country})")]
    RegionRestricted { provider: Provider, country: String },

    #[error("model '{model}' from {provider} is not available in your plan")]
    ModelNotAvailable { provider: Provider, model: String },

    #[error("unknown model: {model} from provider {provider}")]
    UnknownModel { provider: Provider, model: String },

    #[error("monthly spending limit reached")]
    SpendingLimitReached,

    #[error("rate limit exceeded: maximum {limit} reached")]
    RateLimitExceeded { limit: String },

    #[error("account must be older than {min_days} days to use LLM features")]
    AccountTooYoung { min_days: u32 },

    #[error("provider not supported: {0}")]
    ProviderNotSupported(String),

    #[error("{0} API key not configured")]
    ProviderConfigMissing(Provider),

    #[error("provider returned error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures while issuing or verifying an access token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    /// Bad signature, malformed structure, unsupported algorithm or an
    /// impossible validity window. The reason is for logs only.
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<TokenError> for GatewayError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => GatewayError::TokenExpired,
            TokenError::Invalid(_) => GatewayError::TokenInvalid,
            TokenError::Signing(msg) => GatewayError::Internal(msg),
        }
    }
}

/// Failures while forwarding a request upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{0} API key not configured")]
    ProviderConfigMissing(Provider),

    #[error("invalid provider payload: {0}")]
    InvalidPayload(String),

    #[error("provider returned error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl DispatchError {
    /// Whether the request got as far as the provider. Payload and
    /// credential faults are caught locally and never leave the gateway.
    pub fn reached_provider(&self) -> bool {
        matches!(
            self,
            DispatchError::Upstream { .. } | DispatchError::Transport(_)
        )
    }
}

impl From<DispatchError> for GatewayError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::ProviderConfigMissing(provider) => {
                GatewayError::ProviderConfigMissing(provider)
            }
            DispatchError::InvalidPayload(msg) => GatewayError::BadRequest(msg),
            DispatchError::Upstream { status, body } => GatewayError::Upstream { status, body },
            DispatchError::Transport(msg) => GatewayError::Upstream {
                status: 502,
                body: msg,
            },
        }
    }
}

/// Rejected rate limit descriptors. Raised at configuration time so that a
/// bad limit can never reach the request path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitSpecError {
    #[error("rate limit name must not be empty")]
    EmptyName,

    #[error("rate limit '{0}' has zero capacity")]
    ZeroCapacity(String),

    #[error("rate limit '{0}' refill window is too short for its capacity")]
    WindowTooShort(String),
}

/// Errors from loading gateway configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required setting: {0}")]
    Missing(String),
}

impl From<RateLimitSpecError> for ConfigError {
    fn from(e: RateLimitSpecError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

//! Gateway configuration types.
//!
//! `GatewayConfig` represents the `tollgate.toml` file that controls the
//! model catalog, billing defaults and endpoint throttling. Every field has
//! a default, so an empty file (or no file) yields a working gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RateLimitSpecError};
use crate::model::LanguageModel;
use crate::provider::Provider;
use crate::rate_limit::RateLimitSpec;

/// Top-level configuration for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// A single model name that is open to every token while in closed beta.
    #[serde(default)]
    pub closed_beta_model_name: Option<String>,

    /// Monthly spend included for free, in cents.
    #[serde(default = "default_free_tier_allowance")]
    pub free_tier_monthly_allowance_cents: u32,

    /// Spend ceiling used when issuing tokens without an explicit one.
    #[serde(default = "default_max_monthly_spend")]
    pub default_max_monthly_spend_cents: u32,

    /// Accounts younger than this need a subscription or staff status.
    #[serde(default = "default_min_account_age_days")]
    pub min_account_age_days: u32,

    /// Lifetime of issued access tokens.
    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: u64,

    /// Coarse per-user throttle on the completion endpoint.
    #[serde(default = "default_completion_rate_limit")]
    pub completion_rate_limit: EndpointLimit,

    /// Model catalog.
    #[serde(default = "default_models")]
    pub models: Vec<LanguageModel>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_free_tier_allowance() -> u32 {
    1_000
}

fn default_max_monthly_spend() -> u32 {
    1_000
}

fn default_min_account_age_days() -> u32 {
    7
}

fn default_token_lifetime_secs() -> u64 {
    60 * 60
}

fn default_completion_rate_limit() -> EndpointLimit {
    EndpointLimit {
        capacity: 120,
        window_secs: 60,
    }
}

/// The built-in catalog: one model per metered provider.
pub fn default_models() -> Vec<LanguageModel> {
    vec![
        LanguageModel {
            id: "copilot-chat".to_string(),
            name: "copilot-chat".to_string(),
            provider: Provider::Copilot,
            max_requests_per_minute: 25,
            max_tokens_per_minute: 5_000,
            max_input_tokens_per_minute: 2_500,
            max_output_tokens_per_minute: 2_500,
            max_tokens_per_day: 100_000,
            enabled: true,
        },
        LanguageModel {
            id: "gpt-4".to_string(),
            name: "gpt-4".to_string(),
            provider: Provider::OpenAi,
            max_requests_per_minute: 20,
            max_tokens_per_minute: 4_000,
            max_input_tokens_per_minute: 2_000,
            max_output_tokens_per_minute: 2_000,
            max_tokens_per_day: 80_000,
            enabled: true,
        },
        LanguageModel {
            id: "claude-3-opus".to_string(),
            name: "claude-3-opus".to_string(),
            provider: Provider::Anthropic,
            max_requests_per_minute: 15,
            max_tokens_per_minute: 3_000,
            max_input_tokens_per_minute: 1_500,
            max_output_tokens_per_minute: 1_500,
            max_tokens_per_day: 60_000,
            enabled: true,
        },
    ]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            closed_beta_model_name: None,
            free_tier_monthly_allowance_cents: default_free_tier_allowance(),
            default_max_monthly_spend_cents: default_max_monthly_spend(),
            min_account_age_days: default_min_account_age_days(),
            token_lifetime_secs: default_token_lifetime_secs(),
            completion_rate_limit: default_completion_rate_limit(),
            models: default_models(),
        }
    }
}

impl GatewayConfig {
    /// Reject values that would only fail later, on the request path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for model in &self.models {
            if let Some(limit) = model.zero_ceiling() {
                return Err(ConfigError::Invalid(format!(
                    "model '{}' ({}) has a zero {limit} ceiling",
                    model.name, model.provider
                )));
            }
        }
        if self.token_lifetime_secs == 0 {
            return Err(ConfigError::Invalid(
                "token_lifetime_secs must be positive".to_string(),
            ));
        }
        self.completion_rate_limit.to_spec("completion-requests")?;
        Ok(())
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_secs)
    }
}

/// Capacity and refill window for a per-endpoint token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimit {
    pub capacity: u32,
    pub window_secs: u64,
}

impl EndpointLimit {
    pub fn to_spec(&self, name: &str) -> Result<RateLimitSpec, RateLimitSpecError> {
        RateLimitSpec::new(name, self.capacity, Duration::from_secs(self.window_secs))
    }
}

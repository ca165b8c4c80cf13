//! Application state shared by every HTTP handler.
//!
//! The gateway service is generic over its upstream and spend ports;
//! AppState pins it to the concrete infra implementations.

use std::sync::Arc;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use tollgate_core::gateway::{Gateway, NoRecordedSpend};
use tollgate_core::rate_limit::RateLimiter;
use tollgate_infra::provider::ProviderRouter;
use tollgate_types::config::GatewayConfig;
use tollgate_types::rate_limit::RateLimitSpec;

/// Name of the per-user bucket taken by every completion request.
pub const COMPLETION_LIMIT_NAME: &str = "completion-requests";

pub type ConcreteGateway = Gateway<ProviderRouter, NoRecordedSpend>;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ConcreteGateway>,
    pub token_secret: Arc<SecretString>,
    pub rate_limiter: Arc<RateLimiter>,
    pub completion_limit: RateLimitSpec,
    /// Cancelled on shutdown; ends in-flight response streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the gateway from configuration. Fails on an invalid catalog or
    /// endpoint limit.
    pub fn new(
        config: &GatewayConfig,
        upstream: ProviderRouter,
        token_secret: SecretString,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let gateway = Gateway::new(config, upstream, NoRecordedSpend)?;
        let completion_limit = config
            .completion_rate_limit
            .to_spec(COMPLETION_LIMIT_NAME)?;

        Ok(Self {
            gateway: Arc::new(gateway),
            token_secret: Arc::new(token_secret),
            rate_limiter: Arc::new(RateLimiter::new()),
            completion_limit,
            shutdown,
        })
    }
}

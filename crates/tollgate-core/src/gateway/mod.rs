//! The gateway service: account checks, authorization, dispatch and usage
//! accounting for one completion request.
//!
//! Generic over the [`UpstreamClient`] and [`SpendSource`] ports so core
//! never depends on tollgate-infra.

pub mod stream;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use tollgate_types::config::GatewayConfig;
use tollgate_types::error::{ConfigError, GatewayError};
use tollgate_types::model::{LanguageModel, TokenUsage};
use tollgate_types::provider::Provider;
use tollgate_types::token::AccessToken;

use crate::authorization::{AuthorizationPipeline, UsageSnapshot, check_region};
use crate::catalog::ModelCatalog;
use crate::upstream::UpstreamClient;
use crate::usage::UsageTracker;

pub use stream::UsageRecordingStream;
use stream::UsageRecorder;

/// Where a request is in its lifecycle. Logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    TokenVerified,
    Authorized,
    Dispatched,
    Streaming,
    Completed,
    Failed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestPhase::Received => "received",
            RequestPhase::TokenVerified => "token_verified",
            RequestPhase::Authorized => "authorized",
            RequestPhase::Dispatched => "dispatched",
            RequestPhase::Streaming => "streaming",
            RequestPhase::Completed => "completed",
            RequestPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Source of a user's spend so far this month, in cents.
pub trait SpendSource: Send + Sync {
    fn current_spend_cents(&self, user_id: u64) -> impl Future<Output = u32> + Send;
}

/// Spend source for deployments without billing: every user has spent 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecordedSpend;

impl SpendSource for NoRecordedSpend {
    async fn current_spend_cents(&self, _user_id: u64) -> u32 {
        0
    }
}

/// A completion request after its token has been verified.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub provider: Provider,
    pub model: String,
    /// Provider-native request body, forwarded as-is.
    pub provider_request: Value,
    pub token: AccessToken,
    pub country_code: Option<String>,
}

pub struct Gateway<U: UpstreamClient, S: SpendSource> {
    catalog: Arc<ModelCatalog>,
    pipeline: AuthorizationPipeline,
    usage: Arc<UsageTracker>,
    upstream: U,
    spend: S,
    min_account_age_days: u32,
}

impl<U: UpstreamClient, S: SpendSource> Gateway<U, S> {
    /// Build the service from configuration. Fails on an invalid catalog.
    pub fn new(config: &GatewayConfig, upstream: U, spend: S) -> Result<Self, ConfigError> {
        let catalog = Arc::new(ModelCatalog::new(config.models.clone())?);
        let pipeline = AuthorizationPipeline::new(
            Arc::clone(&catalog),
            config.closed_beta_model_name.clone(),
            config.free_tier_monthly_allowance_cents,
        );
        Ok(Self {
            catalog,
            pipeline,
            usage: Arc::new(UsageTracker::new()),
            upstream,
            spend,
            min_account_age_days: config.min_account_age_days,
        })
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub async fn perform_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<UsageRecordingStream, GatewayError> {
        self.perform_completion_at(request, Utc::now()).await
    }

    /// Authorize, dispatch and wrap the upstream body for usage accounting.
    ///
    /// Once authorization passes, exactly one usage entry is recorded for
    /// the call, charged to the window of `now`: by the returned stream, or
    /// here with zero tokens if the provider refuses or cannot be reached.
    /// Requests rejected before leaving the gateway (bad payload, missing
    /// key) record nothing.
    pub async fn perform_completion_at(
        &self,
        request: CompletionRequest,
        now: DateTime<Utc>,
    ) -> Result<UsageRecordingStream, GatewayError> {
        let CompletionRequest {
            provider,
            model,
            provider_request,
            token,
            country_code,
        } = request;
        let user_id = token.user_id();
        tracing::debug!(user_id, %provider, model = %model, phase = %RequestPhase::TokenVerified);

        self.check_account_age(&token, now)?;

        let model = self.catalog.normalize_model_name(provider, &model);
        let snapshot = UsageSnapshot {
            usage: self.usage.get_usage_at(user_id, provider, &model, now),
            active_users: self.usage.get_active_user_count_at(provider, &model, now),
            current_spend_cents: self.spend.current_spend_cents(user_id).await,
        };

        if let Err(e) =
            self.pipeline
                .authorize(&token, country_code.as_deref(), provider, &model, &snapshot)
        {
            tracing::info!(user_id, %provider, model = %model, error = %e, "request denied");
            return Err(e);
        }
        tracing::debug!(user_id, %provider, model = %model, phase = %RequestPhase::Authorized);

        tracing::debug!(user_id, %provider, phase = %RequestPhase::Dispatched);
        let body = match self
            .upstream
            .dispatch(provider, provider_request, token.is_staff())
            .await
        {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(user_id, %provider, model = %model, error = %e, phase = %RequestPhase::Failed);
                if e.reached_provider() {
                    self.usage
                        .record_usage_at(user_id, provider, &model, TokenUsage::default(), now);
                }
                return Err(e.into());
            }
        };
        tracing::debug!(user_id, %provider, model = %model, phase = %RequestPhase::Streaming);

        let recorder = UsageRecorder::new(Arc::clone(&self.usage), user_id, provider, model, now);
        Ok(UsageRecordingStream::new(body, recorder))
    }

    /// Staff and subscribers are exempt; everyone else needs an account at
    /// least `min_account_age_days` old.
    fn check_account_age(&self, token: &AccessToken, now: DateTime<Utc>) -> Result<(), GatewayError> {
        if token.is_staff() || token.identity.has_llm_subscription {
            return Ok(());
        }
        let min_age = Duration::days(i64::from(self.min_account_age_days));
        if token.account_age_at(now) < min_age {
            return Err(GatewayError::AccountTooYoung {
                min_days: self.min_account_age_days,
            });
        }
        Ok(())
    }

    /// Enabled models the token may use from `country_code`.
    pub fn list_models(&self, token: &AccessToken, country_code: Option<&str>) -> Vec<LanguageModel> {
        self.catalog
            .enabled()
            .filter(|m| check_region(country_code, m.provider).is_ok())
            .filter(|m| {
                self.pipeline
                    .check_model_access(token, m.provider, &m.name)
                    .is_ok()
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use chrono::TimeZone;
    use futures_util::{StreamExt, stream as futures_stream};
    use serde_json::json;
    use tollgate_types::error::DispatchError;
    use tollgate_types::token::TokenIdentity;

    use super::*;
    use crate::upstream::ByteStream;

    /// Upstream that replays a canned SSE body and remembers what it was sent.
    #[derive(Default)]
    struct FakeUpstream {
        fail_with: Option<DispatchError>,
        sent: Mutex<Vec<(Provider, Value, bool)>>,
    }

    impl UpstreamClient for FakeUpstream {
        async fn dispatch(
            &self,
            provider: Provider,
            payload: Value,
            is_staff: bool,
        ) -> Result<ByteStream, DispatchError> {
            self.sent.lock().unwrap().push((provider, payload, is_staff));
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            let chunks = vec![
                Ok(Bytes::from_static(
                    b"data: {\"message\":{\"usage\":{\"input_tokens\":30}}}\n\n",
                )),
                Ok(Bytes::from_static(b"data: {\"usage\":{\"output_tokens\":12}}\n\n")),
            ];
            Ok(Box::pin(futures_stream::iter(chunks)))
        }
    }

    struct FixedSpend(u32);

    impl SpendSource for FixedSpend {
        async fn current_spend_cents(&self, _user_id: u64) -> u32 {
            self.0
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn token(account_age_days: i64) -> AccessToken {
        AccessToken {
            jti: "jti".to_string(),
            issued_at: now().timestamp(),
            expires_at: now().timestamp() + 3600,
            identity: TokenIdentity {
                user_id: 77,
                github_user_login: "octo".to_string(),
                metrics_id: "m-77".to_string(),
                account_created_at: now() - Duration::days(account_age_days),
                is_staff: false,
                has_llm_subscription: false,
                max_monthly_spend_in_cents: 1_000,
                custom_llm_monthly_allowance_in_cents: None,
            },
        }
    }

    fn request(provider: Provider, model: &str, token: AccessToken) -> CompletionRequest {
        CompletionRequest {
            provider,
            model: model.to_string(),
            provider_request: json!({"model": model, "messages": []}),
            token,
            country_code: Some("US".to_string()),
        }
    }

    fn gateway(upstream: FakeUpstream) -> Gateway<FakeUpstream, NoRecordedSpend> {
        Gateway::new(&GatewayConfig::default(), upstream, NoRecordedSpend).unwrap()
    }

    #[tokio::test]
    async fn test_completion_streams_and_records_usage() {
        let gw = gateway(FakeUpstream::default());
        let body = gw
            .perform_completion_at(request(Provider::Copilot, "copilot-chat", token(30)), now())
            .await
            .unwrap();
        let chunks: Vec<_> = body.collect().await;
        assert_eq!(chunks.len(), 2);

        let usage = gw
            .usage()
            .get_usage_at(77, Provider::Copilot, "copilot-chat", now());
        assert_eq!(usage.requests_this_minute, 1);
        assert_eq!(usage.input_tokens_this_minute, 30);
        assert_eq!(usage.output_tokens_this_minute, 12);
        assert_eq!(
            gw.usage()
                .get_active_user_count_at(Provider::Copilot, "copilot-chat", now())
                .users_in_recent_minutes,
            1
        );
    }

    #[tokio::test]
    async fn test_young_account_rejected_before_authorization() {
        let gw = gateway(FakeUpstream::default());
        let mut req = request(Provider::Copilot, "copilot-chat", token(3));
        req.country_code = Some("T1".to_string());

        let err = gw.perform_completion_at(req, now()).await.unwrap_err();
        assert_eq!(err, GatewayError::AccountTooYoung { min_days: 7 });
    }

    #[tokio::test]
    async fn test_young_subscriber_allowed() {
        let gw = gateway(FakeUpstream::default());
        let mut t = token(1);
        t.identity.has_llm_subscription = true;
        assert!(
            gw.perform_completion_at(request(Provider::Copilot, "copilot-chat", t), now())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_model_name_normalized_for_accounting() {
        let upstream = FakeUpstream::default();
        let gw = gateway(upstream);
        let mut t = token(30);
        t.identity.is_staff = true;
        let body = gw
            .perform_completion_at(request(Provider::OpenAi, "gpt-4-0613", t), now())
            .await
            .unwrap();
        drop(body);

        assert_eq!(
            gw.usage()
                .get_active_user_count_at(Provider::OpenAi, "gpt-4", now())
                .users_in_recent_minutes,
            1
        );
        let sent = gw.upstream.sent.lock().unwrap();
        assert_eq!(sent[0].1["model"], "gpt-4-0613");
        assert!(sent[0].2);
    }

    #[tokio::test]
    async fn test_denied_request_records_nothing() {
        let gw = gateway(FakeUpstream::default());
        let err = gw
            .perform_completion_at(request(Provider::OpenAi, "gpt-4", token(30)), now())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ModelNotAvailable { .. }));
        assert!(gw.upstream.sent.lock().unwrap().is_empty());
        assert_eq!(
            gw.usage()
                .get_usage_at(77, Provider::OpenAi, "gpt-4", now())
                .requests_this_minute,
            0
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_records_zero_token_attempt() {
        let gw = gateway(FakeUpstream {
            fail_with: Some(DispatchError::Upstream {
                status: 529,
                body: "{\"error\":\"overloaded\"}".to_string(),
            }),
            ..FakeUpstream::default()
        });
        let err = gw
            .perform_completion_at(request(Provider::Copilot, "copilot-chat", token(30)), now())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Upstream {
                status: 529,
                body: "{\"error\":\"overloaded\"}".to_string()
            }
        );

        let usage = gw
            .usage()
            .get_usage_at(77, Provider::Copilot, "copilot-chat", now());
        assert_eq!(usage.requests_this_minute, 1);
        assert_eq!(usage.tokens_this_minute, 0);
    }

    #[tokio::test]
    async fn test_request_ceiling_enforced_across_calls() {
        let mut config = GatewayConfig::default();
        config.models[0].max_requests_per_minute = 2;
        let gw = Gateway::new(&config, FakeUpstream::default(), NoRecordedSpend).unwrap();

        for _ in 0..2 {
            let body = gw
                .perform_completion_at(request(Provider::Copilot, "copilot-chat", token(30)), now())
                .await
                .unwrap();
            let _: Vec<_> = body.collect().await;
        }
        let err = gw
            .perform_completion_at(request(Provider::Copilot, "copilot-chat", token(30)), now())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::RateLimitExceeded {
                limit: "requests_per_minute".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_default_copilot_ceiling_admits_25_rejects_26() {
        let gw = gateway(FakeUpstream::default());

        for n in 1..=25 {
            let body = gw
                .perform_completion_at(request(Provider::Copilot, "copilot-chat", token(30)), now())
                .await
                .unwrap_or_else(|e| panic!("request {n} rejected: {e}"));
            let _: Vec<_> = body.collect().await;
        }
        let err = gw
            .perform_completion_at(request(Provider::Copilot, "copilot-chat", token(30)), now())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::RateLimitExceeded {
                limit: "requests_per_minute".to_string()
            }
        );

        // A new minute starts a new window.
        let next_minute = now() + Duration::minutes(1);
        assert!(
            gw.perform_completion_at(
                request(Provider::Copilot, "copilot-chat", token(30)),
                next_minute
            )
            .await
            .is_ok()
        );
    }

    #[tokio::test]
    async fn test_local_dispatch_faults_record_nothing() {
        for fault in [
            DispatchError::ProviderConfigMissing(Provider::Copilot),
            DispatchError::InvalidPayload("provider_request must be a JSON object".to_string()),
        ] {
            let gw = gateway(FakeUpstream {
                fail_with: Some(fault),
                ..FakeUpstream::default()
            });
            assert!(
                gw.perform_completion_at(request(Provider::Copilot, "copilot-chat", token(30)), now())
                    .await
                    .is_err()
            );
            assert_eq!(
                gw.usage()
                    .get_usage_at(77, Provider::Copilot, "copilot-chat", now())
                    .requests_this_minute,
                0
            );
        }
    }

    #[tokio::test]
    async fn test_spend_source_consulted() {
        let gw = Gateway::new(
            &GatewayConfig::default(),
            FakeUpstream::default(),
            FixedSpend(1_000),
        )
        .unwrap();
        let err = gw
            .perform_completion_at(request(Provider::Copilot, "copilot-chat", token(30)), now())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::SpendingLimitReached);
    }

    #[test]
    fn test_list_models_filters_by_region_and_plan() {
        let gw = gateway(FakeUpstream::default());
        let models = gw.list_models(&token(30), Some("US"));
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["copilot-chat"]);

        let mut staff = token(30);
        staff.identity.is_staff = true;
        assert_eq!(gw.list_models(&staff, Some("US")).len(), 3);
        assert!(gw.list_models(&staff, Some("KP")).is_empty());
        assert!(gw.list_models(&staff, None).is_empty());
    }

    #[test]
    fn test_request_phase_display() {
        assert_eq!(RequestPhase::TokenVerified.to_string(), "token_verified");
        assert_eq!(RequestPhase::Failed.to_string(), "failed");
    }
}

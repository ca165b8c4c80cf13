//! ProviderRouter -- forwards provider-native payloads to the right upstream.
//!
//! Each provider has its own endpoint and authentication scheme:
//!
//! | provider  | endpoint                                             | auth                         |
//! |-----------|------------------------------------------------------|------------------------------|
//! | copilot   | `/chat/completions`                                  | bearer                       |
//! | openai    | `/v1/chat/completions`                               | bearer                       |
//! | anthropic | `/v1/messages`                                       | `x-api-key` + version header |
//! | google    | `/v1/models/{model}:streamGenerateContent?alt=sse`   | `key` query parameter        |
//!
//! API keys are held in [`SecretString`]s and only exposed while building
//! request headers.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use tollgate_core::upstream::{ByteStream, UpstreamClient};
use tollgate_types::error::DispatchError;
use tollgate_types::provider::Provider;

use super::aliases::anthropic_model_alias;
use super::streaming::process_streaming_response;
use crate::config::ProviderCredentials;

const COPILOT_BASE_URL: &str = "https://api.githubcopilot.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Routes requests to upstream providers.
///
/// Does not derive Debug: it holds the provider credentials.
pub struct ProviderRouter {
    client: reqwest::Client,
    credentials: Arc<ProviderCredentials>,
    copilot_base_url: String,
    openai_base_url: String,
    anthropic_base_url: String,
    google_base_url: String,
}

impl ProviderRouter {
    /// The Anthropic API version header value.
    const ANTHROPIC_API_VERSION: &'static str = "2023-06-01";

    pub fn new(credentials: Arc<ProviderCredentials>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create reqwest client");

        Self {
            client,
            credentials,
            copilot_base_url: COPILOT_BASE_URL.to_string(),
            openai_base_url: OPENAI_BASE_URL.to_string(),
            anthropic_base_url: ANTHROPIC_BASE_URL.to_string(),
            google_base_url: GOOGLE_BASE_URL.to_string(),
        }
    }

    /// Override one provider's base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, provider: Provider, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        match provider {
            Provider::Copilot => self.copilot_base_url = base_url,
            Provider::OpenAi => self.openai_base_url = base_url,
            Provider::Anthropic => self.anthropic_base_url = base_url,
            Provider::Google => self.google_base_url = base_url,
        }
        self
    }

    /// Send `payload` upstream and return the raw response, whatever its
    /// status.
    pub async fn dispatch(
        &self,
        provider: Provider,
        payload: Value,
        is_staff: bool,
    ) -> Result<reqwest::Response, DispatchError> {
        let Value::Object(mut body) = payload else {
            return Err(DispatchError::InvalidPayload(
                "provider_request must be a JSON object".to_string(),
            ));
        };
        let key = self
            .credentials
            .key_for(provider, is_staff)
            .ok_or(DispatchError::ProviderConfigMissing(provider))?;

        let request = match provider {
            Provider::Copilot => self
                .client
                .post(format!("{}/chat/completions", self.copilot_base_url))
                .bearer_auth(key.expose_secret()),
            Provider::OpenAi => self
                .client
                .post(format!("{}/v1/chat/completions", self.openai_base_url))
                .bearer_auth(key.expose_secret()),
            Provider::Anthropic => {
                if let Some(Value::String(model)) = body.get_mut("model") {
                    if let Some(pinned) = anthropic_model_alias(model) {
                        *model = pinned.to_string();
                    }
                }
                self.client
                    .post(format!("{}/v1/messages", self.anthropic_base_url))
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", Self::ANTHROPIC_API_VERSION)
            }
            Provider::Google => {
                let model = match body.remove("model") {
                    Some(Value::String(model)) => model,
                    _ => {
                        return Err(DispatchError::InvalidPayload(
                            "missing model in request".to_string(),
                        ));
                    }
                };
                if !is_path_safe(&model) {
                    return Err(DispatchError::InvalidPayload(format!(
                        "invalid model name: {model}"
                    )));
                }
                self.google_request(&model, key)
            }
        };

        tracing::debug!(%provider, is_staff, "dispatching upstream request");
        request
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|e| DispatchError::Transport(format!("HTTP request failed: {e}")))
    }

    fn google_request(&self, model: &str, key: &SecretString) -> reqwest::RequestBuilder {
        self.client
            .post(format!(
                "{}/v1/models/{model}:streamGenerateContent",
                self.google_base_url
            ))
            .query(&[("alt", "sse"), ("key", key.expose_secret())])
    }
}

fn is_path_safe(model: &str) -> bool {
    !model.is_empty()
        && model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl UpstreamClient for ProviderRouter {
    async fn dispatch(
        &self,
        provider: Provider,
        payload: Value,
        is_staff: bool,
    ) -> Result<ByteStream, DispatchError> {
        let response = ProviderRouter::dispatch(self, provider, payload, is_staff).await?;
        process_streaming_response(response).await
    }
}

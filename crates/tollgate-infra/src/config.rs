//! Configuration and credential loading for Tollgate.
//!
//! [`load_gateway_config`] reads `tollgate.toml` into a validated
//! [`GatewayConfig`]. [`ProviderCredentials`] collects upstream API keys
//! from the environment, falling back to the local GitHub Copilot client's
//! `apps.json` for the Copilot key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use tollgate_types::config::GatewayConfig;
use tollgate_types::error::ConfigError;
use tollgate_types::provider::Provider;

/// Env var holding the access token signing secret.
pub const SIGNING_SECRET_ENV: &str = "LLM_API_SECRET";

/// Load gateway configuration from `path`.
///
/// - If the file does not exist, returns [`GatewayConfig::default()`].
/// - If the file cannot be read or parsed, or holds invalid values, returns
///   a [`ConfigError`]. A gateway with a half-read catalog must not start.
pub async fn load_gateway_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(GatewayConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    let config = toml::from_str::<GatewayConfig>(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    config.validate()?;

    tracing::info!(
        models = config.models.len(),
        "Loaded gateway config from {}",
        path.display()
    );
    Ok(config)
}

/// Read the token signing secret from [`SIGNING_SECRET_ENV`].
pub fn signing_secret_from_env() -> Result<SecretString, ConfigError> {
    signing_secret_from(|key| std::env::var(key).ok())
}

fn signing_secret_from(lookup: impl Fn(&str) -> Option<String>) -> Result<SecretString, ConfigError> {
    lookup(SIGNING_SECRET_ENV)
        .filter(|s| !s.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::Missing(SIGNING_SECRET_ENV.to_string()))
}

/// Upstream API keys. Never logged; does not derive Debug.
#[derive(Default)]
pub struct ProviderCredentials {
    pub openai: Option<SecretString>,
    pub copilot: Option<SecretString>,
    pub anthropic: Option<SecretString>,
    pub anthropic_staff: Option<SecretString>,
    pub google: Option<SecretString>,
}

impl ProviderCredentials {
    /// Read keys from the process environment.
    ///
    /// `COPILOT_API_KEY` falls back to the first non-empty token in the
    /// local Copilot `apps.json`, when one can be found.
    pub fn from_env() -> Self {
        let mut credentials = Self::from_lookup(|key| std::env::var(key).ok());
        if credentials.copilot.is_none() {
            credentials.copilot = copilot_apps_json_path()
                .and_then(|path| copilot_token_from_apps_json(&path))
                .map(SecretString::from);
            if credentials.copilot.is_some() {
                tracing::debug!("Using Copilot token from local apps.json");
            }
        }
        credentials
    }

    /// Build credentials from an arbitrary key lookup. Empty values count
    /// as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(SecretString::from);
        Self {
            openai: get("OPENAI_API_KEY"),
            copilot: get("COPILOT_API_KEY"),
            anthropic: get("ANTHROPIC_API_KEY"),
            anthropic_staff: get("ANTHROPIC_STAFF_API_KEY"),
            google: get("GOOGLE_AI_API_KEY"),
        }
    }

    /// Providers that have a usable key.
    pub fn enabled_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.key_for(*p, false).is_some())
            .collect()
    }

    /// The key to use for `provider`. Staff callers get the Anthropic
    /// staff key when one is configured.
    pub fn key_for(&self, provider: Provider, is_staff: bool) -> Option<&SecretString> {
        match provider {
            Provider::OpenAi => self.openai.as_ref(),
            Provider::Copilot => self.copilot.as_ref(),
            Provider::Anthropic => {
                if is_staff {
                    self.anthropic_staff.as_ref().or(self.anthropic.as_ref())
                } else {
                    self.anthropic.as_ref()
                }
            }
            Provider::Google => self.google.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CopilotAppsFile {
    #[serde(default)]
    tokens: BTreeMap<String, CopilotAppToken>,
}

#[derive(Debug, Deserialize)]
struct CopilotAppToken {
    #[serde(default)]
    token: String,
}

/// Location of the GitHub Copilot client's `apps.json`.
///
/// `%APPDATA%\GitHub Copilot\apps.json` on Windows,
/// `~/.config/github-copilot/apps.json` everywhere else.
pub fn copilot_apps_json_path() -> Option<PathBuf> {
    let dir = if cfg!(windows) {
        dirs::config_dir()?.join("GitHub Copilot")
    } else {
        dirs::home_dir()?.join(".config").join("github-copilot")
    };
    Some(dir.join("apps.json"))
}

/// First non-empty token in an `apps.json` file, in key order.
pub fn copilot_token_from_apps_json(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let file: CopilotAppsFile = match serde_json::from_str(&content) {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}", path.display());
            return None;
        }
    };
    file.tokens
        .into_values()
        .map(|t| t.token)
        .find(|token| !token.is_empty())
}

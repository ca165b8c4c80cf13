//! Upstream language-model providers reachable through the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An upstream LLM API with its own endpoint and credential scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Copilot,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
}

impl Provider {
    /// Every provider, in catalog order.
    pub const ALL: [Provider; 4] = [
        Provider::Copilot,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Copilot => "copilot",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copilot" => Ok(Provider::Copilot),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            other => Err(format!("unsupported provider: '{other}'")),
        }
    }
}

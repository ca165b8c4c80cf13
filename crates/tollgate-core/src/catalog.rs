//! Model catalog: lookup and model name normalization.

use tollgate_types::error::ConfigError;
use tollgate_types::model::LanguageModel;
use tollgate_types::provider::Provider;

/// The set of models the gateway meters, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<LanguageModel>,
}

impl ModelCatalog {
    /// Build a catalog, rejecting entries with a zero ceiling and duplicate
    /// `(provider, name)` pairs.
    pub fn new(models: Vec<LanguageModel>) -> Result<Self, ConfigError> {
        for (i, model) in models.iter().enumerate() {
            if let Some(limit) = model.zero_ceiling() {
                return Err(ConfigError::Invalid(format!(
                    "model '{}' ({}) has a zero {limit} ceiling",
                    model.name, model.provider
                )));
            }
            let duplicate = models[..i]
                .iter()
                .any(|m| m.provider == model.provider && m.name == model.name);
            if duplicate {
                return Err(ConfigError::Invalid(format!(
                    "model '{}' ({}) is listed twice",
                    model.name, model.provider
                )));
            }
        }
        Ok(Self { models })
    }

    /// Enabled model with exactly this provider and name.
    pub fn find(&self, provider: Provider, name: &str) -> Option<&LanguageModel> {
        self.models
            .iter()
            .find(|m| m.enabled && m.provider == provider && m.name == name)
    }

    /// Enabled models in catalog order.
    pub fn enabled(&self) -> impl Iterator<Item = &LanguageModel> {
        self.models.iter().filter(|m| m.enabled)
    }

    pub fn all(&self) -> &[LanguageModel] {
        &self.models
    }

    /// Map a requested name to the catalog name it is a version of.
    ///
    /// Picks the longest catalog name for `provider` that is a prefix of
    /// `requested` (so `gpt-4-0613` resolves to `gpt-4`). Returns the
    /// requested name unchanged when nothing matches.
    pub fn normalize_model_name(&self, provider: Provider, requested: &str) -> String {
        self.models
            .iter()
            .filter(|m| m.provider == provider && requested.starts_with(m.name.as_str()))
            .max_by_key(|m| m.name.len())
            .map(|m| m.name.clone())
            .unwrap_or_else(|| requested.to_string())
    }
}

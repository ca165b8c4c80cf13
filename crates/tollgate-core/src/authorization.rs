//! Multi-stage authorization for a single model request.
//!
//! Stages run in a fixed order and stop at the first failure:
//!
//! 1. region (country code, TOR, export denylist)
//! 2. model access for the token's plan
//! 3. monthly spend
//! 4. per-model rate ceilings, shared among recently active users
//!
//! Every stage reads the same [`UsageSnapshot`], taken once before the
//! pipeline starts, so a decision is never based on counters that moved
//! halfway through.

use std::sync::Arc;

use tollgate_types::error::GatewayError;
use tollgate_types::model::{ActiveUserCount, ModelUsage, UsageLimit};
use tollgate_types::provider::Provider;
use tollgate_types::token::AccessToken;

use crate::catalog::ModelCatalog;

/// Countries from which model access is blocked.
pub const RESTRICTED_COUNTRIES: [&str; 19] = [
    "AF", "BY", "CF", "CN", "CU", "ER", "ET", "IR", "KP", "XK", "LY", "MM", "RU", "SO", "SS",
    "SD", "SY", "VE", "YE",
];

/// Country code reported for TOR exit nodes.
pub const TOR_COUNTRY_CODE: &str = "T1";

/// Country code reported when the edge could not resolve a country.
pub const UNKNOWN_COUNTRY_CODE: &str = "XX";

/// Anthropic models open to every plan.
const OPEN_ANTHROPIC_MODELS: [&str; 2] = ["claude-3-5-sonnet", "claude-3-7-sonnet"];

/// Usage state read by every stage of one authorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub usage: ModelUsage,
    pub active_users: ActiveUserCount,
    /// Spend so far this month, in cents.
    pub current_spend_cents: u32,
}

/// The authorization stages, configured once at startup.
#[derive(Debug, Clone)]
pub struct AuthorizationPipeline {
    catalog: Arc<ModelCatalog>,
    closed_beta_model_name: Option<String>,
    free_tier_allowance_cents: u32,
}

impl AuthorizationPipeline {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        closed_beta_model_name: Option<String>,
        free_tier_allowance_cents: u32,
    ) -> Self {
        Self {
            catalog,
            closed_beta_model_name,
            free_tier_allowance_cents,
        }
    }

    /// Run all four stages in order.
    pub fn authorize(
        &self,
        token: &AccessToken,
        country_code: Option<&str>,
        provider: Provider,
        model: &str,
        snapshot: &UsageSnapshot,
    ) -> Result<(), GatewayError> {
        check_region(country_code, provider)?;
        self.check_model_access(token, provider, model)?;
        self.check_spending(token, snapshot.current_spend_cents)?;
        self.check_rate_limit(provider, model, &snapshot.usage, &snapshot.active_users)
    }

    /// Stage 2. Staff may use anything; everyone may use Copilot models and
    /// the open Anthropic models; the closed beta model is open while
    /// configured.
    pub fn check_model_access(
        &self,
        token: &AccessToken,
        provider: Provider,
        model: &str,
    ) -> Result<(), GatewayError> {
        if token.is_staff() {
            return Ok(());
        }
        if provider == Provider::Copilot {
            return Ok(());
        }
        if provider == Provider::Anthropic && OPEN_ANTHROPIC_MODELS.contains(&model) {
            return Ok(());
        }
        if self.closed_beta_model_name.as_deref() == Some(model) {
            return Ok(());
        }
        Err(GatewayError::ModelNotAvailable {
            provider,
            model: model.to_string(),
        })
    }

    /// Stage 3. Spend up to the allowance is free. Past it, only
    /// subscribers continue, and only while the overage stays below their
    /// monthly ceiling.
    pub fn check_spending(
        &self,
        token: &AccessToken,
        current_spend_cents: u32,
    ) -> Result<(), GatewayError> {
        if token.is_staff() {
            return Ok(());
        }

        let allowance = token
            .identity
            .custom_llm_monthly_allowance_in_cents
            .unwrap_or(self.free_tier_allowance_cents);
        if current_spend_cents < allowance {
            return Ok(());
        }
        if !token.identity.has_llm_subscription {
            return Err(GatewayError::SpendingLimitReached);
        }

        let overage = current_spend_cents - allowance;
        if overage >= token.identity.max_monthly_spend_in_cents {
            return Err(GatewayError::SpendingLimitReached);
        }
        Ok(())
    }

    /// Stage 4. Each model ceiling is divided among recently active users
    /// and compared with what this user has already consumed. The share is
    /// floored at one rather than rounding down to zero on a crowded model.
    pub fn check_rate_limit(
        &self,
        provider: Provider,
        model: &str,
        usage: &ModelUsage,
        active_users: &ActiveUserCount,
    ) -> Result<(), GatewayError> {
        let Some(entry) = self.catalog.find(provider, model) else {
            return Err(GatewayError::UnknownModel {
                provider,
                model: model.to_string(),
            });
        };

        for limit in UsageLimit::ALL {
            let per_user = per_user_ceiling(entry.ceiling(limit), active_users.divisor_for(limit));
            if usage.observed(limit) >= u64::from(per_user) {
                tracing::debug!(%provider, model, %limit, per_user, "model rate ceiling reached");
                return Err(GatewayError::RateLimitExceeded {
                    limit: limit.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A user's share of a ceiling. Never below one, so every active user can
/// make progress however crowded the model is.
fn per_user_ceiling(ceiling: u32, users: u32) -> u32 {
    (ceiling / users.max(1)).max(1)
}

/// Stage 1. Region check on the edge-reported country code.
pub fn check_region(country_code: Option<&str>, provider: Provider) -> Result<(), GatewayError> {
    let country = match country_code {
        None | Some("") | Some(UNKNOWN_COUNTRY_CODE) => return Err(GatewayError::NoCountryCode),
        Some(code) => code,
    };
    if country == TOR_COUNTRY_CODE {
        return Err(GatewayError::TorNetworkBlocked { provider });
    }
    if RESTRICTED_COUNTRIES.contains(&country) {
        return Err(GatewayError::RegionRestricted {
            provider,
            country: country.to_string(),
        });
    }
    Ok(())
}

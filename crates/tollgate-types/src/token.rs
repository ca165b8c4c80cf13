//! Access token types.
//!
//! A [`TokenIdentity`] is what the issuer knows about a user: identity,
//! plan and billing facts. An [`AccessToken`] is that identity after it has
//! been signed, issued and verified, with its id and validity window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity and entitlement facts embedded in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub user_id: u64,
    pub github_user_login: String,
    /// Opaque analytics identifier.
    pub metrics_id: String,
    pub account_created_at: DateTime<Utc>,
    pub is_staff: bool,
    pub has_llm_subscription: bool,
    /// Spend ceiling above the free allowance, in cents.
    pub max_monthly_spend_in_cents: u32,
    /// Overrides the system-wide free allowance when present.
    pub custom_llm_monthly_allowance_in_cents: Option<u32>,
}

/// A verified access token. Read-only for the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Unique token id (`jti`).
    pub jti: String,
    /// Issued-at, unix seconds.
    pub issued_at: i64,
    /// Expiry, unix seconds. Always greater than `issued_at`.
    pub expires_at: i64,
    pub identity: TokenIdentity,
}

impl AccessToken {
    /// Expiry is inclusive: at the `expires_at` second the token is no
    /// longer usable.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }

    pub fn account_age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.identity.account_created_at
    }

    pub fn user_id(&self) -> u64 {
        self.identity.user_id
    }

    pub fn is_staff(&self) -> bool {
        self.identity.is_staff
    }
}

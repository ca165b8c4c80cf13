//! Model catalog entries and the usage figures compared against them.
//!
//! A [`LanguageModel`] carries five absolute ceilings shared by every user of
//! the model. The authorization pipeline divides them by an
//! [`ActiveUserCount`] to get a per-user share and compares that share with
//! the caller's [`ModelUsage`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::Provider;

/// Static catalog entry for one upstream model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageModel {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub max_requests_per_minute: u32,
    pub max_tokens_per_minute: u32,
    pub max_input_tokens_per_minute: u32,
    pub max_output_tokens_per_minute: u32,
    pub max_tokens_per_day: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl LanguageModel {
    /// The ceiling for a given usage counter.
    pub fn ceiling(&self, limit: UsageLimit) -> u32 {
        match limit {
            UsageLimit::RequestsPerMinute => self.max_requests_per_minute,
            UsageLimit::TokensPerMinute => self.max_tokens_per_minute,
            UsageLimit::InputTokensPerMinute => self.max_input_tokens_per_minute,
            UsageLimit::OutputTokensPerMinute => self.max_output_tokens_per_minute,
            UsageLimit::TokensPerDay => self.max_tokens_per_day,
        }
    }

    /// Returns the first ceiling that is zero, if any.
    pub fn zero_ceiling(&self) -> Option<UsageLimit> {
        UsageLimit::ALL
            .into_iter()
            .find(|limit| self.ceiling(*limit) == 0)
    }
}

/// The five counters a model's ceilings apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLimit {
    RequestsPerMinute,
    TokensPerMinute,
    InputTokensPerMinute,
    OutputTokensPerMinute,
    TokensPerDay,
}

impl UsageLimit {
    /// Evaluation order used by the rate stage.
    pub const ALL: [UsageLimit; 5] = [
        UsageLimit::RequestsPerMinute,
        UsageLimit::TokensPerMinute,
        UsageLimit::InputTokensPerMinute,
        UsageLimit::OutputTokensPerMinute,
        UsageLimit::TokensPerDay,
    ];

    /// Whether this ceiling is shared among users active in recent days
    /// rather than recent minutes.
    pub fn is_daily(&self) -> bool {
        matches!(self, UsageLimit::TokensPerDay)
    }
}

impl fmt::Display for UsageLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UsageLimit::RequestsPerMinute => "requests_per_minute",
            UsageLimit::TokensPerMinute => "tokens_per_minute",
            UsageLimit::InputTokensPerMinute => "input_tokens_per_minute",
            UsageLimit::OutputTokensPerMinute => "output_tokens_per_minute",
            UsageLimit::TokensPerDay => "tokens_per_day",
        };
        f.write_str(name)
    }
}

/// Token counts observed for a single upstream call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

/// Rolling usage counters for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub requests_this_minute: u64,
    pub tokens_this_minute: u64,
    pub input_tokens_this_minute: u64,
    pub output_tokens_this_minute: u64,
    pub tokens_this_day: u64,
}

impl ModelUsage {
    /// The observed value of a given counter.
    pub fn observed(&self, limit: UsageLimit) -> u64 {
        match limit {
            UsageLimit::RequestsPerMinute => self.requests_this_minute,
            UsageLimit::TokensPerMinute => self.tokens_this_minute,
            UsageLimit::InputTokensPerMinute => self.input_tokens_this_minute,
            UsageLimit::OutputTokensPerMinute => self.output_tokens_this_minute,
            UsageLimit::TokensPerDay => self.tokens_this_day,
        }
    }
}

/// Number of distinct users recently active on a model.
///
/// Both counts are at least 1; they are used as divisors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUserCount {
    pub users_in_recent_minutes: u32,
    pub users_in_recent_days: u32,
}

impl ActiveUserCount {
    pub fn new(users_in_recent_minutes: u32, users_in_recent_days: u32) -> Self {
        Self {
            users_in_recent_minutes: users_in_recent_minutes.max(1),
            users_in_recent_days: users_in_recent_days.max(1),
        }
    }

    /// Divisor applied to the given ceiling.
    pub fn divisor_for(&self, limit: UsageLimit) -> u32 {
        let users = if limit.is_daily() {
            self.users_in_recent_days
        } else {
            self.users_in_recent_minutes
        };
        users.max(1)
    }
}

impl Default for ActiveUserCount {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

//! In-memory usage accounting.
//!
//! Counters are per user and aggregate across models. Minute counters live
//! in the UTC minute of their last write and the daily counter in the UTC
//! day; a read or write in a later window sees them as zero. Active users
//! are tracked per `(provider, model)` by last-seen time.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use tollgate_types::model::{ActiveUserCount, ModelUsage, TokenUsage};
use tollgate_types::provider::Provider;

/// Horizon for `users_in_recent_minutes`, in seconds.
pub const RECENT_MINUTES_HORIZON_SECS: i64 = 5 * 60;
/// Horizon for `users_in_recent_days`, in seconds.
pub const RECENT_DAYS_HORIZON_SECS: i64 = 7 * 86_400;

#[derive(Debug, Clone, Copy)]
struct UsageRecord {
    minute: i64,
    day: i64,
    usage: ModelUsage,
}

impl UsageRecord {
    fn at(&self, now: DateTime<Utc>) -> ModelUsage {
        let mut usage = self.usage;
        if self.minute != minute_of(now) {
            usage.requests_this_minute = 0;
            usage.tokens_this_minute = 0;
            usage.input_tokens_this_minute = 0;
            usage.output_tokens_this_minute = 0;
        }
        if self.day != day_of(now) {
            usage.tokens_this_day = 0;
        }
        usage
    }
}

fn minute_of(t: DateTime<Utc>) -> i64 {
    t.timestamp().div_euclid(60)
}

fn day_of(t: DateTime<Utc>) -> i64 {
    t.timestamp().div_euclid(86_400)
}

#[derive(Debug, Default)]
struct UsageState {
    by_user: HashMap<u64, UsageRecord>,
    last_seen: HashMap<(Provider, String), HashMap<u64, DateTime<Utc>>>,
}

/// Tracks per-user usage and per-model active users.
///
/// One reader/writer lock guards both tables; reads take the shared lock.
#[derive(Debug, Default)]
pub struct UsageTracker {
    state: RwLock<UsageState>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_usage(&self, user_id: u64, provider: Provider, model: &str, usage: TokenUsage) {
        self.record_usage_at(user_id, provider, model, usage, Utc::now());
    }

    /// Add one call's usage to the user's counters and mark them active on
    /// `provider:model`.
    pub fn record_usage_at(
        &self,
        user_id: u64,
        provider: Provider,
        model: &str,
        usage: TokenUsage,
        now: DateTime<Utc>,
    ) {
        let total = usage.total();
        let mut state = self.state.write().expect("usage lock poisoned");

        let current = state
            .by_user
            .get(&user_id)
            .map(|record| record.at(now))
            .unwrap_or_default();
        let updated = ModelUsage {
            requests_this_minute: current.requests_this_minute.saturating_add(1),
            tokens_this_minute: current.tokens_this_minute.saturating_add(total),
            input_tokens_this_minute: current.input_tokens_this_minute.saturating_add(usage.input),
            output_tokens_this_minute: current
                .output_tokens_this_minute
                .saturating_add(usage.output),
            tokens_this_day: current.tokens_this_day.saturating_add(total),
        };
        state.by_user.insert(
            user_id,
            UsageRecord {
                minute: minute_of(now),
                day: day_of(now),
                usage: updated,
            },
        );

        state
            .last_seen
            .entry((provider, model.to_string()))
            .or_default()
            .insert(user_id, now);

        tracing::debug!(
            user_id,
            %provider,
            model,
            input_tokens = usage.input,
            output_tokens = usage.output,
            "usage recorded"
        );
    }

    pub fn get_usage(&self, user_id: u64, provider: Provider, model: &str) -> ModelUsage {
        self.get_usage_at(user_id, provider, model, Utc::now())
    }

    /// Current counters for the user. Zero for unknown users and for
    /// windows that have rolled over since the last write.
    pub fn get_usage_at(
        &self,
        user_id: u64,
        _provider: Provider,
        _model: &str,
        now: DateTime<Utc>,
    ) -> ModelUsage {
        let state = self.state.read().expect("usage lock poisoned");
        state
            .by_user
            .get(&user_id)
            .map(|record| record.at(now))
            .unwrap_or_default()
    }

    pub fn get_active_user_count(&self, provider: Provider, model: &str) -> ActiveUserCount {
        self.get_active_user_count_at(provider, model, Utc::now())
    }

    pub fn get_active_user_count_at(
        &self,
        provider: Provider,
        model: &str,
        now: DateTime<Utc>,
    ) -> ActiveUserCount {
        let state = self.state.read().expect("usage lock poisoned");
        let Some(seen) = state.last_seen.get(&(provider, model.to_string())) else {
            return ActiveUserCount::default();
        };

        let minutes_cutoff = now - Duration::seconds(RECENT_MINUTES_HORIZON_SECS);
        let days_cutoff = now - Duration::seconds(RECENT_DAYS_HORIZON_SECS);
        let recent_minutes = seen.values().filter(|t| **t > minutes_cutoff).count();
        let recent_days = seen.values().filter(|t| **t > days_cutoff).count();

        ActiveUserCount::new(
            u32::try_from(recent_minutes).unwrap_or(u32::MAX),
            u32::try_from(recent_days).unwrap_or(u32::MAX),
        )
    }

    /// Forget users idle past the day horizon and usage from past days.
    /// Returns how many last-seen entries were removed.
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let days_cutoff = now - Duration::seconds(RECENT_DAYS_HORIZON_SECS);
        let today = day_of(now);
        let mut state = self.state.write().expect("usage lock poisoned");

        let mut removed = 0;
        state.last_seen.retain(|_, seen| {
            let before = seen.len();
            seen.retain(|_, t| *t > days_cutoff);
            removed += before - seen.len();
            !seen.is_empty()
        });
        state.by_user.retain(|_, record| record.day == today);

        removed
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, s).unwrap()
    }

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage { input, output }
    }

    #[test]
    fn test_first_record_initializes_all_counters() {
        let tracker = UsageTracker::new();
        tracker.record_usage_at(1, Provider::Anthropic, "claude-3-opus", usage(100, 40), at(9, 0, 0));

        let got = tracker.get_usage_at(1, Provider::Anthropic, "claude-3-opus", at(9, 0, 30));
        assert_eq!(
            got,
            ModelUsage {
                requests_this_minute: 1,
                tokens_this_minute: 140,
                input_tokens_this_minute: 100,
                output_tokens_this_minute: 40,
                tokens_this_day: 140,
            }
        );
    }

    #[test]
    fn test_records_accumulate_within_window() {
        let tracker = UsageTracker::new();
        tracker.record_usage_at(1, Provider::OpenAi, "gpt-4", usage(10, 5), at(9, 0, 1));
        tracker.record_usage_at(1, Provider::OpenAi, "gpt-4", usage(20, 5), at(9, 0, 50));

        let got = tracker.get_usage_at(1, Provider::OpenAi, "gpt-4", at(9, 0, 59));
        assert_eq!(got.requests_this_minute, 2);
        assert_eq!(got.tokens_this_minute, 40);
        assert_eq!(got.input_tokens_this_minute, 30);
        assert_eq!(got.output_tokens_this_minute, 10);
    }

    #[test]
    fn test_minute_counters_roll_over_but_day_persists() {
        let tracker = UsageTracker::new();
        tracker.record_usage_at(1, Provider::OpenAi, "gpt-4", usage(10, 5), at(9, 0, 59));

        let next_minute = tracker.get_usage_at(1, Provider::OpenAi, "gpt-4", at(9, 1, 0));
        assert_eq!(next_minute.requests_this_minute, 0);
        assert_eq!(next_minute.tokens_this_minute, 0);
        assert_eq!(next_minute.tokens_this_day, 15);

        tracker.record_usage_at(1, Provider::OpenAi, "gpt-4", usage(1, 1), at(9, 1, 5));
        let got = tracker.get_usage_at(1, Provider::OpenAi, "gpt-4", at(9, 1, 6));
        assert_eq!(got.requests_this_minute, 1);
        assert_eq!(got.tokens_this_day, 17);
    }

    #[test]
    fn test_day_counter_rolls_over_at_utc_midnight() {
        let tracker = UsageTracker::new();
        tracker.record_usage_at(1, Provider::Copilot, "copilot-chat", usage(500, 500), at(23, 59, 0));

        let tomorrow = Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 1).unwrap();
        let got = tracker.get_usage_at(1, Provider::Copilot, "copilot-chat", tomorrow);
        assert_eq!(got, ModelUsage::default());
    }

    #[test]
    fn test_unknown_user_has_zero_usage() {
        let tracker = UsageTracker::new();
        assert_eq!(
            tracker.get_usage_at(99, Provider::Google, "gemini-pro", at(1, 0, 0)),
            ModelUsage::default()
        );
    }

    #[test]
    fn test_zero_token_record_counts_request() {
        let tracker = UsageTracker::new();
        tracker.record_usage_at(5, Provider::OpenAi, "gpt-4", TokenUsage::default(), at(9, 0, 0));
        let got = tracker.get_usage_at(5, Provider::OpenAi, "gpt-4", at(9, 0, 0));
        assert_eq!(got.requests_this_minute, 1);
        assert_eq!(got.tokens_this_day, 0);
    }

    #[test]
    fn test_active_users_counted_distinctly_per_model() {
        let tracker = UsageTracker::new();
        let now = at(12, 0, 0);
        tracker.record_usage_at(1, Provider::OpenAi, "gpt-4", usage(1, 1), now);
        tracker.record_usage_at(1, Provider::OpenAi, "gpt-4", usage(1, 1), now);
        tracker.record_usage_at(2, Provider::OpenAi, "gpt-4", usage(1, 1), now);
        tracker.record_usage_at(3, Provider::Anthropic, "claude-3-opus", usage(1, 1), now);

        let count = tracker.get_active_user_count_at(Provider::OpenAi, "gpt-4", now);
        assert_eq!(count, ActiveUserCount::new(2, 2));
    }

    #[test]
    fn test_active_users_expire_after_horizon() {
        let tracker = UsageTracker::new();
        tracker.record_usage_at(1, Provider::OpenAi, "gpt-4", usage(1, 1), at(12, 0, 0));
        tracker.record_usage_at(2, Provider::OpenAi, "gpt-4", usage(1, 1), at(12, 9, 0));

        let count = tracker.get_active_user_count_at(Provider::OpenAi, "gpt-4", at(12, 10, 0));
        assert_eq!(count.users_in_recent_minutes, 1);
        assert_eq!(count.users_in_recent_days, 2);
    }

    #[test]
    fn test_active_users_default_to_one() {
        let tracker = UsageTracker::new();
        let count = tracker.get_active_user_count_at(Provider::Google, "gemini-pro", at(0, 0, 0));
        assert_eq!(count, ActiveUserCount::new(1, 1));
    }

    #[test]
    fn test_prune_drops_stale_users() {
        let tracker = UsageTracker::new();
        let old = at(12, 0, 0) - Duration::days(8);
        tracker.record_usage_at(1, Provider::OpenAi, "gpt-4", usage(1, 1), old);
        tracker.record_usage_at(2, Provider::OpenAi, "gpt-4", usage(1, 1), at(12, 0, 0));

        assert_eq!(tracker.prune_at(at(12, 0, 0)), 1);
        let count = tracker.get_active_user_count_at(Provider::OpenAi, "gpt-4", at(12, 0, 0));
        assert_eq!(count, ActiveUserCount::new(1, 1));
        assert_eq!(
            tracker.get_usage_at(1, Provider::OpenAi, "gpt-4", at(12, 0, 0)),
            ModelUsage::default()
        );
    }
}

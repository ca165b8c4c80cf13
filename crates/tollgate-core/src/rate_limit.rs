//! Token-bucket rate limiter keyed by subject and limit name.
//!
//! Buckets are created lazily, full, on first use and refilled lazily on
//! each acquire. Refill is integral: only whole tokens are added, and the
//! leftover fraction of a refill period is carried forward by advancing
//! `last_refill` by whole periods only.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tollgate_types::rate_limit::RateLimitSpec;

/// State of one bucket. Only touched while its map shard is locked.
#[derive(Debug, Clone)]
pub struct RateBucket {
    capacity: u32,
    tokens: u32,
    refill_time_per_token: Duration,
    last_refill: Instant,
}

impl RateBucket {
    /// A full bucket for `spec`, last refilled at `now`.
    pub fn new(spec: &RateLimitSpec, now: Instant) -> Self {
        Self {
            capacity: spec.capacity(),
            tokens: spec.capacity(),
            refill_time_per_token: spec.refill_time_per_token(),
            last_refill: now,
        }
    }

    /// Refill, then take a token if one is available.
    pub fn acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let per_token = self.refill_time_per_token.as_nanos();
        let new_tokens = elapsed.as_nanos() / per_token;
        if new_tokens == 0 {
            return;
        }

        let room = u128::from(self.capacity - self.tokens);
        self.tokens += new_tokens.min(room) as u32;

        let remainder = elapsed.as_nanos() % per_token;
        self.last_refill = now - Duration::from_nanos(remainder as u64);
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// A bucket that has been idle long enough to be full again.
    fn is_full_at(&self, now: Instant) -> bool {
        let mut scratch = self.clone();
        scratch.refill(now);
        scratch.tokens == scratch.capacity
    }
}

/// Concurrent table of rate buckets.
///
/// Keys are `"{subject}:{spec name}"`. The map is sharded, so acquires for
/// different subjects rarely contend; an acquire on one key holds that
/// key's shard for the whole refill-and-take.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, RateBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take one token for `subject` under `spec`.
    pub fn acquire(&self, subject: &str, spec: &RateLimitSpec) -> bool {
        self.acquire_at(subject, spec, Instant::now())
    }

    /// Same as [`acquire`](Self::acquire) with an explicit clock reading.
    pub fn acquire_at(&self, subject: &str, spec: &RateLimitSpec, now: Instant) -> bool {
        let key = format!("{subject}:{}", spec.name());
        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| RateBucket::new(spec, now));
        let admitted = bucket.acquire(now);
        if !admitted {
            tracing::debug!(subject, limit = spec.name(), "rate bucket empty");
        }
        admitted
    }

    /// Number of buckets currently held.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets that are full and have not refilled for `older_than`.
    ///
    /// A full bucket behaves exactly like a freshly created one, so
    /// removing it does not change any later admission decision.
    pub fn evict_idle(&self, older_than: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let idle = now.saturating_duration_since(bucket.last_refill);
            !(idle >= older_than && bucket.is_full_at(now))
        });
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle rate buckets");
        }
        evicted
    }
}

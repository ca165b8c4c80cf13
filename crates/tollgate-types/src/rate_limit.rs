//! Named token-bucket limit descriptors.

use std::time::Duration;

use crate::error::RateLimitSpecError;

/// Immutable description of a token-bucket limit.
///
/// `name` namespaces the buckets created from this spec, so two specs with
/// the same name share buckets for a given subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSpec {
    name: String,
    capacity: u32,
    refill_window: Duration,
}

impl RateLimitSpec {
    /// Validate and build a spec. Capacity and window must be non-zero, and
    /// the window must be long enough to give every token a non-zero refill
    /// time.
    pub fn new(
        name: impl Into<String>,
        capacity: u32,
        refill_window: Duration,
    ) -> Result<Self, RateLimitSpecError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RateLimitSpecError::EmptyName);
        }
        if capacity == 0 {
            return Err(RateLimitSpecError::ZeroCapacity(name));
        }
        if refill_window.is_zero() || refill_window / capacity == Duration::ZERO {
            return Err(RateLimitSpecError::WindowTooShort(name));
        }
        Ok(Self {
            name,
            capacity,
            refill_window,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_window(&self) -> Duration {
        self.refill_window
    }

    /// Time needed to regain a single token.
    pub fn refill_time_per_token(&self) -> Duration {
        self.refill_window / self.capacity
    }
}

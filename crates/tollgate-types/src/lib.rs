//! Shared domain types for the Tollgate LLM gateway.
//!
//! Access tokens, the model catalog entry, usage counters, rate limit
//! descriptors, configuration and the error taxonomy used by every other
//! crate in the workspace.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod rate_limit;
pub mod token;

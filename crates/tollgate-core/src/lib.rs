//! Business logic and port definitions for Tollgate.
//!
//! This crate defines the `UpstreamClient` and `SpendSource` ports that the
//! infrastructure layer implements. It depends only on `tollgate-types` --
//! never on `tollgate-infra` or any HTTP client.

pub mod authorization;
pub mod catalog;
pub mod gateway;
pub mod rate_limit;
pub mod upstream;
pub mod usage;

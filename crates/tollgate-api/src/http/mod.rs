//! HTTP layer for the gateway.
//!
//! Axum routes for completions and model listing, bearer token
//! authentication, and the JSON error envelope.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;

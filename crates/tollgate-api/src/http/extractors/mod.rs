//! Request extractors for authentication and client region.

pub mod auth;
pub mod country;

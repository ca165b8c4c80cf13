//! Infrastructure layer for Tollgate.
//!
//! Contains implementations of the ports defined in `tollgate-core`:
//! the reqwest-based provider router, access token signing, RSA string
//! sealing, and configuration/credential loading.

pub mod config;
pub mod crypto;
pub mod provider;
pub mod token;

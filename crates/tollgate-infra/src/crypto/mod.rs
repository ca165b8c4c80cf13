//! Cryptographic operations for Tollgate.
//!
//! - `sealed`: RSA sealing of strings for a private key holder

pub mod sealed;

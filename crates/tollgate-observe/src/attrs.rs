//! Span attribute names for gateway request instrumentation.
//!
//! Field names declared on the `completion` request span and
//! filled in with `Span::record` once the value is known. Provider and
//! model names follow the OTel GenAI semantic conventions.

/// Numeric user id from the verified access token.
pub const USER_ID: &str = "tollgate.user_id";

/// Upstream provider (e.g., "anthropic").
pub const PROVIDER: &str = "gen_ai.provider.name";

/// Model name as requested by the client.
pub const REQUEST_MODEL: &str = "gen_ai.request.model";

/// Edge-reported country code, when present.
pub const COUNTRY_CODE: &str = "tollgate.country_code";

/// Lifecycle phase the request reached.
pub const PHASE: &str = "tollgate.phase";

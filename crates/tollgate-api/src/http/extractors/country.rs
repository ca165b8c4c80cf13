//! Client country from the edge proxy's `CF-IPCountry` header.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use tollgate_core::authorization::UNKNOWN_COUNTRY_CODE;

pub const COUNTRY_HEADER: &str = "cf-ipcountry";

/// The reported country code. `None` when the header is absent, empty or
/// the edge's unknown marker.
pub struct CountryCode(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for CountryCode {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let code = parts
            .headers
            .get(COUNTRY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_uppercase())
            .filter(|v| !v.is_empty() && v != UNKNOWN_COUNTRY_CODE);
        Ok(CountryCode(code))
    }
}

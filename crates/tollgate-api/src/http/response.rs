//! Envelope format for error responses.
//!
//! ```json
//! {
//!   "data": null,
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 0 },
//!   "errors": [{ "code": "RATE_LIMIT_EXCEEDED", "message": "..." }]
//! }
//! ```

use serde::Serialize;

/// Envelope wrapping an error list. `data` is always null.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub data: Option<()>,
    pub meta: ApiMeta,
    pub errors: Vec<ApiErrorDetail>,
}

/// Metadata included in every envelope.
#[derive(Debug, Serialize)]
pub struct ApiMeta {
    /// Unique request identifier for tracing.
    pub request_id: String,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
    /// Response time in milliseconds.
    pub response_time_ms: u64,
}

/// Individual error detail.
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: String) -> Self {
        Self {
            data: None,
            meta: ApiMeta {
                request_id: uuid::Uuid::new_v4().to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                response_time_ms: 0,
            },
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message,
            }],
        }
    }
}

//! Upstream provider routing.
//!
//! [`ProviderRouter`] implements the
//! [`UpstreamClient`](tollgate_core::upstream::UpstreamClient) port for the
//! Copilot, OpenAI, Anthropic and Google AI APIs.

pub mod aliases;
pub mod router;
pub mod streaming;

pub use router::ProviderRouter;

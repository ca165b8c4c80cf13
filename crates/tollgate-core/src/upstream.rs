//! Port for forwarding an authorized request to a model provider.
//!
//! Implemented by `ProviderRouter` in tollgate-infra. Core only sees the
//! raw response body as a byte stream; it never parses provider formats
//! beyond the usage fields sniffed by the gateway.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde_json::Value;

use tollgate_types::error::DispatchError;
use tollgate_types::provider::Provider;

/// A single-pass upstream response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DispatchError>> + Send + 'static>>;

/// Backend that sends provider-native payloads upstream.
///
/// Uses native async fn in traits (RPITIT). The returned body stream is
/// boxed so callers can wrap it without naming the concrete type.
pub trait UpstreamClient: Send + Sync {
    /// Send `payload` to `provider` and return the live body stream once the
    /// upstream has answered with a success status.
    fn dispatch(
        &self,
        provider: Provider,
        payload: Value,
        is_staff: bool,
    ) -> impl Future<Output = Result<ByteStream, DispatchError>> + Send;
}

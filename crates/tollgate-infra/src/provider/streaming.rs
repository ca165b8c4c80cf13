//! Turning an upstream response into a pass-through body stream.

use futures_util::TryStreamExt;

use tollgate_core::upstream::ByteStream;
use tollgate_types::error::DispatchError;

/// Check the upstream status and hand back the live body.
///
/// A non-success status is returned as [`DispatchError::Upstream`] with
/// the body text verbatim, so the caller can relay the provider's own
/// error to the client. The returned stream is single-pass.
pub async fn process_streaming_response(
    response: reqwest::Response,
) -> Result<ByteStream, DispatchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "upstream returned an error status");
        return Err(DispatchError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    Ok(Box::pin(response.bytes_stream().map_err(|e| {
        DispatchError::Transport(format!("upstream body read failed: {e}"))
    })))
}

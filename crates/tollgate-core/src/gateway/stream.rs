//! Pass-through body stream that accounts token usage.
//!
//! Bytes are forwarded unmodified. On the side, complete SSE `data:` lines
//! are parsed for the usage fields each provider reports, and exactly one
//! usage entry is recorded when the stream finishes, fails or is dropped.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;

use tollgate_types::error::DispatchError;
use tollgate_types::model::TokenUsage;
use tollgate_types::provider::Provider;

use crate::gateway::RequestPhase;
use crate::upstream::ByteStream;
use crate::usage::UsageTracker;

/// Longest partial line kept while waiting for its terminating newline.
const MAX_PENDING_LINE: usize = 1024 * 1024;

/// Records one call's usage exactly once, in the usage window the call
/// was admitted in.
///
/// Dropping an unfinished recorder records what was seen so far, which is
/// how a client disconnect is accounted.
#[derive(Debug)]
pub(crate) struct UsageRecorder {
    tracker: Arc<UsageTracker>,
    user_id: u64,
    provider: Provider,
    model: String,
    admitted_at: DateTime<Utc>,
    seen: TokenUsage,
    done: bool,
}

impl UsageRecorder {
    pub(crate) fn new(
        tracker: Arc<UsageTracker>,
        user_id: u64,
        provider: Provider,
        model: String,
        admitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tracker,
            user_id,
            provider,
            model,
            admitted_at,
            seen: TokenUsage::default(),
            done: false,
        }
    }

    fn observe(&mut self, usage: TokenUsage) {
        self.seen.input = self.seen.input.max(usage.input);
        self.seen.output = self.seen.output.max(usage.output);
    }

    pub(crate) fn finish(&mut self, phase: RequestPhase) {
        if self.done {
            return;
        }
        self.done = true;
        self.tracker.record_usage_at(
            self.user_id,
            self.provider,
            &self.model,
            self.seen,
            self.admitted_at,
        );
        tracing::debug!(
            user_id = self.user_id,
            provider = %self.provider,
            model = %self.model,
            %phase,
            input_tokens = self.seen.input,
            output_tokens = self.seen.output,
            "request finished"
        );
    }
}

impl Drop for UsageRecorder {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(
                user_id = self.user_id,
                provider = %self.provider,
                "response stream dropped before completion"
            );
            self.finish(RequestPhase::Completed);
        }
    }
}

pin_project! {
    /// Upstream body wrapper returned by `Gateway::perform_completion`.
    pub struct UsageRecordingStream {
        #[pin]
        inner: ByteStream,
        pending: Vec<u8>,
        recorder: UsageRecorder,
    }
}

impl UsageRecordingStream {
    pub(crate) fn new(inner: ByteStream, recorder: UsageRecorder) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            recorder,
        }
    }
}

impl std::fmt::Debug for UsageRecordingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecordingStream")
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

impl Stream for UsageRecordingStream {
    type Item = Result<Bytes, DispatchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                scan_chunk(this.pending, &chunk, this.recorder);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(error = %e, "upstream body failed mid-stream");
                this.recorder.finish(RequestPhase::Failed);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if !this.pending.is_empty() {
                    let rest = std::mem::take(this.pending);
                    scan_line(&rest, this.recorder);
                }
                this.recorder.finish(RequestPhase::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

fn scan_chunk(pending: &mut Vec<u8>, chunk: &[u8], recorder: &mut UsageRecorder) {
    pending.extend_from_slice(chunk);
    let mut start = 0;
    while let Some(offset) = pending[start..].iter().position(|b| *b == b'\n') {
        let end = start + offset;
        scan_line(&pending[start..end], recorder);
        start = end + 1;
    }
    pending.drain(..start);
    if pending.len() > MAX_PENDING_LINE {
        pending.clear();
    }
}

fn scan_line(line: &[u8], recorder: &mut UsageRecorder) {
    let Ok(line) = std::str::from_utf8(line) else {
        return;
    };
    let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
        return;
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return;
    }
    if let Ok(event) = serde_json::from_str::<Value>(data) {
        if let Some(usage) = extract_usage(&event) {
            recorder.observe(usage);
        }
    }
}

/// Pull token counts from one streamed event.
///
/// Understands Anthropic (`usage` or `message.usage` with
/// `input_tokens`/`output_tokens`), OpenAI-compatible (`usage` with
/// `prompt_tokens`/`completion_tokens`) and Google (`usageMetadata` with
/// `promptTokenCount`/`candidatesTokenCount`).
pub fn extract_usage(event: &Value) -> Option<TokenUsage> {
    let field = |v: &Value, key: &str| v.get(key).and_then(Value::as_u64);

    if let Some(meta) = event.get("usageMetadata") {
        return Some(TokenUsage {
            input: field(meta, "promptTokenCount").unwrap_or(0),
            output: field(meta, "candidatesTokenCount").unwrap_or(0),
        });
    }

    let usage = event
        .get("usage")
        .filter(|u| u.is_object())
        .or_else(|| event.get("message").and_then(|m| m.get("usage")))?;
    let input = field(usage, "input_tokens").or_else(|| field(usage, "prompt_tokens"));
    let output = field(usage, "output_tokens").or_else(|| field(usage, "completion_tokens"));
    if input.is_none() && output.is_none() {
        return None;
    }
    Some(TokenUsage {
        input: input.unwrap_or(0),
        output: output.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use futures_util::{StreamExt, stream};
    use serde_json::json;

    use super::*;

    fn body(chunks: Vec<Result<&'static str, DispatchError>>) -> ByteStream {
        Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| Bytes::from_static(s.as_bytes()))),
        ))
    }

    fn admitted_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 9, 30, 0).unwrap()
    }

    fn recording(
        tracker: &Arc<UsageTracker>,
        chunks: Vec<Result<&'static str, DispatchError>>,
    ) -> UsageRecordingStream {
        let recorder = UsageRecorder::new(
            Arc::clone(tracker),
            9,
            Provider::Anthropic,
            "claude-3-opus".to_string(),
            admitted_at(),
        );
        UsageRecordingStream::new(body(chunks), recorder)
    }

    fn recorded(tracker: &UsageTracker) -> tollgate_types::model::ModelUsage {
        tracker.get_usage_at(9, Provider::Anthropic, "claude-3-opus", admitted_at())
    }

    #[test]
    fn test_extract_usage_per_provider() {
        let anthropic_start = json!({"type": "message_start", "message": {"usage": {"input_tokens": 12, "output_tokens": 1}}});
        assert_eq!(
            extract_usage(&anthropic_start),
            Some(TokenUsage { input: 12, output: 1 })
        );

        let anthropic_delta = json!({"type": "message_delta", "usage": {"output_tokens": 40}});
        assert_eq!(
            extract_usage(&anthropic_delta),
            Some(TokenUsage { input: 0, output: 40 })
        );

        let openai = json!({"choices": [], "usage": {"prompt_tokens": 7, "completion_tokens": 3}});
        assert_eq!(
            extract_usage(&openai),
            Some(TokenUsage { input: 7, output: 3 })
        );

        let google = json!({"usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 9}});
        assert_eq!(
            extract_usage(&google),
            Some(TokenUsage { input: 4, output: 9 })
        );

        assert_eq!(extract_usage(&json!({"choices": [{"delta": {}}]})), None);
        assert_eq!(extract_usage(&json!({"usage": null})), None);
    }

    #[tokio::test]
    async fn test_bytes_pass_through_and_usage_recorded_once() {
        let tracker = Arc::new(UsageTracker::new());
        let stream = recording(
            &tracker,
            vec![
                Ok("event: message_start\ndata: {\"message\":{\"usage\":{\"input_tokens\":10,"),
                Ok("\"output_tokens\":1}}}\n\n"),
                Ok("data: {\"usage\":{\"output_tokens\":25}}\n\n"),
            ],
        );

        let collected: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        let joined: Vec<u8> = collected.concat();
        assert!(joined.starts_with(b"event: message_start\n"));
        assert!(joined.ends_with(b"{\"usage\":{\"output_tokens\":25}}\n\n"));

        let usage = recorded(&tracker);
        assert_eq!(usage.requests_this_minute, 1);
        assert_eq!(usage.input_tokens_this_minute, 10);
        assert_eq!(usage.output_tokens_this_minute, 25);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline_is_scanned() {
        let tracker = Arc::new(UsageTracker::new());
        let stream = recording(
            &tracker,
            vec![Ok("data: {\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4}}")],
        );
        let _: Vec<_> = stream.collect().await;
        assert_eq!(recorded(&tracker).tokens_this_minute, 7);
    }

    #[tokio::test]
    async fn test_upstream_error_records_once() {
        let tracker = Arc::new(UsageTracker::new());
        let mut stream = recording(
            &tracker,
            vec![
                Ok("data: {\"usage\":{\"input_tokens\":5}}\n"),
                Err(DispatchError::Transport("reset".to_string())),
            ],
        );
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        drop(stream);

        let usage = recorded(&tracker);
        assert_eq!(usage.requests_this_minute, 1);
        assert_eq!(usage.input_tokens_this_minute, 5);
    }

    #[tokio::test]
    async fn test_drop_before_end_records_partial_usage() {
        let tracker = Arc::new(UsageTracker::new());
        let mut stream = recording(
            &tracker,
            vec![
                Ok("data: {\"message\":{\"usage\":{\"input_tokens\":8}}}\n"),
                Ok("data: {\"usage\":{\"output_tokens\":2}}\n"),
            ],
        );
        assert!(stream.next().await.is_some());
        drop(stream);

        let usage = recorded(&tracker);
        assert_eq!(usage.requests_this_minute, 1);
        assert_eq!(usage.input_tokens_this_minute, 8);
        assert_eq!(usage.output_tokens_this_minute, 0);
    }

    #[test]
    fn test_oversized_partial_line_is_discarded() {
        let tracker = Arc::new(UsageTracker::new());
        let mut recorder = UsageRecorder::new(
            tracker,
            1,
            Provider::OpenAi,
            "gpt-4".to_string(),
            admitted_at(),
        );
        let mut pending = Vec::new();
        let blob = vec![b'x'; MAX_PENDING_LINE + 1];
        scan_chunk(&mut pending, &blob, &mut recorder);
        assert!(pending.is_empty());
        recorder.finish(RequestPhase::Completed);
    }
}

//! # SSE Framing
//!
//! Frames a [`ChatStream`] as OpenAI-compatible server-sent events.
//!
//! - one `data: <chunk>` event per upstream delta (content or tool calls), the
//!   first carrying the assistant role
//! - on a clean end, a closing chunk with the finish reason, then `data: [DONE]`
//! - on a failure, one `event: error` with the detail, and no `[DONE]`

use crate::{
    orchestrator::ChatStream,
    schemas::{ChatStreamChunk, FinishReason},
    streaming::translator::DONE_SENTINEL,
};
use axum::response::{
    sse::{Event, KeepAlive},
    Sse,
};
use futures_util::stream::{self, Stream};
use serde_json::json;
use std::convert::Infallible;
use tracing::{info, warn};

enum Phase {
    Streaming { stream: ChatStream, first: bool },
    Done,
    Closed,
}

/// Build an event from a chunk.
pub fn chunk_event(chunk: &ChatStreamChunk) -> Event {
    match serde_json::to_string(chunk) {
        Ok(data) => Event::default().data(data),
        Err(err) => error_event(&format!("failed to encode chunk: {}", err)),
    }
}

/// Final `[DONE]` event.
pub fn done_event() -> Event {
    Event::default().data(DONE_SENTINEL)
}

/// Error event sent when the stream fails after it started.
pub fn error_event(detail: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "detail": detail }).to_string())
}

/// Events for one chat stream, pulled lazily one fragment at a time.
pub fn chat_events(stream: ChatStream) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream::unfold(Phase::Streaming { stream, first: true }, |phase| async move {
        match phase {
            Phase::Streaming { mut stream, first } => match stream.next_delta().await {
                Ok(Some(delta)) => {
                    let chunk = ChatStreamChunk::delta(stream.id(), stream.model(), stream.created(), delta, first);
                    Some((Ok(chunk_event(&chunk)), Phase::Streaming { stream, first: false }))
                }
                Ok(None) => {
                    let reason = stream.finish_reason().cloned().unwrap_or(FinishReason::Stop);
                    info!(
                        stream_id = stream.id(),
                        fragments = stream.fragments(),
                        finish_reason = reason.as_str(),
                        "Chat stream completed"
                    );
                    let chunk = ChatStreamChunk::finish(stream.id(), stream.model(), stream.created(), reason);
                    Some((Ok(chunk_event(&chunk)), Phase::Done))
                }
                Err(err) => {
                    warn!(
                        stream_id = stream.id(),
                        fragments = stream.fragments(),
                        error = %err,
                        "Chat stream failed"
                    );
                    Some((Ok(error_event(&err.detail())), Phase::Closed))
                }
            },
            Phase::Done => Some((Ok(done_event()), Phase::Closed)),
            Phase::Closed => None,
        }
    })
}

/// Wrap a chat stream into an SSE response body.
pub fn sse_response(stream: ChatStream) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    Sse::new(chat_events(stream)).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::LineStream;
    use axum::response::IntoResponse;
    use bytes::Bytes;

    fn chat_stream(body: &'static str) -> ChatStream {
        ChatStream::new("m1", LineStream::from_chunks(vec![Ok(Bytes::from_static(body.as_bytes()))]))
    }

    async fn render(stream: ChatStream) -> String {
        let response = Sse::new(chat_events(stream)).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn data_lines(body: &str) -> Vec<&str> {
        body.lines()
            .filter_map(|l| l.strip_prefix("data:").map(str::trim_start))
            .collect()
    }

    fn has_error_event(body: &str) -> bool {
        body.lines()
            .any(|l| l.strip_prefix("event:").map(str::trim) == Some("error"))
    }

    #[tokio::test]
    async fn test_clean_stream_ends_with_done() {
        let body = render(chat_stream(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        )))
        .await;

        let data = data_lines(&body);
        assert_eq!(data.len(), 4);

        let first: serde_json::Value = serde_json::from_str(data[0]).unwrap();
        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(first["model"], "m1");
        assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(first["choices"][0]["delta"]["content"], "Hel");

        let second: serde_json::Value = serde_json::from_str(data[1]).unwrap();
        assert!(second["choices"][0]["delta"].get("role").is_none());
        assert_eq!(second["id"], first["id"]);

        let closing: serde_json::Value = serde_json::from_str(data[2]).unwrap();
        assert_eq!(closing["choices"][0]["finish_reason"], "stop");
        assert_eq!(data[3], "[DONE]");
        assert!(!has_error_event(&body));
    }

    #[tokio::test]
    async fn test_abnormal_end_sends_error_without_done() {
        let body = render(chat_stream("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n")).await;

        assert!(has_error_event(&body));
        assert!(body.contains("without [DONE]"));
        assert!(!data_lines(&body).contains(&"[DONE]"));
    }
}

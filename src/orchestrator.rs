//! # Chat Orchestrator
//!
//! Validates a chat request, calls the upstream in buffered or streamed mode and
//! wraps every failure into a [`ServiceError`] exactly once.

use crate::{
    error::ServiceError,
    schemas::{ChatRequest, ChatResponse, Delta, FinishReason},
    streaming::StreamTranslator,
    upstream::{ChatModel, LineStream},
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a chat request.
pub enum ChatOutcome {
    Complete(ChatResponse),
    Stream(ChatStream),
}

impl std::fmt::Debug for ChatOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatOutcome::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
            ChatOutcome::Stream(stream) => f.debug_tuple("Stream").field(&stream.id).finish(),
        }
    }
}

/// A streamed completion in progress.
///
/// Pull fragments with [`next_fragment`](Self::next_fragment). Dropping the
/// stream drops the upstream response and releases its connection.
pub struct ChatStream {
    id: String,
    model: String,
    created: i64,
    translator: StreamTranslator<LineStream>,
}

impl ChatStream {
    pub fn new(model: impl Into<String>, lines: LineStream) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            model: model.into(),
            created: unix_timestamp(),
            translator: StreamTranslator::new(lines),
        }
    }

    /// `Ok(Some)` for the next fragment, `Ok(None)` on a clean end.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, ServiceError> {
        self.translator.next_fragment().await.map_err(ServiceError::from)
    }

    /// Like [`next_fragment`](Self::next_fragment), but also yields tool-call deltas.
    pub async fn next_delta(&mut self) -> Result<Option<Delta>, ServiceError> {
        self.translator.next_delta().await.map_err(ServiceError::from)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    /// Finish reason reported upstream, if any was seen yet.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.translator.finish_reason()
    }

    pub fn fragments(&self) -> usize {
        self.translator.fragments()
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}

/// # Chat Orchestrator
#[derive(Clone)]
pub struct ChatOrchestrator {
    model: Arc<dyn ChatModel>,
}

impl ChatOrchestrator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Handle one chat request.
    ///
    /// Missing model or messages fail with [`ServiceError::NotFound`] before any
    /// upstream call. Upstream failures are not retried.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatOutcome, ServiceError> {
        request.check_required().map_err(ServiceError::NotFound)?;

        info!(
            model = %request.model,
            backend = self.model.name(),
            stream = request.stream,
            message_count = request.messages.len(),
            "Handling chat request"
        );

        if request.stream {
            let lines = self.model.stream_complete(&request).await?;
            let stream = ChatStream::new(request.model, lines);
            debug!(stream_id = %stream.id, "Upstream stream opened");
            Ok(ChatOutcome::Stream(stream))
        } else {
            let response = self.model.complete(&request).await?;
            Ok(ChatOutcome::Complete(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::UpstreamError,
        schemas::Message,
        upstream::parse_completion,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HELLO: &str = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}]}"#;

    enum Reply {
        Body(&'static str),
        Status(u16, &'static str),
        Lines(Vec<&'static str>),
    }

    struct FakeModel {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl FakeModel {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn error(&self) -> Option<UpstreamError> {
            match &self.reply {
                Reply::Status(status, body) => Some(UpstreamError::Http {
                    status: *status,
                    body: body.to_string(),
                }),
                _ => None,
            }
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.error() {
                return Err(err);
            }
            match &self.reply {
                Reply::Body(body) => parse_completion(body.as_bytes()),
                _ => Err(UpstreamError::Protocol("not a buffered fake".into())),
            }
        }

        async fn stream_complete(&self, _request: &ChatRequest) -> Result<LineStream, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.error() {
                return Err(err);
            }
            match &self.reply {
                Reply::Lines(lines) => {
                    let body = lines.iter().map(|l| format!("{}\n", l)).collect::<String>();
                    Ok(LineStream::from_chunks(vec![Ok(Bytes::from(body))]))
                }
                _ => Err(UpstreamError::Protocol("not a streaming fake".into())),
            }
        }
    }

    fn request(stream: bool) -> ChatRequest {
        ChatRequest {
            model: "m1".into(),
            messages: vec![Message::user("hi")],
            stream,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_buffered_response_is_returned_unchanged() {
        let fake = FakeModel::new(Reply::Body(HELLO));
        let orchestrator = ChatOrchestrator::new(fake.clone());

        let outcome = orchestrator.handle(request(false)).await.unwrap();
        let ChatOutcome::Complete(response) = outcome else {
            panic!("expected a buffered outcome");
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::from_str::<serde_json::Value>(HELLO).unwrap()
        );
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_messages_never_reach_upstream() {
        let fake = FakeModel::new(Reply::Body(HELLO));
        let orchestrator = ChatOrchestrator::new(fake.clone());

        let mut req = request(false);
        req.messages.clear();
        let err = orchestrator.handle(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let mut req = request(true);
        req.model = String::new();
        assert!(matches!(orchestrator.handle(req).await, Err(ServiceError::NotFound(_))));

        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_status_is_wrapped_once() {
        let fake = FakeModel::new(Reply::Status(429, "rate limited"));
        let orchestrator = ChatOrchestrator::new(fake.clone());

        for stream in [false, true] {
            let err = orchestrator.handle(request(stream)).await.unwrap_err();
            match err {
                ServiceError::Upstream { detail } => {
                    assert!(detail.contains("429"));
                    assert!(detail.contains("rate limited"));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn test_stream_fragments_and_abnormal_end() {
        let fake = FakeModel::new(Reply::Lines(vec![
            r#"data: {"choices":[{"delta":{"content":"a"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"b"}}]}"#,
        ]));
        let orchestrator = ChatOrchestrator::new(fake);

        let ChatOutcome::Stream(mut stream) = orchestrator.handle(request(true)).await.unwrap() else {
            panic!("expected a stream");
        };
        assert!(stream.id().starts_with("chatcmpl-"));
        assert_eq!(stream.model(), "m1");
        assert_eq!(stream.next_fragment().await.unwrap().as_deref(), Some("a"));
        assert_eq!(stream.next_fragment().await.unwrap().as_deref(), Some("b"));

        let err = stream.next_fragment().await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream { .. }));
        assert!(err.detail().contains("without [DONE]"));
    }

    #[tokio::test]
    async fn test_stream_clean_end_keeps_finish_reason() {
        let fake = FakeModel::new(Reply::Lines(vec![
            r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"length"}]}"#,
            "data: [DONE]",
        ]));
        let orchestrator = ChatOrchestrator::new(fake);

        let ChatOutcome::Stream(mut stream) = orchestrator.handle(request(true)).await.unwrap() else {
            panic!("expected a stream");
        };
        assert_eq!(stream.next_fragment().await.unwrap().as_deref(), Some("hi"));
        assert!(stream.next_fragment().await.unwrap().is_none());
        assert_eq!(stream.finish_reason(), Some(&FinishReason::Length));
        assert_eq!(stream.fragments(), 1);
    }
}

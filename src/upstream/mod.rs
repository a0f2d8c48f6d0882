//! # Upstream Client
//!
//! Thin client for an OpenAI-compatible `/chat/completions` endpoint (OpenRouter
//! by default). It owns the pooled HTTP connection, injects the bearer token and
//! moves raw requests and responses. It does not interpret streamed events:
//! [`ChatModel::stream_complete`] only frames the body into lines.
//!
//! Pre-flight failures of a streamed call (error status, refused connection,
//! header timeout) come back as the `Err` of `stream_complete`. Failures after
//! the body started are yielded as an `Err` item by the returned [`LineStream`].

pub mod lines;

pub use lines::LineStream;

use crate::{
    config::Config,
    core::http_client::{HttpClientBuilder, HttpClientError},
    error::UpstreamError,
    schemas::{ChatRequest, ChatResponse},
};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Chat inference capability.
///
/// Implemented by [`UpstreamClient`] in production and by fakes in tests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Buffered completion.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, UpstreamError>;

    /// Streamed completion, exposed as raw body lines.
    async fn stream_complete(&self, request: &ChatRequest) -> Result<LineStream, UpstreamError>;
}

/// # Upstream Client
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct UpstreamClient {
    /// Base URL without trailing slash (e.g. "https://openrouter.ai/api/v1")
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: Client,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the key
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url)
            .field("has_auth", &self.has_auth())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key: api_key.into(),
            timeout,
            client,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, HttpClientError> {
        let client = HttpClientBuilder::from_config(config).build()?;
        Ok(Self::new(
            config.upstream_base_url.clone(),
            config.upstream_api_key.clone(),
            config.request_timeout(),
            client,
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_auth(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn post(&self, body: &ChatRequest) -> RequestBuilder {
        let mut builder = self.client.post(self.completions_url()).json(body);
        if self.has_auth() {
            builder = builder.bearer_auth(&self.api_key);
        }
        builder
    }

    fn timed_out(&self, what: &str) -> UpstreamError {
        UpstreamError::Transport(format!("{} not received within {}s", what, self.timeout.as_secs_f64()))
    }
}

#[async_trait]
impl ChatModel for UpstreamClient {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, UpstreamError> {
        log_request(&request.model, request.messages.len(), false);
        let start = Instant::now();
        let body = request.for_upstream(false);

        let call = async {
            let response = self.post(&body).send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, UpstreamError>((status, bytes))
        };
        let (status, bytes) = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| self.timed_out("complete response"))??;

        log_response(&request.model, status, start);

        if let Some(err) = status_error(status, &bytes) {
            return Err(err);
        }

        parse_completion(&bytes)
    }

    async fn stream_complete(&self, request: &ChatRequest) -> Result<LineStream, UpstreamError> {
        log_request(&request.model, request.messages.len(), true);
        let start = Instant::now();
        let body = request.for_upstream(true);

        let response = tokio::time::timeout(
            self.timeout,
            self.post(&body)
                .header(header::ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| self.timed_out("response headers"))??;

        let status = response.status();
        log_response(&request.model, status, start);

        if status.as_u16() >= 400 {
            let bytes = tokio::time::timeout(self.timeout, response.bytes())
                .await
                .map_err(|_| self.timed_out("error body"))??;
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(LineStream::from_response(response))
    }
}

fn status_error(status: StatusCode, body: &[u8]) -> Option<UpstreamError> {
    if status.as_u16() >= 400 {
        let body = String::from_utf8_lossy(body).into_owned();
        debug!(status = status.as_u16(), body = %body, "upstream error response");
        Some(UpstreamError::Http {
            status: status.as_u16(),
            body,
        })
    } else {
        None
    }
}

/// Parse a buffered completion body.
///
/// The body must be JSON with a `choices[0].message.content` key; its value may be
/// `null` (tool-call-only answers) but the key itself must be there.
pub fn parse_completion(body: &[u8]) -> Result<ChatResponse, UpstreamError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| UpstreamError::Protocol(format!("response body is not JSON: {}", e)))?;

    let has_content = value
        .pointer("/choices/0/message")
        .and_then(Value::as_object)
        .is_some_and(|message| message.contains_key("content"));
    if !has_content {
        return Err(UpstreamError::Protocol(
            "response has no choices[0].message.content".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| UpstreamError::Protocol(format!("unexpected completion shape: {}", e)))
}

fn log_request(model: &str, message_count: usize, stream: bool) {
    debug!(
        model = model,
        message_count = message_count,
        stream = stream,
        "Forwarding chat completion upstream"
    );
}

fn log_response(model: &str, status: StatusCode, start: Instant) {
    debug!(
        model = model,
        status = status.as_u16(),
        response_time_ms = start.elapsed().as_millis() as u64,
        "Upstream responded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_base_url() {
        let client = UpstreamClient::new(
            "https://openrouter.ai/api/v1/",
            "sk-test",
            Duration::from_secs(5),
            Client::new(),
        );
        assert_eq!(client.base_url(), "https://openrouter.ai/api/v1");
        assert_eq!(client.completions_url(), "https://openrouter.ai/api/v1/chat/completions");
        assert!(client.has_auth());
        assert_eq!(client.name(), "openrouter");
        assert!(!format!("{:?}", client).contains("sk-test"));
    }

    #[test]
    fn test_from_config() {
        let client = UpstreamClient::from_config(&Config::for_test()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000/api/v1");
    }

    #[test]
    fn test_parse_completion_ok() {
        let body = br#"{"choices":[{"index":0,"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}]}"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.first_content(), Some("hello"));
    }

    #[test]
    fn test_parse_completion_null_content_with_tool_calls() {
        let body = br#"{"choices":[{"index":0,"message":{"role":"assistant","content":null,"tool_calls":[]},"finish_reason":"tool_calls"}]}"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.first_content(), None);
    }

    #[test]
    fn test_parse_completion_missing_content_is_protocol_error() {
        for body in [
            &br#"{"choices":[]}"#[..],
            br#"{"choices":[{"message":{"role":"assistant"}}]}"#,
            br#"{"error":{"message":"overloaded"}}"#,
            b"not json",
        ] {
            assert!(matches!(parse_completion(body), Err(UpstreamError::Protocol(_))));
        }
    }

    #[test]
    fn test_status_error() {
        assert!(status_error(StatusCode::OK, b"{}").is_none());
        match status_error(StatusCode::TOO_MANY_REQUESTS, b"slow down") {
            Some(UpstreamError::Http { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

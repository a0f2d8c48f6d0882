//! # Stream Translator
//!
//! Turns the raw line sequence of a streamed upstream completion into content
//! fragments, one pull at a time.

use crate::{
    error::{StreamError, UpstreamError},
    schemas::{Delta, FinishReason},
};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

/// Sentinel that ends a well-formed stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Classification of one upstream line.
#[derive(Debug, PartialEq, Eq)]
pub enum EventLine<'a> {
    /// `data:` line with the payload after the prefix
    Data(&'a str),
    /// `data: [DONE]`
    Done,
    /// Empty line between events
    Blank,
    /// `: keep-alive` style comment
    Comment,
    /// Anything else (`event:`, `id:`, stray text)
    Other,
}

impl<'a> EventLine<'a> {
    pub fn classify(line: &'a str) -> Self {
        if line.trim().is_empty() {
            return EventLine::Blank;
        }
        if line.starts_with(':') {
            return EventLine::Comment;
        }
        match line.strip_prefix("data:") {
            Some(rest) => {
                let payload = rest.strip_prefix(' ').unwrap_or(rest);
                if payload.trim() == DONE_SENTINEL {
                    EventLine::Done
                } else {
                    EventLine::Data(payload)
                }
            }
            None => EventLine::Other,
        }
    }
}

/// What one parsed event contributes.
#[derive(Debug, Default, PartialEq)]
struct ParsedEvent {
    delta: Delta,
    finish_reason: Option<FinishReason>,
}

fn parse_event(payload: &str) -> Result<ParsedEvent, StreamError> {
    let value: Value = serde_json::from_str(payload).map_err(|e| StreamError::MalformedLine {
        line: payload.to_string(),
        reason: e.to_string(),
    })?;

    let choice = value.pointer("/choices/0");
    let content = choice
        .and_then(|c| c.pointer("/delta/content"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let tool_calls = choice
        .and_then(|c| c.pointer("/delta/tool_calls"))
        .filter(|calls| !calls.is_null())
        .cloned();
    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .map(|reason| FinishReason::from(reason.to_string()));

    Ok(ParsedEvent {
        delta: Delta {
            role: None,
            content,
            tool_calls,
        },
        finish_reason,
    })
}

/// # Stream Translator
///
/// Pull-based: each [`next_delta`](Self::next_delta) call reads lines until
/// it has one delta to hand out, so at most one upstream line is held at a
/// time. Deltas come out in upstream order, never merged.
/// [`next_fragment`](Self::next_fragment) is the content-only view.
///
/// - `Ok(Some(delta))` - next content fragment and/or partial tool calls
/// - `Ok(None)` - the `[DONE]` sentinel arrived (and every call after the end)
/// - `Err(_)` - transport failure or the body closed before `[DONE]`
///
/// Malformed lines are skipped and counted, they never end the stream.
pub struct StreamTranslator<S> {
    lines: S,
    fragments: usize,
    malformed: usize,
    finish_reason: Option<FinishReason>,
    finished: bool,
}

impl<S> StreamTranslator<S>
where
    S: Stream<Item = Result<String, UpstreamError>> + Unpin,
{
    pub fn new(lines: S) -> Self {
        Self {
            lines,
            fragments: 0,
            malformed: 0,
            finish_reason: None,
            finished: false,
        }
    }

    /// Next content fragment, skipping deltas that carry only tool calls.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, StreamError> {
        while let Some(delta) = self.next_delta().await? {
            if let Some(content) = delta.content {
                return Ok(Some(content));
            }
        }
        Ok(None)
    }

    pub async fn next_delta(&mut self) -> Result<Option<Delta>, StreamError> {
        while !self.finished {
            let line = match self.lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    self.finished = true;
                    warn!(fragments = self.fragments, error = %err, "Upstream stream failed");
                    return Err(err.into());
                }
                None => {
                    self.finished = true;
                    warn!(fragments = self.fragments, "Upstream stream closed without [DONE]");
                    return Err(StreamError::AbnormalTermination {
                        fragments: self.fragments,
                    });
                }
            };

            match EventLine::classify(&line) {
                EventLine::Blank | EventLine::Comment => {}
                EventLine::Done => {
                    self.finished = true;
                    debug!(
                        fragments = self.fragments,
                        malformed = self.malformed,
                        "Upstream stream completed"
                    );
                }
                EventLine::Data(payload) => match parse_event(payload) {
                    Ok(event) => {
                        if event.finish_reason.is_some() {
                            self.finish_reason = event.finish_reason;
                        }
                        if event.delta.content.is_some() {
                            self.fragments += 1;
                        }
                        if event.delta.content.is_some() || event.delta.tool_calls.is_some() {
                            return Ok(Some(event.delta));
                        }
                    }
                    Err(err) => self.skip_malformed(err),
                },
                EventLine::Other => self.skip_malformed(StreamError::MalformedLine {
                    line: line.clone(),
                    reason: "not a data line".to_string(),
                }),
            }
        }

        Ok(None)
    }

    fn skip_malformed(&mut self, err: StreamError) {
        self.malformed += 1;
        warn!(malformed = self.malformed, error = %err, "Skipping malformed stream line");
    }

    /// Fragments handed out so far
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Lines skipped as malformed so far
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Last non-null finish reason the upstream reported
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn lines(items: Vec<String>) -> impl Stream<Item = Result<String, UpstreamError>> + Unpin {
        stream::iter(items.into_iter().map(Ok).collect::<Vec<_>>())
    }

    fn delta(content: &str) -> String {
        format!(r#"data: {{"choices":[{{"index":0,"delta":{{"content":"{}"}}}}]}}"#, content)
    }

    async fn drain<S>(translator: &mut StreamTranslator<S>) -> (Vec<String>, Option<StreamError>)
    where
        S: Stream<Item = Result<String, UpstreamError>> + Unpin,
    {
        let mut out = Vec::new();
        loop {
            match translator.next_fragment().await {
                Ok(Some(fragment)) => out.push(fragment),
                Ok(None) => return (out, None),
                Err(err) => return (out, Some(err)),
            }
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(EventLine::classify("data: {\"a\":1}"), EventLine::Data("{\"a\":1}"));
        assert_eq!(EventLine::classify("data:{}"), EventLine::Data("{}"));
        assert_eq!(EventLine::classify("data: [DONE]"), EventLine::Done);
        assert_eq!(EventLine::classify("data:  [DONE] "), EventLine::Done);
        assert_eq!(EventLine::classify(""), EventLine::Blank);
        assert_eq!(EventLine::classify(": OPENROUTER PROCESSING"), EventLine::Comment);
        assert_eq!(EventLine::classify("event: ping"), EventLine::Other);
    }

    #[tokio::test]
    async fn test_fragments_in_order_until_done() {
        let role_only = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        let last = r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let mut translator = StreamTranslator::new(lines(vec![
            role_only.to_string(),
            String::new(),
            delta("Hel"),
            String::new(),
            delta("lo"),
            last.to_string(),
            "data: [DONE]".to_string(),
            delta("after"),
        ]));

        let (fragments, err) = drain(&mut translator).await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
        assert!(err.is_none());
        assert_eq!(translator.finish_reason(), Some(&FinishReason::Stop));
        assert_eq!(translator.malformed(), 0);
        assert!(translator.next_fragment().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_without_done_is_abnormal() {
        let mut translator = StreamTranslator::new(lines(vec![delta("a"), delta("b")]));

        let (fragments, err) = drain(&mut translator).await;
        assert_eq!(fragments, vec!["a", "b"]);
        assert!(matches!(err, Some(StreamError::AbnormalTermination { fragments: 2 })));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let mut translator = StreamTranslator::new(lines(vec![
            delta("one"),
            "data: {not json".to_string(),
            "event: message".to_string(),
            ": keep-alive".to_string(),
            delta("two"),
            "data: [DONE]".to_string(),
        ]));

        let (fragments, err) = drain(&mut translator).await;
        assert_eq!(fragments, vec!["one", "two"]);
        assert!(err.is_none());
        assert_eq!(translator.malformed(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let items = vec![
            Ok(delta("partial")),
            Err(UpstreamError::Transport("connection reset".into())),
        ];
        let mut translator = StreamTranslator::new(stream::iter(items));

        assert_eq!(translator.next_fragment().await.unwrap().as_deref(), Some("partial"));
        let err = translator.next_fragment().await.unwrap_err();
        assert!(matches!(err, StreamError::Upstream(UpstreamError::Transport(_))));
        assert!(translator.is_finished());
    }

    #[tokio::test]
    async fn test_tool_call_deltas_are_forwarded() {
        let call = r#"data: {"choices":[{"index":0,"delta":{"content":null,"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"lookup","arguments":""}}]}}]}"#;
        let args = r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\":1}"}}]}}]}"#;
        let last = r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#;
        let source = || {
            lines(vec![
                call.to_string(),
                args.to_string(),
                last.to_string(),
                "data: [DONE]".to_string(),
            ])
        };

        let mut translator = StreamTranslator::new(source());
        let first = translator.next_delta().await.unwrap().unwrap();
        assert_eq!(first.content, None);
        assert_eq!(first.tool_calls.unwrap()[0]["id"], "call_1");
        let second = translator.next_delta().await.unwrap().unwrap();
        assert_eq!(second.tool_calls.unwrap()[0]["function"]["arguments"], "{\"q\":1}");
        assert!(translator.next_delta().await.unwrap().is_none());
        assert_eq!(translator.finish_reason(), Some(&FinishReason::ToolCalls));
        assert_eq!(translator.fragments(), 0);

        // the content-only view skips them
        let mut translator = StreamTranslator::new(source());
        let (fragments, err) = drain(&mut translator).await;
        assert!(fragments.is_empty());
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn test_empty_content_is_still_a_fragment() {
        let mut translator = StreamTranslator::new(lines(vec![delta(""), "data: [DONE]".to_string()]));
        assert_eq!(translator.next_fragment().await.unwrap().as_deref(), Some(""));
        assert!(translator.next_fragment().await.unwrap().is_none());
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_drop_releases_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let source = stream::iter(vec![Ok(delta("x")), Ok(delta("y"))]).map(move |line| {
            let _ = &guard;
            line
        });

        let mut translator = StreamTranslator::new(Box::pin(source));
        assert_eq!(translator.next_fragment().await.unwrap().as_deref(), Some("x"));
        assert!(!dropped.load(Ordering::SeqCst));

        drop(translator);
        assert!(dropped.load(Ordering::SeqCst));
    }
}

//! Line framing for streamed upstream bodies.
//!
//! [`LineStream`] turns a stream of byte chunks into a stream of text lines. It
//! knows nothing about the event protocol; classifying lines is the
//! translator's job.

use crate::error::UpstreamError;
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Longest line accepted from the upstream, in bytes.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Lazy, single-pass sequence of lines read from an upstream body.
///
/// Yields `Ok(line)` without the trailing `\n` / `\r\n`. A transport failure is
/// yielded once as `Err` and the sequence ends right after it. A final line
/// without a newline is still yielded when the body ends. A line longer than
/// [`MAX_LINE_BYTES`] is a protocol error and also ends the sequence.
///
/// Dropping the stream drops the underlying response body, which releases the
/// pooled connection.
pub struct LineStream {
    inner: ByteStream,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    finished: bool,
}

impl LineStream {
    pub fn new<S>(bytes: S) -> Self
    where
        S: Stream<Item = Result<Bytes, UpstreamError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(bytes),
            buffer: Vec::new(),
            scanned: 0,
            finished: false,
        }
    }

    /// Frame the body of a streamed upstream response.
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(UpstreamError::from)),
        )
    }

    /// Frame an in-memory sequence of chunks. Chunk boundaries need not align with lines.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<Bytes, UpstreamError>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(chunks))
    }

    fn take_line(&mut self) -> Option<String> {
        let found = self.buffer[self.scanned..].iter().position(|&b| b == b'\n');
        match found {
            Some(offset) => {
                let line: Vec<u8> = self.buffer.drain(..=self.scanned + offset).collect();
                self.scanned = 0;
                Some(decode_line(&line))
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    fn reset(&mut self) {
        self.finished = true;
        self.buffer.clear();
        self.scanned = 0;
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

impl Stream for LineStream {
    type Item = Result<String, UpstreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(line) = this.take_line() {
                return Poll::Ready(Some(Ok(line)));
            }

            if this.buffer.len() > MAX_LINE_BYTES {
                let length = this.buffer.len();
                this.reset();
                return Poll::Ready(Some(Err(UpstreamError::Protocol(format!(
                    "stream line exceeds {} bytes (at least {} buffered)",
                    MAX_LINE_BYTES, length
                )))));
            }

            if this.finished {
                if this.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                let rest = std::mem::take(&mut this.buffer);
                return Poll::Ready(Some(Ok(decode_line(&rest))));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.buffer.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(err))) => {
                    // a partial line before a reset is not trustworthy
                    this.reset();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => this.finished = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

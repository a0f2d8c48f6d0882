//! # Streaming Module
//!
//! Streamed chat completions, from upstream lines to client events.
//!
//! ## Pieces:
//! - [`translator`] reads `data:` lines from the upstream and yields content fragments
//! - [`sse`] frames fragments as OpenAI-compatible chunks for the client

pub mod translator;
#[cfg(feature = "server")]
pub mod sse;

pub use translator::{EventLine, StreamTranslator, DONE_SENTINEL};
#[cfg(feature = "server")]
pub use sse::{chat_events, sse_response};

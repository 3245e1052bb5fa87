//! API interaction layer: streaming and retry.
//!
//! - [`retry`]: transient error retry with exponential backoff and jitter.
//!   Never retries 400/401 errors.
//! - [`streaming`]: SSE decoder and [`stream_text`](crate::OpenRouterClient::stream_text),
//!   which turns a completions response into a stream of text deltas.

pub mod retry;
pub mod streaming;

pub use retry::{RetryConfig, with_retry};
pub use streaming::{SseDecoder, SseEvent};

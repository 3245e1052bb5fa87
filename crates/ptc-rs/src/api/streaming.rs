//! Server-Sent Events (SSE) streaming for the OpenRouter chat completions API.
//!
//! [`OpenRouterClient::stream_text`] opens a streaming request and returns
//! the content deltas as an async [`TextStream`]. Bytes are decoded with
//! [`SseDecoder`], which tolerates lines and UTF-8 sequences split across
//! network chunks.

use std::collections::VecDeque;

use futures::stream;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::ModelError;
use crate::model::TextStream;
use crate::{ChatRequest, OpenRouterClient};

/// One decoded SSE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A content delta.
    Text(String),
    /// The `data: [DONE]` terminator.
    Done,
}

/// Raw SSE data chunk from the OpenRouter API.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    error: Option<StreamErrorBody>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamErrorBody {
    message: Option<String>,
}

/// Incremental SSE line decoder.
///
/// Bytes are buffered until a full line is available, so a multi-byte
/// character split across chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` has been seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk of bytes and return the events from every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, ModelError> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while !self.done {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.decode_line(&String::from_utf8_lossy(&line), &mut events)?;
        }
        Ok(events)
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Result<Vec<SseEvent>, ModelError> {
        let mut events = Vec::new();
        if !self.done && !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            self.decode_line(&String::from_utf8_lossy(&rest), &mut events)?;
        }
        Ok(events)
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<SseEvent>) -> Result<(), ModelError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            trace!("ignoring SSE field: {line}");
            return Ok(());
        };
        if data == "[DONE]" {
            self.done = true;
            events.push(SseEvent::Done);
            return Ok(());
        }
        parse_sse_data(data, events)
    }
}

/// Parse a single SSE `data:` payload into events.
fn parse_sse_data(data: &str, events: &mut Vec<SseEvent>) -> Result<(), ModelError> {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            warn!("failed to parse SSE chunk: {e}");
            return Ok(());
        }
    };

    // Providers report mid-stream failures as an `error` object.
    if let Some(err) = chunk.error {
        return Err(ModelError::Stream(
            err.message.unwrap_or_else(|| "provider error".into()),
        ));
    }

    for choice in chunk.choices.unwrap_or_default() {
        if let Some(text) = choice.delta.and_then(|d| d.content)
            && !text.is_empty()
        {
            events.push(SseEvent::Text(text));
        }
    }
    Ok(())
}

struct StreamState {
    resp: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl OpenRouterClient {
    /// Send a streaming chat completion request and return its text deltas.
    ///
    /// Fails early with [`ModelError::Http`] on a non-success status. Errors
    /// while reading the body surface as a final `Err` item on the stream.
    pub async fn stream_text(&self, body: &ChatRequest) -> Result<TextStream, ModelError> {
        debug!(
            "Sending streaming chat request ({} messages, model {})",
            body.messages.len(),
            body.model
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Http { status, body: text });
        }

        let state = StreamState {
            resp,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        };

        let stream = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(text) = st.pending.pop_front() {
                    return Some((Ok(text), st));
                }
                if st.finished {
                    return None;
                }

                let chunk = match st.resp.chunk().await {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(ModelError::Stream(e.to_string())), st));
                    }
                };
                let decoded = match chunk {
                    Some(bytes) => st.decoder.push(&bytes),
                    None => {
                        st.finished = true;
                        st.decoder.finish()
                    }
                };
                match decoded {
                    Ok(events) => {
                        for event in events {
                            match event {
                                SseEvent::Text(text) => st.pending.push_back(text),
                                SseEvent::Done => st.finished = true,
                            }
                        }
                    }
                    Err(e) => {
                        st.finished = true;
                        st.pending.clear();
                        return Some((Err(e), st));
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(events: Vec<SseEvent>) -> Vec<String> {
        events
            .into_iter()
            .filter_map(|e| match e {
                SseEvent::Text(t) => Some(t),
                SseEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn decodes_content_deltas() {
        let mut dec = SseDecoder::new();
        let events = dec
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n")
            .unwrap();
        assert_eq!(events, vec![SseEvent::Text("Hello".into())]);
    }

    #[test]
    fn skips_comments_and_empty_deltas() {
        let mut dec = SseDecoder::new();
        let input = b": OPENROUTER PROCESSING\n\n\
            data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
            data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\
            data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
        assert_eq!(texts(dec.push(input).unwrap()), vec!["x"]);
    }

    #[test]
    fn lines_split_across_chunks() {
        let mut dec = SseDecoder::new();
        let full = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} \u{2713}\"}}]}\n";
        let bytes = full.as_bytes();
        let mut out = Vec::new();
        for piece in bytes.chunks(3) {
            out.extend(texts(dec.push(piece).unwrap()));
        }
        assert_eq!(out, vec!["caf\u{e9} \u{2713}"]);
    }

    #[test]
    fn done_stops_decoding() {
        let mut dec = SseDecoder::new();
        let events = dec
            .push(b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n")
            .unwrap();
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(dec.is_done());
        assert!(dec.finish().unwrap().is_empty());
    }

    #[test]
    fn trailing_line_flushed_on_finish() {
        let mut dec = SseDecoder::new();
        assert!(
            dec.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
                .unwrap()
                .is_empty()
        );
        assert_eq!(texts(dec.finish().unwrap()), vec!["tail"]);
    }

    #[test]
    fn provider_error_is_reported() {
        let mut dec = SseDecoder::new();
        let err = dec
            .push(b"data: {\"error\":{\"message\":\"overloaded\"}}\n")
            .unwrap_err();
        assert!(matches!(err, ModelError::Stream(ref m) if m == "overloaded"));
    }

    #[test]
    fn malformed_json_is_skipped() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: {not json\n").unwrap().is_empty());
    }
}

//! The language model boundary.
//!
//! The turn controller sees a model only as [`ChatModel`]: a conversation
//! goes in, a stream of text fragments comes out. Generation settings live
//! with the model implementation, not with the caller.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::Stream;
use futures::stream;
use tracing::debug;

use crate::api::retry::{RetryConfig, with_retry};
use crate::error::ModelError;
use crate::{ChatRequest, DEFAULT_MODEL, Message, OpenRouterClient};

/// Streamed model output: text fragments in order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// Boxed future returned by [`ChatModel`] methods.
pub type ModelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ModelError>> + Send + 'a>>;

/// A chat model that streams its reply as text.
///
/// Dropping the returned stream stops generation.
pub trait ChatModel: Send + Sync {
    fn stream<'a>(&'a self, messages: &'a [Message]) -> ModelFuture<'a, TextStream>;
}

impl<M: ChatModel + ?Sized> ChatModel for Arc<M> {
    fn stream<'a>(&'a self, messages: &'a [Message]) -> ModelFuture<'a, TextStream> {
        (**self).stream(messages)
    }
}

// ── OpenRouter ─────────────────────────────────────────────────────

/// Generation settings for [`OpenRouterModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model identifier, e.g. `"anthropic/claude-sonnet-4"`.
    pub model: String,
    /// Max tokens per response. Zero leaves it to the provider.
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Retry policy for opening the stream.
    pub retry: RetryConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: None,
            retry: RetryConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// [`ChatModel`] backed by the OpenRouter streaming API.
///
/// Wraps an [`OpenRouterClient`] and fills each request from its
/// [`ModelConfig`]. Only opening the stream is retried; once text has
/// started flowing, a failure is returned to the caller.
#[derive(Debug)]
pub struct OpenRouterModel {
    client: OpenRouterClient,
    config: ModelConfig,
}

impl OpenRouterModel {
    pub fn new(client: OpenRouterClient, config: ModelConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn request(&self, messages: &[Message]) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: true,
        }
    }
}

impl ChatModel for OpenRouterModel {
    fn stream<'a>(&'a self, messages: &'a [Message]) -> ModelFuture<'a, TextStream> {
        Box::pin(async move {
            let request = self.request(messages);
            let request = &request;
            with_retry(&self.config.retry, || self.client.stream_text(request)).await
        })
    }
}

// ── Scripted ───────────────────────────────────────────────────────

/// A deterministic [`ChatModel`] that replays canned responses.
///
/// Each call to [`stream`](ChatModel::stream) pops the next response and
/// streams it in fragments. Every conversation it is called with is
/// recorded. Useful for tests and offline demos.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    chunk_chars: Option<usize>,
    repeat_last: bool,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Split each response into fragments of `n` characters.
    pub fn with_chunk_chars(mut self, n: usize) -> Self {
        self.chunk_chars = Some(n.max(1));
        self
    }

    /// Keep serving the final response instead of running out.
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Conversations received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_response(&self) -> Result<String, ModelError> {
        let served = self.requests.lock().map(|r| r.len()).unwrap_or_default();
        let mut queue = self
            .responses
            .lock()
            .map_err(|_| ModelError::Stream("script lock poisoned".into()))?;
        if self.repeat_last && queue.len() == 1 {
            return queue.front().cloned().ok_or(ModelError::ScriptExhausted(served));
        }
        queue.pop_front().ok_or(ModelError::ScriptExhausted(served))
    }

    fn fragments(&self, response: String) -> Vec<String> {
        match self.chunk_chars {
            None => vec![response],
            Some(n) => {
                let chars: Vec<char> = response.chars().collect();
                chars.chunks(n).map(|c| c.iter().collect()).collect()
            }
        }
    }
}

impl ChatModel for ScriptedModel {
    fn stream<'a>(&'a self, messages: &'a [Message]) -> ModelFuture<'a, TextStream> {
        Box::pin(async move {
            let response = self.next_response()?;
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(messages.to_vec());
            }
            debug!("scripted model replaying {} bytes", response.len());
            let fragments = self.fragments(response);
            let stream: TextStream = Box::pin(stream::iter(fragments.into_iter().map(Ok)));
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(stream: TextStream) -> Vec<String> {
        stream.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::new(["one", "two"]);
        let msgs = [Message::user("hi")];
        assert_eq!(collect(model.stream(&msgs).await.unwrap()).await, vec!["one"]);
        assert_eq!(collect(model.stream(&msgs).await.unwrap()).await, vec!["two"]);
        let err = model.stream(&msgs).await.err().unwrap();
        assert!(matches!(err, ModelError::ScriptExhausted(2)));
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn scripted_model_chunks_by_chars() {
        let model = ScriptedModel::new(["h\u{e9}llo"]).with_chunk_chars(2);
        let parts = collect(model.stream(&[]).await.unwrap()).await;
        assert_eq!(parts, vec!["h\u{e9}", "ll", "o"]);
    }

    #[tokio::test]
    async fn repeat_last_never_runs_out() {
        let model = ScriptedModel::new(["a", "b"]).repeat_last();
        for expected in ["a", "b", "b", "b"] {
            let parts = collect(model.stream(&[]).await.unwrap()).await;
            assert_eq!(parts, vec![expected]);
        }
    }

    #[test]
    fn request_carries_model_settings() {
        let client = OpenRouterClient::new("key").unwrap();
        let model = OpenRouterModel::new(
            client,
            ModelConfig::new("test/model")
                .with_max_tokens(100)
                .with_temperature(0.2),
        );
        let req = model.request(&[Message::user("hi")]);
        assert_eq!(req.model, "test/model");
        assert_eq!(req.max_tokens, 100);
        assert_eq!(req.temperature, Some(0.2));
        assert!(req.stream);
    }
}

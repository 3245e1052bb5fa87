//! The turn state machine.
//!
//! A turn moves through explicit phases:
//!
//! ```text
//! AwaitModel ──► Streaming ──► Executing ──► AwaitModel ...
//!                    │              │
//!                    └──► TurnEnd ◄─┘ (stream ended without a block, or cap reached)
//! ```
//!
//! While streaming, parser text is forwarded as [`PtcEvent::TextDelta`]. The
//! first complete block stops consumption of the model stream, which is
//! dropped so generation halts. The block runs to completion, the assistant
//! text and the execution result are appended to the conversation, and a
//! fresh continuation is requested. Nothing overlaps: there is never more
//! than one outstanding model request or execution.

use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::PtcConfig;
use super::events::PtcEvent;
use crate::Message;
use crate::error::{BridgeError, TurnError};
use crate::model::{ChatModel, TextStream};
use crate::parser::{BlockAction, ExecutableBlock, FenceParser, ParseWarning, Segment};
use crate::sandbox::Executor;

/// Drives one conversation through user turns.
///
/// Owns the conversation history. Turns are strictly sequential: `run_turn`
/// borrows the controller mutably until its stream is dropped.
pub struct TurnController<'a> {
    model: &'a dyn ChatModel,
    executor: &'a Executor,
    config: PtcConfig,
    messages: Vec<Message>,
    stop: CancellationToken,
}

impl<'a> TurnController<'a> {
    pub fn new(model: &'a dyn ChatModel, executor: &'a Executor, config: PtcConfig) -> Self {
        let messages = config
            .system_prompt
            .as_ref()
            .map(|p| vec![Message::system(p.clone())])
            .unwrap_or_default();
        Self {
            model,
            executor,
            config,
            messages,
            stop: CancellationToken::new(),
        }
    }

    /// Cancel in-flight turns when `token` fires. A running process is
    /// killed and nothing partial is appended to the conversation.
    pub fn with_stop_signal(mut self, token: CancellationToken) -> Self {
        self.stop = token;
        self
    }

    /// Resume from an existing conversation. The configured system prompt is
    /// prepended unless the history already starts with a system message.
    pub fn with_messages(mut self, history: Vec<Message>) -> Self {
        let system = match history.first() {
            Some(m) if m.role == crate::MessageRole::System => None,
            _ => self.config.system_prompt.clone().map(Message::system),
        };
        self.messages = system.into_iter().chain(history).collect();
        self
    }

    /// The conversation so far.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn config(&self) -> &PtcConfig {
        &self.config
    }

    /// Run one user turn, yielding events as they happen.
    ///
    /// The stream is lazy and ends after [`PtcEvent::TurnEnd`] or the first
    /// `Err`. Dropping it early cancels the turn.
    pub fn run_turn(
        &mut self,
        user: impl Into<String>,
    ) -> impl Stream<Item = Result<PtcEvent, TurnError>> + Send + '_ {
        let user = user.into();
        info!("turn started ({} chars of user input)", user.len());
        self.messages.push(Message::user(user));
        let run = TurnRun {
            ctl: self,
            phase: Phase::AwaitModel,
            iterations: 0,
            warnings: Vec::new(),
            pending: VecDeque::new(),
        };
        stream::unfold(run, |mut run| async move {
            let item = run.step().await?;
            Some((item, run))
        })
    }

    /// Run a turn to completion and return all of its events.
    pub async fn run_turn_collect(
        &mut self,
        user: impl Into<String>,
    ) -> Result<Vec<PtcEvent>, TurnError> {
        let mut events = Vec::new();
        let mut turn = std::pin::pin!(self.run_turn(user));
        while let Some(event) = turn.next().await {
            events.push(event?);
        }
        Ok(events)
    }
}

enum Phase {
    AwaitModel,
    Streaming {
        stream: TextStream,
        parser: FenceParser,
        text: String,
    },
    Executing {
        block: ExecutableBlock,
        text: String,
    },
    Done,
}

struct TurnRun<'s, 'a> {
    ctl: &'s mut TurnController<'a>,
    phase: Phase,
    iterations: usize,
    warnings: Vec<ParseWarning>,
    pending: VecDeque<PtcEvent>,
}

impl TurnRun<'_, '_> {
    /// Advance until the next event, or `None` once the turn is over.
    async fn step(&mut self) -> Option<Result<PtcEvent, TurnError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            let result = match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,
                Phase::AwaitModel => self.await_model().await,
                Phase::Streaming {
                    stream,
                    parser,
                    text,
                } => self.stream_next(stream, parser, text).await,
                Phase::Executing { block, text } => self.execute(block, text).await,
            };
            if let Err(e) = result {
                warn!("turn aborted: {e}");
                self.phase = Phase::Done;
                return Some(Err(e));
            }
        }
    }

    async fn await_model(&mut self) -> Result<(), TurnError> {
        let ctl = &*self.ctl;
        debug!("requesting continuation ({} messages)", ctl.messages.len());
        let stream = tokio::select! {
            biased;
            _ = ctl.stop.cancelled() => return Err(TurnError::Cancelled),
            opened = ctl.model.stream(&ctl.messages) => opened?,
        };
        self.phase = Phase::Streaming {
            stream,
            parser: FenceParser::new(),
            text: String::new(),
        };
        Ok(())
    }

    async fn stream_next(
        &mut self,
        mut stream: TextStream,
        mut parser: FenceParser,
        mut text: String,
    ) -> Result<(), TurnError> {
        let next = tokio::select! {
            biased;
            _ = self.ctl.stop.cancelled() => return Err(TurnError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            self.finish_stream(parser, text);
            return Ok(());
        };
        let segments = parser.push(&chunk?);
        match self.absorb(segments, &mut text) {
            // Generation halts here; dropping the stream ends the request.
            Some(block) => {
                self.warnings.extend(parser.take_warnings());
                self.phase = Phase::Executing { block, text };
            }
            None => {
                self.phase = Phase::Streaming {
                    stream,
                    parser,
                    text,
                };
            }
        }
        Ok(())
    }

    /// The model stream ended. Flush the parser and either run a block it
    /// completed at the very end or close the turn.
    fn finish_stream(&mut self, parser: FenceParser, mut text: String) {
        let tail = parser.finish();
        for w in &tail.warnings {
            warn!("parse warning: {w}");
        }
        self.warnings.extend(tail.warnings);
        if let Some(block) = self.absorb(tail.segments, &mut text) {
            self.phase = Phase::Executing { block, text };
            return;
        }
        if !text.is_empty() {
            self.ctl.messages.push(Message::assistant(text));
        }
        info!("turn finished after {} executions", self.iterations);
        self.pending.push_back(PtcEvent::TurnEnd {
            capped: false,
            warnings: std::mem::take(&mut self.warnings),
        });
    }

    /// Queue text segments as deltas up to the first block, which is
    /// returned. Segments after it are discarded.
    fn absorb(&mut self, segments: Vec<Segment>, text: &mut String) -> Option<ExecutableBlock> {
        let mut segments = segments.into_iter();
        while let Some(segment) = segments.next() {
            match segment {
                Segment::Text(t) => {
                    text.push_str(&t);
                    self.pending.push_back(PtcEvent::TextDelta { text: t });
                }
                Segment::Block(block) => {
                    debug!("block complete: {} {}", block.kind(), block.target());
                    let dropped: usize = segments
                        .by_ref()
                        .map(|s| match s {
                            Segment::Text(t) => t.len(),
                            Segment::Block(b) => b.raw.len(),
                        })
                        .sum();
                    if dropped > 0 {
                        debug!("discarding {dropped} bytes of model output after the block");
                    }
                    return Some(block);
                }
            }
        }
        None
    }

    async fn execute(&mut self, block: ExecutableBlock, text: String) -> Result<(), TurnError> {
        if let BlockAction::ToolCall { name, .. } = &block.action {
            let known = self
                .ctl
                .executor
                .bridge()
                .is_some_and(|b| b.registry().contains(name));
            if !known {
                return Err(BridgeError::UnknownTool(name.clone()).into());
            }
        }

        let result = tokio::select! {
            biased;
            _ = self.ctl.stop.cancelled() => return Err(TurnError::Cancelled),
            result = self.ctl.executor.execute(&block) => result,
        };

        self.iterations += 1;
        let ctl = &mut *self.ctl;
        ctl.messages
            .push(Message::assistant(format!("{text}{}", block.raw)));
        ctl.messages.push(Message::tool_result(result.to_message()));
        self.pending.push_back(PtcEvent::execution(&result));

        if self.iterations >= ctl.config.max_iterations {
            warn!(
                "iteration cap of {} reached, ending turn",
                ctl.config.max_iterations
            );
            self.pending.push_back(PtcEvent::TurnEnd {
                capped: true,
                warnings: std::mem::take(&mut self.warnings),
            });
        } else {
            self.phase = Phase::AwaitModel;
        }
        Ok(())
    }
}

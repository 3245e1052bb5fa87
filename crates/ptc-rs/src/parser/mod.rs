//! Incremental detection of executable blocks in streamed model output.
//!
//! The model writes prose interleaved with fenced blocks such as
//!
//! ````text
//! ```bash:execute
//! ls -la
//! ```
//! ````
//!
//! or XML invocations such as `<invoke name="read_file"><parameter
//! name="path">notes.txt</parameter></invoke>`. [`FenceParser`] consumes the
//! raw text as it arrives and yields [`Segment`]s: text that can be shown
//! immediately, and [`ExecutableBlock`]s that are emitted only once their
//! closing delimiter has been seen. [`parse_stream`] adapts the parser to an
//! async stream of chunks.

pub mod fence;
pub mod invoke;

pub use fence::{FenceParser, ParseTail};

use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream};
use serde::Serialize;
use serde_json::{Map, Value};

/// Coarse classification of an executable block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Shell,
    Code,
    FileCreate,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKind::Shell => write!(f, "shell"),
            BlockKind::Code => write!(f, "code"),
            BlockKind::FileCreate => write!(f, "file-create"),
        }
    }
}

/// What a block asks the executor to do.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockAction {
    /// Run a command through the shell.
    Shell { command: String },
    /// Run source code in an interpreter that has the skill bindings loaded.
    Code { language: String, source: String },
    /// Write `contents` verbatim to `path` under the workspace.
    FileCreate { path: String, contents: String },
    /// Call a registered skill directly (XML invocation form).
    ToolCall {
        name: String,
        arguments: Map<String, Value>,
    },
}

/// A fully observed executable block.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableBlock {
    pub action: BlockAction,
    /// Exact source text of the block, delimiters included.
    pub raw: String,
}

impl ExecutableBlock {
    pub fn new(action: BlockAction, raw: impl Into<String>) -> Self {
        Self {
            action,
            raw: raw.into(),
        }
    }

    /// Tool calls are a form of code execution.
    pub fn kind(&self) -> BlockKind {
        match self.action {
            BlockAction::Shell { .. } => BlockKind::Shell,
            BlockAction::Code { .. } | BlockAction::ToolCall { .. } => BlockKind::Code,
            BlockAction::FileCreate { .. } => BlockKind::FileCreate,
        }
    }

    /// Command text, code text, destination path, or tool name.
    pub fn target(&self) -> &str {
        match &self.action {
            BlockAction::Shell { command } => command,
            BlockAction::Code { source, .. } => source,
            BlockAction::FileCreate { path, .. } => path,
            BlockAction::ToolCall { name, .. } => name,
        }
    }

    /// The text shown to the user as the `code` of an execution event.
    pub fn display_code(&self) -> String {
        match &self.action {
            BlockAction::Shell { command } => command.clone(),
            BlockAction::Code { source, .. } => source.clone(),
            BlockAction::FileCreate { path, contents } => format!("{path}:create\n{contents}"),
            BlockAction::ToolCall { name, arguments } => {
                let args: Vec<String> = arguments.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{name}({})", args.join(", "))
            }
        }
    }
}

/// One unit of parser output.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Block(ExecutableBlock),
}

/// Why part of the stream could not be turned into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The stream ended before the block's closing delimiter.
    Unterminated,
    /// The block was closed but its contents could not be interpreted.
    Malformed,
}

/// Non-fatal parse problem, reported with the end of the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub kind: WarningKind,
    pub detail: String,
}

impl ParseWarning {
    pub fn unterminated(detail: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Unterminated,
            detail: detail.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Malformed,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            WarningKind::Unterminated => write!(f, "unterminated block: {}", self.detail),
            WarningKind::Malformed => write!(f, "malformed block: {}", self.detail),
        }
    }
}

/// Output of [`parse_stream`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    Segment(Segment),
    /// The input stream finished; carries every warning collected.
    End(Vec<ParseWarning>),
}

/// Parse an async stream of text chunks into [`ParseEvent`]s.
///
/// Errors from the input are forwarded and end the output. When the input
/// completes normally the last item is [`ParseEvent::End`].
pub fn parse_stream<S, E>(chunks: S) -> impl Stream<Item = Result<ParseEvent, E>>
where
    S: Stream<Item = Result<String, E>> + Unpin,
{
    struct State<S> {
        chunks: S,
        parser: Option<FenceParser>,
        pending: VecDeque<ParseEvent>,
    }

    let init = State {
        chunks,
        parser: Some(FenceParser::new()),
        pending: VecDeque::new(),
    };

    stream::unfold(init, |mut st| async move {
        loop {
            if let Some(ev) = st.pending.pop_front() {
                return Some((Ok(ev), st));
            }
            let parser = st.parser.as_mut()?;
            match st.chunks.next().await {
                Some(Ok(chunk)) => {
                    st.pending
                        .extend(parser.push(&chunk).into_iter().map(ParseEvent::Segment));
                }
                Some(Err(e)) => {
                    st.parser = None;
                    return Some((Err(e), st));
                }
                None => {
                    let tail = st.parser.take()?.finish();
                    st.pending
                        .extend(tail.segments.into_iter().map(ParseEvent::Segment));
                    st.pending.push_back(ParseEvent::End(tail.warnings));
                }
            }
        }
    })
}

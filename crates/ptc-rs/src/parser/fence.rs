//! The incremental fence/XML state machine.
//!
//! Text is held back only while it could still be the start of a block
//! opener (a line beginning with backticks, or a `<` that may turn into
//! `<invoke name=`). Everything else is released as soon as it arrives, so the
//! caller can display prose while the model is still generating.

use tracing::{debug, warn};

use super::invoke::parse_invoke;
use super::{BlockAction, ExecutableBlock, ParseWarning, Segment};

const FENCE: &[u8] = b"```";
const INVOKE_OPEN: &[u8] = b"<invoke";
const INVOKE_CLOSE: &str = "</invoke>";
/// Wrapper tags some models put around invocations; dropped silently.
const WRAPPERS: [&[u8]; 2] = [b"<function_calls>", b"</function_calls>"];

/// Fence header of the form `<name>:<action>`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FenceTag {
    name: String,
    create: bool,
}

impl FenceTag {
    /// Parse the text after the opening backticks. `None` means an ordinary
    /// markdown fence.
    fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (name, action) = header.rsplit_once(':')?;
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return None;
        }
        let create = match action {
            "execute" => false,
            "create" => true,
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            create,
        })
    }

    /// Language tags run; anything else (or an explicit `create`) names a
    /// file to write.
    fn into_action(self, body: String) -> BlockAction {
        if !self.create {
            match self.name.to_ascii_lowercase().as_str() {
                "bash" | "sh" | "shell" | "zsh" => return BlockAction::Shell { command: body },
                "python" | "python3" | "py" => {
                    return BlockAction::Code {
                        language: "python".to_string(),
                        source: body,
                    };
                }
                _ => {}
            }
        }
        BlockAction::FileCreate {
            path: self.name,
            contents: body,
        }
    }
}

#[derive(Debug)]
enum State {
    /// Plain prose.
    Text,
    /// Buffer starts with a fence; waiting for the end of the header line.
    FenceHeader,
    /// Inside an executable fence. `body_start` indexes the buffer.
    ExecFence { tag: FenceTag, body_start: usize },
    /// Inside an ordinary markdown fence; its contents are text.
    PlainFence,
    /// Buffer starts with `<invoke name=`.
    Invoke,
}

/// Where the closing fence line sits, if it is known yet.
enum Close {
    /// `(start, end)`: the fence starts at `start`; `end` is just past the
    /// backticks and trailing blanks, before the newline.
    Found(usize, usize),
    /// A line that may still become a closing fence starts here.
    Pending(usize),
    NotFound,
}

/// Whether bytes at some offset open an invocation.
enum InvokeMatch {
    Yes,
    /// The buffer ends before the answer is known.
    Maybe,
    No,
}

fn is_xml_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Match `<invoke`, whitespace, `name`, optional whitespace, `=`. A bare
/// `<invoke>` in prose is not an opener.
fn match_invoke(rest: &[u8]) -> InvokeMatch {
    if !rest.starts_with(INVOKE_OPEN) {
        return if INVOKE_OPEN.starts_with(rest) {
            InvokeMatch::Maybe
        } else {
            InvokeMatch::No
        };
    }
    let mut i = INVOKE_OPEN.len();
    match rest.get(i) {
        None => return InvokeMatch::Maybe,
        Some(&b) if is_xml_space(b) => {}
        Some(_) => return InvokeMatch::No,
    }
    while rest.get(i).copied().is_some_and(is_xml_space) {
        i += 1;
    }
    let tail = rest.get(i..).unwrap_or_default();
    if !tail.starts_with(b"name") {
        return if b"name".starts_with(tail) {
            InvokeMatch::Maybe
        } else {
            InvokeMatch::No
        };
    }
    i += 4;
    while rest.get(i).copied().is_some_and(is_xml_space) {
        i += 1;
    }
    match rest.get(i) {
        None => InvokeMatch::Maybe,
        Some(b'=') => InvokeMatch::Yes,
        Some(_) => InvokeMatch::No,
    }
}

/// What the text scanner found.
enum Opener {
    Fence(usize),
    Invoke(usize),
    Wrapper(usize, usize),
    /// A possible opener prefix starts here at the end of the buffer.
    Partial(usize),
    None,
}

/// Everything left over when the stream ends.
#[derive(Debug, Default)]
pub struct ParseTail {
    pub segments: Vec<Segment>,
    pub warnings: Vec<ParseWarning>,
}

/// Incremental parser for executable fences and XML invocations.
///
/// Feed chunks with [`push`](Self::push) and call [`finish`](Self::finish)
/// once the stream ends. The blocks produced and the concatenation of the
/// text produced do not depend on how the input was split into chunks.
#[derive(Debug)]
pub struct FenceParser {
    buf: String,
    state: State,
    /// Whether `buf[0]` sits at the start of a line.
    line_start: bool,
    warnings: Vec<ParseWarning>,
}

impl Default for FenceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceParser {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            state: State::Text,
            line_start: true,
            warnings: Vec::new(),
        }
    }

    /// Feed the next fragment and collect whatever became decidable.
    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        self.drain(&mut out, false);
        out
    }

    /// Warnings collected so far (malformed invocations seen mid-stream).
    pub fn take_warnings(&mut self) -> Vec<ParseWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// End of input: flush held text and report unterminated blocks.
    pub fn finish(mut self) -> ParseTail {
        let mut segments = Vec::new();
        self.drain(&mut segments, true);
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            segments.push(Segment::Text(rest));
        }
        ParseTail {
            segments,
            warnings: self.warnings,
        }
    }

    fn drain(&mut self, out: &mut Vec<Segment>, eof: bool) {
        loop {
            let progressed = match self.state {
                State::Text => self.step_text(out, eof),
                State::FenceHeader => self.step_header(out, eof),
                State::ExecFence { .. } => self.step_exec(out, eof),
                State::PlainFence => self.step_plain(out, eof),
                State::Invoke => self.step_invoke(out, eof),
            };
            if !progressed {
                break;
            }
        }
    }

    /// Move `buf[..upto]` out as a text segment.
    fn emit_text(&mut self, upto: usize, out: &mut Vec<Segment>) {
        if upto == 0 {
            return;
        }
        let text: String = self.buf.drain(..upto).collect();
        self.line_start = text.ends_with('\n');
        match out.last_mut() {
            Some(Segment::Text(prev)) => prev.push_str(&text),
            _ => out.push(Segment::Text(text)),
        }
    }

    /// Drop `buf[..upto]` without emitting it.
    fn discard(&mut self, upto: usize) {
        let dropped: String = self.buf.drain(..upto).collect();
        self.line_start = dropped.ends_with('\n');
    }

    fn at_line_start(&self, i: usize) -> bool {
        if i == 0 {
            self.line_start
        } else {
            self.buf.as_bytes()[i - 1] == b'\n'
        }
    }

    fn find_opener(&self) -> Opener {
        let bytes = self.buf.as_bytes();
        for i in 0..bytes.len() {
            let rest = &bytes[i..];
            match bytes[i] {
                b'`' if self.at_line_start(i) => {
                    if rest.starts_with(FENCE) {
                        return Opener::Fence(i);
                    }
                    if FENCE.starts_with(rest) {
                        return Opener::Partial(i);
                    }
                }
                b'<' => {
                    match match_invoke(rest) {
                        InvokeMatch::Yes => return Opener::Invoke(i),
                        InvokeMatch::Maybe => return Opener::Partial(i),
                        InvokeMatch::No => {}
                    }
                    for wrapper in WRAPPERS {
                        if rest.starts_with(wrapper) {
                            return Opener::Wrapper(i, wrapper.len());
                        }
                        if wrapper.starts_with(rest) {
                            return Opener::Partial(i);
                        }
                    }
                }
                _ => {}
            }
        }
        Opener::None
    }

    fn step_text(&mut self, out: &mut Vec<Segment>, eof: bool) -> bool {
        match self.find_opener() {
            Opener::Fence(i) => {
                self.emit_text(i, out);
                self.state = State::FenceHeader;
                true
            }
            Opener::Invoke(i) => {
                self.emit_text(i, out);
                self.state = State::Invoke;
                true
            }
            Opener::Wrapper(i, len) => {
                self.emit_text(i, out);
                self.discard(len);
                true
            }
            Opener::Partial(i) => {
                let upto = if eof { self.buf.len() } else { i };
                self.emit_text(upto, out);
                false
            }
            Opener::None => {
                self.emit_text(self.buf.len(), out);
                false
            }
        }
    }

    fn step_header(&mut self, out: &mut Vec<Segment>, eof: bool) -> bool {
        let Some(nl) = self.buf.find('\n') else {
            if eof {
                let header = self.buf.get(FENCE.len()..).unwrap_or_default();
                if FenceTag::parse(header).is_some() {
                    warn!("Stream ended inside fence header: {}", self.buf.trim());
                    self.warnings
                        .push(ParseWarning::unterminated(self.buf.trim().to_string()));
                    self.buf.clear();
                } else {
                    self.emit_text(self.buf.len(), out);
                }
                self.state = State::Text;
            }
            return false;
        };

        let header = self.buf.get(FENCE.len()..nl).unwrap_or_default();
        match FenceTag::parse(header) {
            Some(tag) => {
                debug!("Opened executable fence '{}'", tag.name);
                self.state = State::ExecFence {
                    tag,
                    body_start: nl + 1,
                };
            }
            None => {
                self.emit_text(nl + 1, out);
                self.state = State::PlainFence;
            }
        }
        true
    }

    /// Look for a closing fence line at or after `from`, which must be a
    /// line start.
    fn find_close(&self, from: usize, eof: bool) -> Close {
        let bytes = self.buf.as_bytes();
        let mut line = from;
        while line <= bytes.len() {
            if line == bytes.len() || self.at_line_start(line) {
                let rest = &bytes[line..];
                if rest.starts_with(FENCE) {
                    let mut end = line + FENCE.len();
                    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t' | b'\r') {
                        end += 1;
                    }
                    if end == bytes.len() {
                        return if eof {
                            Close::Found(line, end)
                        } else {
                            Close::Pending(line)
                        };
                    }
                    if bytes[end] == b'\n' {
                        return Close::Found(line, end);
                    }
                } else if !rest.is_empty() && FENCE.starts_with(rest) && !eof {
                    return Close::Pending(line);
                }
            }
            match bytes.get(line..).and_then(|r| r.iter().position(|&b| b == b'\n')) {
                Some(off) => line += off + 1,
                None => break,
            }
        }
        Close::NotFound
    }

    fn step_exec(&mut self, out: &mut Vec<Segment>, eof: bool) -> bool {
        let State::ExecFence { body_start, .. } = self.state else {
            return false;
        };
        match self.find_close(body_start, eof) {
            Close::Found(start, end) => {
                let State::ExecFence { tag, .. } = std::mem::replace(&mut self.state, State::Text)
                else {
                    return false;
                };
                let body = self.buf.get(body_start..start).unwrap_or_default();
                let body = body
                    .strip_suffix('\n')
                    .map(|b| b.strip_suffix('\r').unwrap_or(b))
                    .unwrap_or(body)
                    .to_string();
                let raw: String = self.buf.drain(..end).collect();
                self.line_start = false;
                out.push(Segment::Block(ExecutableBlock::new(tag.into_action(body), raw)));
                true
            }
            Close::Pending(_) => false,
            Close::NotFound => {
                if eof {
                    let header = self.buf.lines().next().unwrap_or_default().to_string();
                    warn!("Stream ended inside executable fence {header}");
                    self.warnings.push(ParseWarning::unterminated(header));
                    self.buf.clear();
                    self.state = State::Text;
                }
                false
            }
        }
    }

    fn step_plain(&mut self, out: &mut Vec<Segment>, eof: bool) -> bool {
        match self.find_close(0, eof) {
            Close::Found(_, end) => {
                self.emit_text(end, out);
                self.line_start = false;
                self.state = State::Text;
                true
            }
            Close::Pending(line) => {
                self.emit_text(line, out);
                false
            }
            Close::NotFound => {
                self.emit_text(self.buf.len(), out);
                false
            }
        }
    }

    fn step_invoke(&mut self, out: &mut Vec<Segment>, eof: bool) -> bool {
        let Some(close) = self.buf.find(INVOKE_CLOSE) else {
            if !eof {
                return false;
            }
            warn!("Stream ended inside <invoke> block");
            let first_line = self.buf.lines().next().unwrap_or_default().to_string();
            self.warnings.push(ParseWarning::unterminated(first_line));
            // Release the opener as text and rescan the rest, which may
            // still hold complete fences.
            self.emit_text(INVOKE_OPEN.len(), out);
            self.state = State::Text;
            return true;
        };

        let end = close + INVOKE_CLOSE.len();
        let raw = self.buf.get(..end).unwrap_or_default().to_string();
        self.state = State::Text;
        match parse_invoke(&raw) {
            Ok(action) => {
                self.buf.drain(..end);
                self.line_start = false;
                out.push(Segment::Block(ExecutableBlock::new(action, raw)));
            }
            Err(detail) => {
                warn!("Malformed <invoke> block: {detail}");
                self.warnings.push(ParseWarning::malformed(detail));
                self.emit_text(end, out);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{BlockKind, WarningKind};

    fn parse_all(chunks: &[&str]) -> (Vec<Segment>, Vec<ParseWarning>) {
        let mut parser = FenceParser::new();
        let mut segments = Vec::new();
        for chunk in chunks {
            segments.extend(parser.push(chunk));
        }
        let tail = parser.finish();
        segments.extend(tail.segments);
        (segments, tail.warnings)
    }

    fn blocks(segments: &[Segment]) -> Vec<ExecutableBlock> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Block(b) => Some(b.clone()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    fn text(segments: &[Segment]) -> String {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) => Some(t.as_str()),
                Segment::Block(_) => None,
            })
            .collect()
    }

    /// Split `input` into chunks of `size` characters.
    fn chunked(input: &str, size: usize) -> Vec<String> {
        let chars: Vec<char> = input.chars().collect();
        chars.chunks(size).map(|c| c.iter().collect()).collect()
    }

    const MIXED: &str = "Let me list the files:\n\n```bash:execute\nls -la /tmp\n```\n\n\
        And create a script:\n\n```my_script.py:create\nprint(\"Hello world\")\n```\n\n\
        Some code for reference:\n```rust\nlet x = 1;\n```\n\
        Then <invoke name=\"read_file\"><parameter name=\"path\">a.txt</parameter></invoke> done!\n";

    #[test]
    fn scenario_text_block_text() {
        let (segments, warnings) = parse_all(&["List files.\n```bash:execute\nls\n```\nDone."]);
        assert!(warnings.is_empty());
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Text("List files.\n".into()));
        match &segments[1] {
            Segment::Block(b) => {
                assert_eq!(b.action, BlockAction::Shell {
                    command: "ls".into()
                });
                assert_eq!(b.raw, "```bash:execute\nls\n```");
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert_eq!(segments[2], Segment::Text("\nDone.".into()));
    }

    #[test]
    fn recognizes_execute_and_create_fences() {
        let (segments, _) = parse_all(&[MIXED]);
        let found = blocks(&segments);
        assert_eq!(found.len(), 3);

        assert_eq!(found[0].kind(), BlockKind::Shell);
        assert_eq!(found[0].target(), "ls -la /tmp");

        assert_eq!(found[1].action, BlockAction::FileCreate {
            path: "my_script.py".into(),
            contents: "print(\"Hello world\")".into(),
        });

        match &found[2].action {
            BlockAction::ToolCall { name, arguments } => {
                assert_eq!(name, "read_file");
                assert_eq!(arguments["path"], "a.txt");
            }
            other => panic!("expected tool call, got {other:?}"),
        }

        let prose = text(&segments);
        assert!(prose.contains("```rust\nlet x = 1;\n```"));
        assert!(prose.ends_with(" done!\n"));
    }

    #[test]
    fn every_chunking_yields_the_same_blocks_and_text() {
        let (reference, _) = parse_all(&[MIXED]);
        let expected_blocks = blocks(&reference);
        let expected_text = text(&reference);

        for size in 1..=12 {
            let pieces = chunked(MIXED, size);
            let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
            let (segments, warnings) = parse_all(&refs);
            assert!(warnings.is_empty(), "size {size}: {warnings:?}");
            assert_eq!(blocks(&segments), expected_blocks, "chunk size {size}");
            assert_eq!(text(&segments), expected_text, "chunk size {size}");
        }

        for split in 0..=MIXED.len() {
            if !MIXED.is_char_boundary(split) {
                continue;
            }
            let (a, b) = MIXED.split_at(split);
            let (segments, _) = parse_all(&[a, b]);
            assert_eq!(blocks(&segments), expected_blocks, "split at {split}");
            assert_eq!(text(&segments), expected_text, "split at {split}");
        }
    }

    #[test]
    fn text_is_released_before_block_closes() {
        let mut parser = FenceParser::new();
        let first = parser.push("Working on it.\n```bash:execute\nsleep 1");
        assert_eq!(first, vec![Segment::Text("Working on it.\n".into())]);
        let second = parser.push("\n```\n");
        assert_eq!(blocks(&second).len(), 1);
    }

    #[test]
    fn holds_back_only_possible_openers() {
        let mut parser = FenceParser::new();
        assert_eq!(parser.push("a < b and\n`"), vec![Segment::Text(
            "a < b and\n".into()
        )]);
        // Inline code is not a fence.
        let out = parser.push("x` is fine <inv");
        assert_eq!(out, vec![Segment::Text("`x` is fine ".into())]);
        let out = parser.push("oked here");
        assert_eq!(out, vec![Segment::Text("<invoked here".into())]);
    }

    #[test]
    fn multiple_bash_fences() {
        let input = "\n```bash:execute\necho \"First\"\n```\n\n```bash:execute\necho \"Second\"\n```\n";
        let (segments, _) = parse_all(&[input]);
        let found = blocks(&segments);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|b| b.kind() == BlockKind::Shell));
    }

    #[test]
    fn plain_text_has_no_blocks() {
        let (segments, warnings) =
            parse_all(&["Just some regular text without any code fences."]);
        assert!(blocks(&segments).is_empty());
        assert!(warnings.is_empty());
        assert_eq!(
            text(&segments),
            "Just some regular text without any code fences."
        );
    }

    #[test]
    fn python_fence_is_code() {
        let (segments, _) = parse_all(&["```python:execute\nprint(1)\nprint(2)\n```"]);
        let found = blocks(&segments);
        assert_eq!(found[0].action, BlockAction::Code {
            language: "python".into(),
            source: "print(1)\nprint(2)".into(),
        });
    }

    #[test]
    fn filename_tag_creates_even_with_execute() {
        let (segments, _) = parse_all(&["```notes/todo.md:execute\n- item\n```\n"]);
        assert_eq!(blocks(&segments)[0].action, BlockAction::FileCreate {
            path: "notes/todo.md".into(),
            contents: "- item".into(),
        });
    }

    #[test]
    fn backticks_inside_body_do_not_close() {
        let input = "```bash:execute\necho '```not a close'\n```\n";
        let (segments, _) = parse_all(&[input]);
        assert_eq!(blocks(&segments)[0].target(), "echo '```not a close'");
    }

    #[test]
    fn empty_body_is_allowed() {
        let (segments, _) = parse_all(&["```empty.txt:create\n```\n"]);
        assert_eq!(blocks(&segments)[0].action, BlockAction::FileCreate {
            path: "empty.txt".into(),
            contents: String::new(),
        });
    }

    #[test]
    fn unterminated_fence_becomes_warning() {
        let (segments, warnings) = parse_all(&["Start\n```bash:execute\nls -la\n"]);
        assert!(blocks(&segments).is_empty());
        assert_eq!(text(&segments), "Start\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Unterminated);
        assert!(warnings[0].detail.contains("bash:execute"));
    }

    #[test]
    fn unterminated_invoke_becomes_warning() {
        let input = "<invoke name=\"x\"><parameter name=\"a\">1";
        let (segments, warnings) = parse_all(&[input]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Unterminated);
        assert_eq!(text(&segments), input);
    }

    #[test]
    fn bare_invoke_tag_in_prose_is_text() {
        let input = "The <invoke> syntax is optional.\n```bash:execute\nls\n```\nok\n";
        for size in 1..=7 {
            let pieces = chunked(input, size);
            let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
            let (segments, warnings) = parse_all(&refs);
            assert!(warnings.is_empty());
            assert_eq!(text(&segments), "The <invoke> syntax is optional.\n\nok\n");
            let found = blocks(&segments);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].action, BlockAction::Shell {
                command: "ls".into()
            });
        }
    }

    #[test]
    fn fences_after_unclosed_invoke_survive() {
        let input = "Use <invoke name=\"x\"> like this.\n```bash:execute\nls\n```\nok\n";
        for size in [1, 3, input.len()] {
            let pieces = chunked(input, size);
            let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
            let (segments, warnings) = parse_all(&refs);
            assert_eq!(warnings.len(), 1);
            assert_eq!(warnings[0].kind, WarningKind::Unterminated);
            assert_eq!(text(&segments), "Use <invoke name=\"x\"> like this.\n\nok\n");
            assert_eq!(blocks(&segments)[0].target(), "ls");
        }
    }

    #[test]
    fn malformed_invoke_is_reported_and_kept_as_text() {
        let input = "<invoke name=\"\"></invoke> after";
        let (segments, warnings) = parse_all(&[input]);
        assert!(blocks(&segments).is_empty());
        assert_eq!(warnings[0].kind, WarningKind::Malformed);
        assert_eq!(text(&segments), input);
    }

    #[test]
    fn function_calls_wrapper_is_dropped() {
        let input = "<function_calls>\n<invoke name=\"bash:execute\">\
            <parameter name=\"command\">pwd</parameter></invoke>\n</function_calls>";
        let (segments, _) = parse_all(&[input]);
        assert_eq!(blocks(&segments)[0].action, BlockAction::Shell {
            command: "pwd".into()
        });
        assert_eq!(text(&segments), "\n\n");
    }

    #[test]
    fn closing_fence_at_end_of_stream() {
        let mut parser = FenceParser::new();
        let out = parser.push("```bash:execute\nls\n```");
        assert!(blocks(&out).is_empty(), "close must wait for newline or eof");
        let tail = parser.finish();
        assert_eq!(blocks(&tail.segments).len(), 1);
    }

    #[test]
    fn unicode_text_survives_any_split() {
        let input = "héllo → wörld\n```bash:execute\necho ✓\n```\nfin ✓";
        for size in 1..=5 {
            let pieces = chunked(input, size);
            let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
            let (segments, _) = parse_all(&refs);
            assert_eq!(text(&segments), "héllo → wörld\n\nfin ✓");
            assert_eq!(blocks(&segments)[0].target(), "echo ✓");
        }
    }
}

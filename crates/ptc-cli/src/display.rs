//! Rendering turn events to the terminal.
//!
//! Two modes: a human display with ANSI colours (text inline, executions
//! framed by rules, output indented) and JSON lines, one event per line.

use std::io::{self, Write};

use ptc_rs::agent::PtcEvent;
use ptc_rs::sandbox::ExecutionStatus;

const RULE_WIDTH: usize = 50;

const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Output format for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Pretty,
    JsonLines,
}

/// Write `event` to `out` in `mode`.
pub fn render(out: &mut impl Write, event: &PtcEvent, mode: DisplayMode) -> io::Result<()> {
    match mode {
        DisplayMode::JsonLines => {
            serde_json::to_writer(&mut *out, event)?;
            writeln!(out)?;
        }
        DisplayMode::Pretty => render_pretty(out, event)?,
    }
    out.flush()
}

fn render_pretty(out: &mut impl Write, event: &PtcEvent) -> io::Result<()> {
    match event {
        PtcEvent::TextDelta { text } => write!(out, "{text}"),
        PtcEvent::CodeExecution {
            code,
            output,
            status,
        } => {
            let rule = "\u{2500}".repeat(RULE_WIDTH);
            writeln!(out, "\n{DIM}{rule}{RESET}")?;
            let mut lines = code.lines();
            if let Some(first) = lines.next() {
                writeln!(out, "{YELLOW}\u{26a1} {first}{RESET}")?;
            }
            for line in lines {
                writeln!(out, "{YELLOW}  {line}{RESET}")?;
            }
            for line in output.lines() {
                writeln!(out, "{CYAN}  {line}{RESET}")?;
            }
            if *status == ExecutionStatus::Failed {
                writeln!(out, "{RED}  (failed){RESET}")?;
            }
            writeln!(out, "{DIM}{rule}{RESET}")
        }
        PtcEvent::TurnEnd { capped, .. } => {
            if *capped {
                writeln!(out, "\n{DIM}[iteration cap reached]{RESET}")
            } else {
                writeln!(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(event: &PtcEvent, mode: DisplayMode) -> String {
        let mut buf = Vec::new();
        render(&mut buf, event, mode).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn json_lines_are_one_object_per_line() {
        let out = rendered(&PtcEvent::TextDelta { text: "a\nb".into() }, DisplayMode::JsonLines);
        assert_eq!(out, "{\"type\":\"text_delta\",\"text\":\"a\\nb\"}\n");
    }

    #[test]
    fn text_is_printed_inline() {
        let out = rendered(&PtcEvent::TextDelta { text: "hi".into() }, DisplayMode::Pretty);
        assert_eq!(out, "hi");
    }

    #[test]
    fn failed_execution_is_marked() {
        let event = PtcEvent::CodeExecution {
            code: "python3 x.py".into(),
            output: "Traceback\nValueError: bad".into(),
            status: ExecutionStatus::Failed,
        };
        let out = rendered(&event, DisplayMode::Pretty);
        assert!(out.contains("\u{26a1} python3 x.py"));
        assert!(out.contains("  ValueError: bad"));
        assert!(out.contains("(failed)"));
    }

    #[test]
    fn capped_turn_is_noted() {
        let event = PtcEvent::TurnEnd {
            capped: true,
            warnings: vec![],
        };
        assert!(rendered(&event, DisplayMode::Pretty).contains("iteration cap"));
    }
}

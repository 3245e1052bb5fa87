//! Events emitted by a turn.
//!
//! A turn yields, in causal order, [`PtcEvent::TextDelta`] for model text,
//! one [`PtcEvent::CodeExecution`] per executed block, and exactly one
//! final [`PtcEvent::TurnEnd`]. On the wire each event is a JSON object
//! tagged by `type`:
//!
//! ```text
//! {"type":"text_delta","text":"List files.\n"}
//! {"type":"code_execution","code":"ls","output":"a.txt\n","status":"completed"}
//! {"type":"turn_end","capped":false,"warnings":[]}
//! ```

use serde::Serialize;

use crate::parser::ParseWarning;
use crate::sandbox::{ExecutionResult, ExecutionStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PtcEvent {
    /// Model text outside any executable block.
    TextDelta { text: String },
    /// A block ran. `output` is the combined stdout/stderr/error text.
    CodeExecution {
        code: String,
        output: String,
        status: ExecutionStatus,
    },
    /// The turn is over. `capped` is set when the iteration cap forced it.
    TurnEnd {
        capped: bool,
        warnings: Vec<ParseWarning>,
    },
}

impl PtcEvent {
    pub(crate) fn execution(result: &ExecutionResult) -> Self {
        PtcEvent::CodeExecution {
            code: result.block.display_code(),
            output: result.output(),
            status: result.status,
        }
    }

    pub fn is_turn_end(&self) -> bool {
        matches!(self, PtcEvent::TurnEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_is_tagged() {
        let delta = PtcEvent::TextDelta { text: "hi".into() };
        assert_eq!(
            serde_json::to_value(&delta).unwrap(),
            json!({"type": "text_delta", "text": "hi"})
        );

        let exec = PtcEvent::CodeExecution {
            code: "ls".into(),
            output: "a\n".into(),
            status: ExecutionStatus::Failed,
        };
        assert_eq!(
            serde_json::to_value(&exec).unwrap(),
            json!({"type": "code_execution", "code": "ls", "output": "a\n", "status": "failed"})
        );

        let end = PtcEvent::TurnEnd {
            capped: true,
            warnings: vec![ParseWarning::unterminated("bash:execute")],
        };
        let value = serde_json::to_value(&end).unwrap();
        assert_eq!(value["type"], "turn_end");
        assert_eq!(value["capped"], true);
        assert_eq!(value["warnings"][0]["kind"], "unterminated");
    }
}

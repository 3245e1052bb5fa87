//! `<invoke name="..."><parameter name="...">...</parameter></invoke>` blocks.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::BlockAction;

static INVOKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^<invoke\s+name\s*=\s*["']([^"']*)["']\s*>(.*)</invoke>$"#)
        .expect("invoke regex is valid")
});

static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<parameter\s+name\s*=\s*["']([^"']*)["']\s*>(.*?)</parameter>"#)
        .expect("parameter regex is valid")
});

/// Interpret a complete invocation block.
///
/// `bash:execute` and `python:execute` map onto the same actions as the
/// equivalent fences. Every other name is a direct skill call whose
/// parameter values are decoded as JSON when they parse, and kept as
/// strings otherwise. Returns a description of the problem on failure.
pub fn parse_invoke(raw: &str) -> Result<BlockAction, String> {
    let caps = INVOKE_RE
        .captures(raw.trim())
        .ok_or_else(|| "expected <invoke name=\"...\">...</invoke>".to_string())?;
    let name = caps.get(1).map_or("", |m| m.as_str()).trim();
    if name.is_empty() {
        return Err("<invoke> without a tool name".to_string());
    }
    let body = caps.get(2).map_or("", |m| m.as_str());

    let mut params: Vec<(String, String)> = Vec::new();
    for cap in PARAM_RE.captures_iter(body) {
        let key = cap.get(1).map_or("", |m| m.as_str()).trim();
        if key.is_empty() {
            return Err(format!("parameter without a name in '{name}'"));
        }
        let value = cap.get(2).map_or("", |m| m.as_str());
        params.push((key.to_string(), unescape(trim_one_newline(value))));
    }

    let pick = |wanted: &str| -> Option<String> {
        params
            .iter()
            .find(|(k, _)| k == wanted)
            .or_else(|| params.first())
            .map(|(_, v)| v.clone())
    };

    match name {
        "bash:execute" | "sh:execute" | "shell:execute" => {
            let command = pick("command").ok_or_else(|| format!("'{name}' without a command"))?;
            Ok(BlockAction::Shell { command })
        }
        "python:execute" | "py:execute" | "python3:execute" => {
            let source = pick("code").ok_or_else(|| format!("'{name}' without code"))?;
            Ok(BlockAction::Code {
                language: "python".to_string(),
                source,
            })
        }
        _ => {
            let arguments: Map<String, Value> = params
                .into_iter()
                .map(|(k, v)| {
                    let value = serde_json::from_str(&v).unwrap_or(Value::String(v));
                    (k, value)
                })
                .collect();
            Ok(BlockAction::ToolCall {
                name: name.to_string(),
                arguments,
            })
        }
    }
}

/// Models usually put parameter values on their own line.
fn trim_one_newline(value: &str) -> &str {
    let value = value.strip_prefix('\n').unwrap_or(value);
    value.strip_suffix('\n').unwrap_or(value)
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_invoke_maps_to_shell() {
        let raw = "<invoke name=\"bash:execute\">\n<parameter name=\"command\">\nls -la\n</parameter>\n</invoke>";
        assert_eq!(parse_invoke(raw).unwrap(), BlockAction::Shell {
            command: "ls -la".into()
        });
    }

    #[test]
    fn python_invoke_uses_first_parameter_when_unnamed() {
        let raw = "<invoke name='python:execute'><parameter name='src'>print(1 &lt; 2)</parameter></invoke>";
        assert_eq!(parse_invoke(raw).unwrap(), BlockAction::Code {
            language: "python".into(),
            source: "print(1 < 2)".into(),
        });
    }

    #[test]
    fn tool_call_decodes_json_values() {
        let raw = r#"<invoke name="search"><parameter name="query">rust &amp; tokio</parameter><parameter name="limit">5</parameter><parameter name="filters">{"lang": "en"}</parameter></invoke>"#;
        let BlockAction::ToolCall { name, arguments } = parse_invoke(raw).unwrap() else {
            panic!("expected tool call");
        };
        assert_eq!(name, "search");
        assert_eq!(arguments["query"], "rust & tokio");
        assert_eq!(arguments["limit"], 5);
        assert_eq!(arguments["filters"]["lang"], "en");
    }

    #[test]
    fn tool_call_without_parameters() {
        let raw = "<invoke name=\"list_tables\"></invoke>";
        let BlockAction::ToolCall { arguments, .. } = parse_invoke(raw).unwrap() else {
            panic!("expected tool call");
        };
        assert!(arguments.is_empty());
    }

    #[test]
    fn rejects_missing_name_and_empty_shell() {
        assert!(parse_invoke("<invoke name=\"\"></invoke>").is_err());
        assert!(parse_invoke("<invoke name=\"bash:execute\"></invoke>").is_err());
        assert!(parse_invoke("<invoke>oops</invoke>").is_err());
    }
}

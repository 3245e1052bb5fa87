//! Local skills registered by the `ptc` binary.
//!
//! These run in-process and reach model-authored Python through the bridge
//! like any remote tool.

pub mod git;

use std::path::Path;

use ptc_rs::skills::LocalFunction;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Arguments for `word_count`.
#[derive(Deserialize, JsonSchema)]
pub struct WordCountArgs {
    /// Text to measure.
    pub text: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WordCount {
    pub lines: usize,
    pub words: usize,
    pub chars: usize,
}

fn count(text: &str) -> WordCount {
    WordCount {
        lines: text.lines().count(),
        words: text.split_whitespace().count(),
        chars: text.chars().count(),
    }
}

pub fn word_count() -> LocalFunction {
    LocalFunction::typed(
        "word_count",
        "Count lines, words and characters in a piece of text.",
        |args: WordCountArgs| async move { Ok(count(&args.text)) },
    )
}

/// Every built-in local skill, scoped to `workspace` where relevant.
pub fn builtin_functions(workspace: &Path) -> Vec<LocalFunction> {
    vec![
        word_count(),
        git::git_status(workspace),
        git::git_log(workspace),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    #[test]
    fn counts_text() {
        assert_eq!(
            count("one two\nthree"),
            WordCount {
                lines: 2,
                words: 3,
                chars: 13
            }
        );
    }

    #[tokio::test]
    async fn word_count_round_trips_json() {
        let f = word_count();
        let mut kwargs = Map::new();
        kwargs.insert("text".into(), Value::String("a b c".into()));
        let out = f.invoke(kwargs).await.unwrap();
        assert_eq!(out, json!({"lines": 1, "words": 3, "chars": 5}));
    }

    #[test]
    fn builtin_names_are_unique() {
        let fs = builtin_functions(Path::new("."));
        let mut names: Vec<_> = fs.iter().map(|f| f.name().to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), fs.len());
    }
}

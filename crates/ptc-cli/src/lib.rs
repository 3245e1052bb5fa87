//! Terminal front end for the `ptc-rs` programmatic tool-calling engine.
//!
//! The `ptc` binary wires the pieces together: a registry of built-in local
//! skills plus optional command-template tools, generated bindings in the
//! workspace, a loopback bridge, an executor, and a turn controller driven
//! by OpenRouter (or a scripted model for offline runs).
//!
//! ```sh
//! # One-shot
//! ptc --workspace ./scratch --prompt "Count the words in notes.txt"
//!
//! # Read one turn per line from stdin, emit JSON lines
//! ptc --workspace ./scratch --json < prompts.txt
//!
//! # Offline, replaying canned responses
//! ptc --script responses.json --prompt "anything"
//! ```

pub mod command_tools;
pub mod config;
pub mod display;
pub mod prompt;
pub mod tools;

pub use command_tools::CommandToolServer;
pub use config::CliConfig;
pub use display::{DisplayMode, render};
pub use prompt::cli_system_prompt;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use ptc_rs::model::ScriptedModel;
use ptc_rs::skills::Registry;

/// Boxed error for setup failures reported by the binary.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Build the skill registry: built-in local functions, plus the tools in
/// `tools_file` when given.
pub async fn build_registry(workspace: &Path, tools_file: Option<&Path>) -> Result<Registry, BoxError> {
    let mut builder = Registry::builder();
    for function in tools::builtin_functions(workspace) {
        builder = builder.local(function);
    }
    if let Some(path) = tools_file {
        let server = CommandToolServer::load(path, workspace)?;
        builder = builder.discover(Arc::new(server)).await?;
    }
    Ok(builder.build()?)
}

/// Load a scripted model from a JSON array of response strings.
pub fn load_script(path: &Path) -> Result<ScriptedModel, BoxError> {
    let json = std::fs::read_to_string(path)?;
    let responses: Vec<String> = serde_json::from_str(&json)?;
    Ok(ScriptedModel::new(responses).with_chunk_chars(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_has_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let registry = build_registry(dir.path(), None).await.unwrap();
        assert!(registry.contains("word_count"));
        assert!(registry.contains("git_status"));
    }

    #[tokio::test]
    async fn tools_file_adds_remote_server() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tools.json");
        std::fs::write(
            &file,
            r#"{"server": "sys", "tools": [{"name": "uptime", "description": "Uptime.", "command": "uptime"}]}"#,
        )
        .unwrap();
        let registry = build_registry(dir.path(), Some(&file)).await.unwrap();
        assert!(registry.contains("uptime"));
        assert_eq!(registry.servers(), vec!["sys"]);
    }

    #[tokio::test]
    async fn colliding_tool_names_fail() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tools.json");
        std::fs::write(
            &file,
            r#"{"tools": [{"name": "word_count", "command": "wc -w"}]}"#,
        )
        .unwrap();
        let err = build_registry(dir.path(), Some(&file)).await.unwrap_err();
        assert!(err.to_string().contains("word_count"));
    }

    #[test]
    fn script_is_array_of_strings() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.json");
        std::fs::write(&file, r#"["one", "two"]"#).unwrap();
        assert!(load_script(&file).is_ok());
        std::fs::write(&file, r#"{"not": "a list"}"#).unwrap();
        assert!(load_script(&file).is_err());
    }
}

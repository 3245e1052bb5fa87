//! System prompt assembly.
//!
//! [`ptc_system_prompt`] produces the default prompt that teaches a model
//! the fence protocol, points it at the generated skills directory and lists
//! the skills in a [`Registry`].
//! [`SystemPromptBuilder`] is the underlying section builder and can be
//! used to extend it.

use std::path::Path;

use crate::skills::{Registry, SkillSource};

const PREAMBLE: &str = "You are an AI assistant working inside a workspace directory. \
You act by writing executable code blocks; each block runs as soon as you close it and \
its output is sent back to you before you continue.";

const FENCE_SYNTAX: &str = r#"To run a shell command:
```bash:execute
<command>
```

To run Python:
```python:execute
<code>
```

To create a file (the path is relative to the workspace):
```path/to/file.ext:create
<contents>
```

Write one block at a time and wait for its result. Ordinary code fences
without `:execute` or `:create` are shown to the user and not run."#;

const TOOL_CALLING: &str = r#"```python:execute
from _lib.tools import read_file
print(read_file(path="notes.txt"))
```
Tools take keyword arguments only. A failing tool raises `ToolError`.
Always explore the skills directory first to discover available tools."#;

fn skills_usage(skills_dir: &Path) -> String {
    let dir = skills_dir.display();
    format!(
        "The `{dir}/` directory documents every tool available to you.\n\
         Explore it with `ls {dir}/` and `cat {dir}/SKILL.md`, then call tools from Python:\n\
         {TOOL_CALLING}"
    )
}

/// Builder for multi-section system prompts.
///
/// Sections are joined with blank lines; empty sections are skipped.
///
/// ```
/// use ptc_rs::agent::prompt::SystemPromptBuilder;
///
/// let prompt = SystemPromptBuilder::new("You are helpful.")
///     .section("Context", "Today is Monday.")
///     .section_if(false, "Hidden", || "never".into())
///     .build();
///
/// assert!(prompt.contains("## Context"));
/// assert!(!prompt.contains("## Hidden"));
/// ```
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    sections: Vec<String>,
}

impl SystemPromptBuilder {
    /// Start with a preamble, included as-is.
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            sections: vec![preamble.into()],
        }
    }

    /// Append a `## heading` section. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.sections.push(format!("## {heading}\n\n{content}"));
        }
        self
    }

    /// Append a section only when `condition` holds.
    pub fn section_if(
        self,
        condition: bool,
        heading: &str,
        content_fn: impl FnOnce() -> String,
    ) -> Self {
        if condition {
            self.section(heading, content_fn())
        } else {
            self
        }
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

/// The default programmatic tool-calling prompt for `registry`.
///
/// `skills_dir` is where the bindings were materialized, spelled the way
/// the model should type it (usually relative to the workspace).
pub fn ptc_system_prompt(registry: &Registry, skills_dir: &Path) -> String {
    ptc_prompt_builder(registry, skills_dir).build()
}

/// [`ptc_system_prompt`] as a builder, for callers that add sections.
pub fn ptc_prompt_builder(registry: &Registry, skills_dir: &Path) -> SystemPromptBuilder {
    SystemPromptBuilder::new(PREAMBLE)
        .section("Running code", FENCE_SYNTAX)
        .section_if(!registry.is_empty(), "Tools", || {
            format!("{}\n\n{}", skills_usage(skills_dir), skill_listing(registry))
        })
}

/// One line per skill, remote servers first, then local functions.
fn skill_listing(registry: &Registry) -> String {
    let mut lines = Vec::new();
    for server in registry.servers() {
        lines.push(format!("Remote server `{server}`:"));
        for skill in registry.skills() {
            if matches!(&skill.source, SkillSource::Remote { server: s } if s == server) {
                lines.push(format!("- `{}`: {}", skill.callable, skill.summary()));
            }
        }
    }
    let local: Vec<_> = registry
        .skills()
        .filter(|s| s.source == SkillSource::Local)
        .collect();
    if !local.is_empty() {
        lines.push("Local functions:".to_string());
        for skill in local {
            lines.push(format!("- `{}`: {}", skill.callable, skill.summary()));
        }
    }
    lines.join("\n")
}

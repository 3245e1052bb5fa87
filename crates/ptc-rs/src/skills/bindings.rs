//! Render a [`Registry`] into Python stubs and capability documents.
//!
//! Layout, relative to the skills directory:
//!
//! ```text
//! SKILL.md                          index grouped by provenance
//! _lib/__init__.py
//! _lib/tools.py                     one stub per skill
//! _lib/.generated                   marker: this tree may be replaced
//! remote/<server>/<tool>/SKILL.md
//! local/<tool>/SKILL.md
//! ```
//!
//! Rendering is a pure function of the registry, so materializing the same
//! registry twice yields byte-identical files.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Param, Registry, Skill, SkillSource, python_identifier};

/// Generated files keyed by path relative to the skills directory.
pub type Artifacts = BTreeMap<PathBuf, String>;

/// Environment variable the stubs read the bridge URL from.
pub const BRIDGE_URL_ENV: &str = "PTC_BRIDGE_URL";

const MARKER: &str = "_lib/.generated";

/// Top-level entries owned by a generated tree.
const GENERATED_ROOTS: [&str; 4] = ["_lib", "remote", "local", "SKILL.md"];

const TOOLS_PRELUDE: &str = r#""""Generated skill bindings. Do not edit; regenerated on every build."""

import json
import os
import urllib.error
import urllib.request
from typing import Any

_MISSING = object()


class ToolError(Exception):
    """A skill call failed. `kind` is the bridge error kind."""

    def __init__(self, kind, message):
        super().__init__(f"{kind}: {message}")
        self.kind = kind
        self.message = message


def _call(name, kwargs):
    url = os.environ.get("PTC_BRIDGE_URL")
    if not url:
        raise ToolError("no_bridge", "PTC_BRIDGE_URL is not set")
    kwargs = {k: v for k, v in kwargs.items() if v is not _MISSING}
    body = json.dumps({"name": name, "kwargs": kwargs}).encode("utf-8")
    request = urllib.request.Request(
        url.rstrip("/") + "/call",
        data=body,
        headers={"Content-Type": "application/json"},
        method="POST",
    )
    try:
        with urllib.request.urlopen(request) as response:
            payload = json.loads(response.read().decode("utf-8"))
    except urllib.error.HTTPError as err:
        try:
            payload = json.loads(err.read().decode("utf-8"))
        except ValueError:
            raise ToolError("bridge_error", str(err)) from None
    if "error" in payload:
        raise ToolError(payload["error"], payload.get("message", ""))
    return payload.get("result")
"#;

/// Render every generated file for `registry`.
pub fn render(registry: &Registry) -> Artifacts {
    let mut files = Artifacts::new();
    files.insert(
        PathBuf::from("_lib/__init__.py"),
        "from .tools import *  # noqa: F401,F403\n".to_string(),
    );
    files.insert(PathBuf::from("_lib/tools.py"), render_tools_module(registry));
    files.insert(PathBuf::from(MARKER), "generated by ptc-rs\n".to_string());
    files.insert(PathBuf::from("SKILL.md"), render_index(registry));
    for skill in registry.skills() {
        files.insert(doc_path(skill), render_skill_doc(skill));
    }
    files
}

/// Write the rendered tree under `dir`, replacing an earlier generated tree.
///
/// Entries the generator does not own are left alone. Returns the number
/// of files written.
pub fn materialize(registry: &Registry, dir: impl AsRef<Path>) -> io::Result<usize> {
    let dir = dir.as_ref();
    if dir.join(MARKER).is_file() {
        debug!("Replacing generated skills tree at {}", dir.display());
        for root in GENERATED_ROOTS {
            let path = dir.join(root);
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else if path.is_file() {
                std::fs::remove_file(&path)?;
            }
        }
    }

    let files = render(registry);
    for (rel, contents) in &files {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
    }
    info!(
        "Materialized {} skills ({} files) into {}",
        registry.len(),
        files.len(),
        dir.display()
    );
    Ok(files.len())
}

/// Relative path of a skill's capability document.
pub fn doc_path(skill: &Skill) -> PathBuf {
    match &skill.source {
        SkillSource::Remote { server } => PathBuf::from("remote")
            .join(path_segment(server))
            .join(&skill.callable)
            .join("SKILL.md"),
        SkillSource::Local => PathBuf::from("local").join(&skill.callable).join("SKILL.md"),
    }
}

fn path_segment(name: &str) -> String {
    let seg: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if seg.chars().all(|c| c == '.') { format!("_{seg}") } else { seg }
}

fn render_tools_module(registry: &Registry) -> String {
    let mut out = String::from(TOOLS_PRELUDE);
    let mut exports = vec!["ToolError".to_string()];

    for skill in registry.skills() {
        exports.push(skill.callable.clone());
        let params = skill.params();

        let mut sig = Vec::with_capacity(params.len());
        let mut kwargs = Vec::with_capacity(params.len());
        for p in &params {
            // The registry has already rejected names without an identifier.
            let Ok(ident) = python_identifier(&p.name) else {
                continue;
            };
            let hint = p.ty.python_hint();
            if p.is_required() {
                sig.push(format!("{ident}: {hint}"));
            } else {
                sig.push(format!("{ident}: {hint} = _MISSING"));
            }
            kwargs.push(format!("{}: {ident}", py_string(&p.name)));
        }

        let signature = if sig.is_empty() {
            String::new()
        } else {
            format!("*, {}", sig.join(", "))
        };
        let _ = write!(
            out,
            "\n\ndef {}({signature}) -> Any:\n    {}\n    return _call({}, {{{}}})\n",
            skill.callable,
            py_string(skill.description.trim()),
            py_string(&skill.name),
            kwargs.join(", "),
        );
    }

    let quoted: Vec<String> = exports.iter().map(String::as_str).map(py_string).collect();
    let _ = write!(out, "\n\n__all__ = [{}]\n", quoted.join(", "));
    out
}

fn render_index(registry: &Registry) -> String {
    let mut out = String::from("# Skills\n\n");
    out.push_str(
        "Every skill below is a Python function. Inside a `python:execute` block the\n\
         bindings are already imported, so call them directly with keyword arguments.\n\
         Failed calls raise `ToolError`. Read a skill's `SKILL.md` for its parameters.\n",
    );
    if registry.is_empty() {
        out.push_str("\nNo skills are registered.\n");
        return out;
    }

    for server in registry.servers() {
        let _ = write!(out, "\n## Remote: {server}\n\n");
        for skill in registry
            .skills()
            .filter(|s| matches!(&s.source, SkillSource::Remote { server: name } if name == server))
        {
            index_line(&mut out, skill);
        }
    }

    let mut local = registry
        .skills()
        .filter(|s| s.source == SkillSource::Local)
        .peekable();
    if local.peek().is_some() {
        out.push_str("\n## Local\n\n");
        for skill in local {
            index_line(&mut out, skill);
        }
    }
    out
}

fn index_line(out: &mut String, skill: &Skill) {
    let _ = writeln!(
        out,
        "- `{}` ({}): {}",
        skill.callable,
        doc_path(skill).display(),
        skill.summary()
    );
}

fn render_skill_doc(skill: &Skill) -> String {
    let source = match &skill.source {
        SkillSource::Remote { server } => format!("remote/{server}"),
        SkillSource::Local => "local".to_string(),
    };
    let mut out = String::new();
    let _ = writeln!(out, "---");
    let _ = writeln!(out, "name: {}", skill.callable);
    let _ = writeln!(out, "description: {}", yaml_string(skill.summary()));
    let _ = writeln!(out, "source: {source}");
    let _ = writeln!(out, "---\n");
    let _ = writeln!(out, "# {}\n", skill.callable);
    if skill.description.trim().is_empty() {
        out.push_str("No description provided.\n");
    } else {
        let _ = writeln!(out, "{}", skill.description.trim_end());
    }

    let params = skill.params();
    out.push_str("\n## Parameters\n\n");
    if params.is_empty() {
        out.push_str("None.\n");
    } else {
        out.push_str("| Name | Type | Required | Default | Description |\n");
        out.push_str("|------|------|----------|---------|-------------|\n");
        for p in &params {
            param_row(&mut out, p);
        }
    }

    let _ = write!(
        out,
        "\n## Example\n\n```python:execute\nresult = {}\nprint(result)\n```\n",
        skill.example
    );
    out
}

fn param_row(out: &mut String, p: &Param) {
    let (required, default) = match &p.default {
        None => ("yes", String::new()),
        Some(serde_json::Value::Null) => ("no", String::new()),
        Some(v) => ("no", format!("`{v}`")),
    };
    let _ = writeln!(
        out,
        "| `{}` | {} | {required} | {default} | {} |",
        p.name,
        p.ty,
        p.description.replace('|', "\\|").replace('\n', " ")
    );
}

/// Double-quoted string literal valid in both Python and YAML.
fn py_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn yaml_string(s: &str) -> String {
    py_string(s)
}

//! Skills: the unified tool namespace exposed to model-authored code.
//!
//! A [`Skill`] is built either from a remote tool server's listing
//! ([`RemoteToolSchema`]) or from a [`LocalFunction`] registered in-process.
//! The [`Registry`] merges both into one injective namespace, and
//! [`bindings`] renders that namespace into importable Python stubs plus one
//! `SKILL.md` document per tool.
//!
//! # Example
//!
//! ```ignore
//! use ptc_rs::skills::{LocalFunction, Param, ParamType, Registry};
//! use serde_json::json;
//!
//! let echo = LocalFunction::new(
//!     "echo",
//!     "Return the message unchanged.",
//!     vec![Param::required("message", ParamType::String)],
//!     |kwargs| async move { Ok(json!(kwargs["message"])) },
//! );
//!
//! let registry = Registry::builder()
//!     .remote(fs_server, fs_schemas)
//!     .local(echo)
//!     .build()?;
//! bindings::materialize(&registry, workspace.join("skills"))?;
//! ```

pub mod bindings;
pub mod local;
pub mod registry;
pub mod remote;

pub use local::{LocalFunction, Param, ParamType};
pub use registry::{Registry, RegistryBuilder};
pub use remote::{RemoteFuture, RemoteToolSchema, RemoteToolServer};

use serde::Serialize;
use serde_json::Value;

use crate::error::RegistryError;

/// Where a skill's implementation lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkillSource {
    Remote { server: String },
    Local,
}

impl std::fmt::Display for SkillSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillSource::Remote { server } => write!(f, "remote server '{server}'"),
            SkillSource::Local => write!(f, "local function"),
        }
    }
}

/// A documented, callable capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skill {
    /// Name the bridge dispatches on.
    pub name: String,
    /// Python identifier the binding is exposed under.
    pub callable: String,
    pub source: SkillSource,
    pub description: String,
    pub input_schema: Value,
    /// A runnable one-line call of the binding.
    pub example: String,
}

impl Skill {
    /// The parameter list implied by the input schema, required first.
    pub fn params(&self) -> Vec<Param> {
        local::params_from_schema(&self.input_schema)
    }

    /// First line of the description.
    pub fn summary(&self) -> &str {
        self.description.lines().next().unwrap_or_default().trim()
    }
}

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Turn a tool or parameter name into a valid Python identifier.
///
/// Non-identifier characters become `_`, a leading digit gets a `_` prefix
/// and keywords get a `_` suffix. Names with no alphanumeric character at
/// all are rejected.
pub fn python_identifier(name: &str) -> Result<String, RegistryError> {
    if !name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if PYTHON_KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    Ok(ident)
}

/// Render a call of `callable` with placeholder values for the required
/// parameters.
pub(crate) fn example_call(callable: &str, params: &[Param]) -> String {
    let args: Vec<String> = params
        .iter()
        .filter(|p| p.default.is_none())
        .filter_map(|p| {
            let ident = python_identifier(&p.name).ok()?;
            Some(format!("{ident}={}", p.ty.placeholder()))
        })
        .collect();
    format!("{callable}({})", args.join(", "))
}

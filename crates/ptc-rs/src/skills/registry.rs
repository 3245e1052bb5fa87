//! The merged skill namespace.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::local::params_from_schema;
use super::{
    LocalFunction, RemoteToolSchema, RemoteToolServer, Skill, SkillSource, example_call,
    python_identifier,
};
use crate::error::{RegistryError, RemoteError};

/// Implementation behind a skill.
#[derive(Clone)]
pub(crate) enum Backend {
    Remote(Arc<dyn RemoteToolServer>),
    Local(Arc<LocalFunction>),
}

struct Entry {
    skill: Skill,
    backend: Backend,
}

/// Read-only mapping from tool name to skill and implementation.
///
/// Built once with [`Registry::builder`]; share it behind an `Arc`. Tool
/// names and generated callable identifiers are both unique.
pub struct Registry {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("skills", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// A registry with no skills.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.entries.get(name).map(|e| &e.skill)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All skills, sorted by name.
    pub fn skills(&self) -> impl Iterator<Item = &Skill> {
        self.entries.values().map(|e| &e.skill)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the remote servers that contributed skills, sorted.
    pub fn servers(&self) -> Vec<&str> {
        let mut servers: Vec<&str> = self
            .entries
            .values()
            .filter_map(|e| match &e.skill.source {
                SkillSource::Remote { server } => Some(server.as_str()),
                SkillSource::Local => None,
            })
            .collect();
        servers.sort_unstable();
        servers.dedup();
        servers
    }

    pub(crate) fn backend(&self, name: &str) -> Option<(&Skill, &Backend)> {
        self.entries.get(name).map(|e| (&e.skill, &e.backend))
    }
}

/// Collects remote listings and local functions, then checks the namespace.
#[derive(Default)]
pub struct RegistryBuilder {
    remote: Vec<(Arc<dyn RemoteToolServer>, Vec<RemoteToolSchema>)>,
    local: Vec<LocalFunction>,
}

impl RegistryBuilder {
    /// Add the tools of a remote server from an already fetched listing.
    pub fn remote(mut self, server: Arc<dyn RemoteToolServer>, schemas: Vec<RemoteToolSchema>) -> Self {
        self.remote.push((server, schemas));
        self
    }

    /// Fetch the listing from `server` and add its tools.
    pub async fn discover(self, server: Arc<dyn RemoteToolServer>) -> Result<Self, RemoteError> {
        let schemas = server.list_tools().await?;
        info!("Discovered {} tools on '{}'", schemas.len(), server.name());
        Ok(self.remote(server, schemas))
    }

    pub fn local(mut self, function: LocalFunction) -> Self {
        self.local.push(function);
        self
    }

    /// Build the registry. Remote tools are added in registration order,
    /// then local functions. The first duplicate tool name or callable
    /// identifier fails the build.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
        let mut callables: HashMap<String, SkillSource> = HashMap::new();

        let remote = self.remote.into_iter().flat_map(|(server, schemas)| {
            schemas.into_iter().map(move |schema| {
                let source = SkillSource::Remote {
                    server: server.name().to_string(),
                };
                (schema.name, schema.description, schema.input_schema, source, Backend::Remote(Arc::clone(&server)))
            })
        });
        let local = self.local.into_iter().map(|f| {
            (
                f.name().to_string(),
                f.doc().to_string(),
                f.input_schema().clone(),
                SkillSource::Local,
                Backend::Local(Arc::new(f)),
            )
        });

        for (name, description, input_schema, source, backend) in remote.chain(local) {
            if let Some(existing) = entries.get(&name) {
                return Err(RegistryError::NameCollision {
                    name,
                    first: existing.skill.source.clone(),
                    second: source,
                });
            }
            let callable = python_identifier(&name)?;
            if let Some(first) = callables.get(&callable) {
                return Err(RegistryError::NameCollision {
                    name: callable,
                    first: first.clone(),
                    second: source,
                });
            }
            callables.insert(callable.clone(), source.clone());
            check_params(&name, &input_schema)?;

            let example = example_call(&callable, &params_from_schema(&input_schema));
            debug!("Registered skill '{name}' from {source}");
            let skill = Skill {
                name: name.clone(),
                callable,
                source,
                description,
                input_schema,
                example,
            };
            entries.insert(name, Entry { skill, backend });
        }

        info!("Skill registry built with {} skills", entries.len());
        Ok(Registry { entries })
    }
}

/// Names the generated stub body refers to; a parameter may not shadow them.
const STUB_RESERVED: [&str; 1] = ["_call"];

/// Every parameter must bind to a distinct keyword argument in the stub.
fn check_params(tool: &str, input_schema: &Value) -> Result<(), RegistryError> {
    let mut seen: HashMap<String, String> = STUB_RESERVED
        .iter()
        .map(|r| (r.to_string(), r.to_string()))
        .collect();
    for param in params_from_schema(input_schema) {
        let ident = python_identifier(&param.name).map_err(|_| RegistryError::InvalidParameter {
            tool: tool.to_string(),
            param: param.name.clone(),
        })?;
        if let Some(first) = seen.insert(ident.clone(), param.name.clone()) {
            return Err(RegistryError::ParameterCollision {
                tool: tool.to_string(),
                ident,
                first,
                second: param.name,
            });
        }
    }
    Ok(())
}

//! CLI configuration with sensible defaults.
//!
//! [`CliConfig`] captures what the `ptc` binary needs and converts it into
//! `ptc-rs` types via [`model_config`](CliConfig::model_config),
//! [`executor_config`](CliConfig::executor_config) and
//! [`ptc_config`](CliConfig::ptc_config).

use std::path::PathBuf;
use std::time::Duration;

use ptc_rs::agent::{DEFAULT_MAX_ITERATIONS, PtcConfig};
use ptc_rs::api::RetryConfig;
use ptc_rs::model::ModelConfig;
use ptc_rs::sandbox::{DEFAULT_EXEC_TIMEOUT, ExecutorConfig};
use ptc_rs::skills::Registry;

use crate::prompt::cli_system_prompt;

/// Settings for a `ptc` session.
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    /// Model identifier. Default: `"anthropic/claude-haiku-4.5"`.
    pub model: String,
    /// Workspace root for execution. Default: `"."`.
    pub workspace: PathBuf,
    /// Executions per turn before it is cut off. Default: `20`.
    pub max_iterations: usize,
    /// Wall-clock bound per block. Default: `60`.
    pub timeout_secs: u64,
    /// Maximum tokens per model response. Default: `4096`.
    pub max_tokens: u32,
    /// Sampling temperature. Default: provider default.
    pub temperature: Option<f32>,
    /// Retries for opening the model stream. Default: `2`.
    pub retries: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            model: ptc_rs::DEFAULT_MODEL.to_string(),
            workspace: PathBuf::from("."),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_secs: DEFAULT_EXEC_TIMEOUT.as_secs(),
            max_tokens: 4096,
            temperature: None,
            retries: 2,
        }
    }
}

impl CliConfig {
    pub fn model_config(&self) -> ModelConfig {
        let config = ModelConfig::new(self.model.clone())
            .with_max_tokens(self.max_tokens)
            .with_retry(RetryConfig::with_retries(self.retries));
        match self.temperature {
            Some(t) => config.with_temperature(t),
            None => config,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default().with_timeout(Duration::from_secs(self.timeout_secs))
    }

    pub fn ptc_config(&self, registry: &Registry) -> PtcConfig {
        PtcConfig::default()
            .with_system_prompt(cli_system_prompt(registry, &self.workspace, &self.skills_dir()))
            .with_max_iterations(self.max_iterations)
    }

    /// Where generated skill bindings are written.
    pub fn skills_dir(&self) -> PathBuf {
        self.workspace.join("skills")
    }
}

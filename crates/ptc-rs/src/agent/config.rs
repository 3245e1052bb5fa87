//! Configuration for the [`TurnController`](super::TurnController).
//!
//! ```ignore
//! let config = PtcConfig::default()
//!     .with_system_prompt(ptc_system_prompt(&registry, Path::new("skills")))
//!     .with_max_iterations(10);
//! ```
//!
//! Model settings (model id, tokens, temperature, retry) belong to the
//! [`ChatModel`](crate::model::ChatModel) implementation; see
//! [`ModelConfig`](crate::model::ModelConfig).

/// Default ceiling on executions per user turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Turn-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtcConfig {
    /// Sent as the first message of the conversation, if set.
    pub system_prompt: Option<String>,
    /// Hard cap on block executions in one turn. Reaching it ends the turn
    /// with `capped: true`.
    pub max_iterations: usize,
}

impl Default for PtcConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl PtcConfig {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the iteration cap. Values below 1 are raised to 1.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PtcConfig::default();
        assert_eq!(config.max_iterations, 20);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn zero_iterations_is_clamped() {
        assert_eq!(PtcConfig::default().with_max_iterations(0).max_iterations, 1);
    }
}

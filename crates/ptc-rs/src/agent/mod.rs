//! Agent runtime: the [`TurnController`] state machine and its supporting types.
//!
//! - [`controller::TurnController`]: runs user turns, interleaving model
//!   streaming with block execution. Start here.
//! - [`config::PtcConfig`]: system prompt and iteration cap.
//! - [`events::PtcEvent`]: what a turn reports to its caller.
//! - [`prompt`]: the default system prompt describing the fence protocol and
//!   the registered skills.

pub mod config;
pub mod controller;
pub mod events;
pub mod prompt;

pub use config::{DEFAULT_MAX_ITERATIONS, PtcConfig};
pub use controller::TurnController;
pub use events::PtcEvent;
pub use prompt::{SystemPromptBuilder, ptc_prompt_builder, ptc_system_prompt};

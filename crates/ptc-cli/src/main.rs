//! `ptc`: run a programmatic tool-calling session in the terminal.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable unless
//! `--script` is given. Logs go to stderr (`RUST_LOG`, default `ptc=info`);
//! stdout carries only the event display.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use ptc_bridge::{BridgeConfig, spawn_bridge};
use ptc_cli::{BoxError, CliConfig, DisplayMode, build_registry, load_script, render};
use ptc_rs::OpenRouterClient;
use ptc_rs::agent::TurnController;
use ptc_rs::bridge::Bridge;
use ptc_rs::error::TurnError;
use ptc_rs::model::{ChatModel, OpenRouterModel};
use ptc_rs::sandbox::Executor;
use ptc_rs::skills::bindings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Let a language model use tools by writing code.
#[derive(Parser)]
#[command(name = "ptc", version)]
struct Cli {
    /// Run a single turn with this prompt. Without it, each stdin line is a turn.
    #[arg(long)]
    prompt: Option<String>,

    /// Model to use for completions.
    #[arg(long, default_value = ptc_rs::DEFAULT_MODEL)]
    model: String,

    /// Workspace directory; created if missing.
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// JSON file of command-template tools to expose as a remote server.
    #[arg(long)]
    tools: Option<PathBuf>,

    /// Replay responses from a JSON array of strings instead of calling a model.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Maximum block executions per turn.
    #[arg(long, default_value_t = ptc_rs::agent::DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Wall-clock limit per block, in seconds.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Maximum tokens per model response.
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long)]
    temperature: Option<f32>,

    /// Emit events as JSON lines instead of the coloured display.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ptc=info")))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    std::fs::create_dir_all(&cli.workspace)?;
    let workspace = std::fs::canonicalize(&cli.workspace)?;

    let config = CliConfig {
        model: cli.model,
        workspace,
        max_iterations: cli.max_iterations,
        timeout_secs: cli.timeout_secs,
        max_tokens: cli.max_tokens,
        temperature: cli.temperature,
        ..Default::default()
    };

    let registry = Arc::new(build_registry(&config.workspace, cli.tools.as_deref()).await?);
    let written = bindings::materialize(&registry, config.skills_dir())?;
    info!(
        "{} skills, {written} binding files in {}",
        registry.len(),
        config.skills_dir().display()
    );

    let bridge = Arc::new(Bridge::new(Arc::clone(&registry)));
    let handle = spawn_bridge(Arc::clone(&bridge), BridgeConfig::default()).await?;
    let executor = Executor::new(&config.workspace, config.executor_config())
        .with_bridge(bridge)
        .with_bridge_url(handle.url())
        .with_skills_dir(config.skills_dir());

    let model: Box<dyn ChatModel> = match &cli.script {
        Some(path) => Box::new(load_script(path)?),
        None => {
            let api_key = std::env::var("OPENROUTER_KEY")
                .map_err(|_| "OPENROUTER_KEY environment variable is not set")?;
            let client = OpenRouterClient::with_headers(
                api_key,
                "https://github.com/tacryt-socryp/ptc-rs",
                "ptc",
            )?;
            Box::new(OpenRouterModel::new(client, config.model_config()))
        }
    };

    let mode = if cli.json {
        DisplayMode::JsonLines
    } else {
        DisplayMode::Pretty
    };
    let mut controller =
        TurnController::new(model.as_ref(), &executor, config.ptc_config(&registry));

    match cli.prompt {
        Some(prompt) => run_turn(&mut controller, prompt, mode).await?,
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                run_turn(&mut controller, line.to_string(), mode).await?;
            }
        }
    }
    Ok(())
}

/// Run one turn, rendering events as they arrive. Ctrl-C cancels the turn
/// (killing any running block) without ending the session.
async fn run_turn(
    controller: &mut TurnController<'_>,
    prompt: String,
    mode: DisplayMode,
) -> Result<(), BoxError> {
    let mut stdout = std::io::stdout();
    let turn = async {
        let mut events = std::pin::pin!(controller.run_turn(prompt));
        while let Some(event) = events.next().await {
            let event = event?;
            if let ptc_rs::agent::PtcEvent::TurnEnd { warnings, .. } = &event {
                for w in warnings {
                    warn!("{w}");
                }
            }
            render(&mut stdout, &event, mode)?;
        }
        Ok::<(), BoxError>(())
    };

    tokio::select! {
        result = turn => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("{}", TurnError::Cancelled);
            Ok(())
        }
    }
}

//! CLI surface for the agent-mode entry point: flag parsing, model
//! resolution, signal-driven cancellation, and the async runtime the
//! iteration loop runs on.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use clap::Parser;
use minicoder_core::ModelConfig;
use minicoder_core::Outcome;
use minicoder_core::RunParams;

#[derive(Debug, Parser)]
#[command(
    name = "minicoder",
    version,
    about = "An autonomous coding agent that drives an LLM through a shell-script iteration loop"
)]
pub struct Cli {
    /// Print context-budget accounting and the full rendered prompt each iteration.
    #[arg(long)]
    pub debug: bool,

    /// Maximum number of iterations before giving up.
    #[arg(long, default_value_t = 50)]
    pub max_iterations: u32,

    /// Logical model name from the model catalog (defaults to the catalog's first entry).
    #[arg(long)]
    pub model: Option<String>,

    /// Whitespace-separated, glob/tilde-expanded list of files to focus on from the start.
    #[arg(long)]
    pub focus: Option<String>,

    /// The task request, given as trailing words (concatenated with single spaces).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub request: Vec<String>,
}

/// Loads a `.env` file the way a long-running dev tool typically does: first
/// a per-user override, then one in the current directory, neither required.
fn load_dotenv() {
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".minicoder").join(".env"));
    }
    let _ = dotenvy::dotenv();
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

/// Entry point for agent mode (i.e. every `argv[0]` that isn't `agent-*`).
/// Builds its own multi-thread Tokio runtime, matching the ordering
/// requirement that command mode never pays for runtime/tracing setup.
pub fn run() -> std::process::ExitCode {
    load_dotenv();
    init_logging();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Error: failed to start async runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    runtime.block_on(run_async())
}

async fn run_async() -> std::process::ExitCode {
    let cli = Cli::parse();

    let model_config = match ModelConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let model = match &cli.model {
        Some(name) => model_config.get(name),
        None => model_config.default_model(),
    };
    let Some(model) = model else {
        let available: Vec<&str> = model_config.list().iter().map(|m| m.name.as_str()).collect();
        eprintln!(
            "Error: unknown model '{}' (available: {})",
            cli.model.as_deref().unwrap_or("<default>"),
            available.join(", ")
        );
        return std::process::ExitCode::FAILURE;
    };

    let focused_files: Vec<PathBuf> = cli
        .focus
        .as_deref()
        .map(minicoder_core::fsutil::expand_focus_arg)
        .unwrap_or_default();

    let cancelled = Arc::new(AtomicBool::new(false));
    install_signal_handlers(Arc::clone(&cancelled));

    let client = match reqwest::Client::builder().build() {
        Ok(client) => client,
        Err(err) => {
            eprintln!("Error: failed to build HTTP client: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let working_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("Error: failed to resolve current directory: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let params = RunParams {
        user_request: cli.request.join(" "),
        model,
        client: &client,
        max_iterations: cli.max_iterations,
        debug: cli.debug,
        working_dir,
        focused_files,
        extra_instructions: None,
    };

    let is_cancelled = move || cancelled.load(Ordering::SeqCst);

    match minicoder_core::iteration::run(params, is_cancelled).await {
        Ok(Outcome::Success(_)) => std::process::ExitCode::SUCCESS,
        Ok(Outcome::Aborted(_) | Outcome::Cancelled | Outcome::MaxIterations) => {
            std::process::ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn install_signal_handlers(cancelled: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let kind = tokio::signal::unix::SignalKind::terminate();
        let mut terminate = match tokio::signal::unix::signal(kind) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {err}");
                let _ = tokio::signal::ctrl_c().await;
                cancelled.store(true, Ordering::SeqCst);
                return;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    cancelled.store(true, Ordering::SeqCst);
                }
            }
            _ = terminate.recv() => {
                cancelled.store(true, Ordering::SeqCst);
            }
        }
    });
}

//! Library crate behind the `minicoder` binary: the sandboxed shell-script
//! agent loop, its streaming LLM client, and the re-entrant agent-command
//! dispatch that the loop's own scripts call back into.

pub mod agent_command;
pub mod error;
pub mod fsutil;
pub mod iteration;
pub mod llm_client;
pub mod model_config;
pub mod prompt;
pub mod sandbox;
pub mod script_extractor;
pub mod spinner;
pub mod state;

pub use error::MinicoderError;
pub use error::Result;
pub use iteration::Outcome;
pub use iteration::RunParams;
pub use model_config::ModelConfig;
pub use model_config::ModelDescriptor;

/// The reserved `argv[0]` basenames that select agent-command mode instead
/// of the main agent loop.
pub const AGENT_COMMAND_NAMES: [&str; 4] =
    ["agent-files", "agent-cd", "agent-done", "agent-abort"];

/// True if `basename` should be routed to agent-command mode rather than the
/// main loop. Matches on the `agent-` prefix, not the specific four known
/// names, so an unrecognized `agent-*` invocation still reaches
/// `agent_command::run` and gets a proper "unknown agent command" error
/// instead of silently falling through to the CLI parser.
pub fn is_agent_command(basename: &str) -> bool {
    basename.starts_with("agent-")
}

//! Binary entry point. Checked before anything else: if `argv[0]`'s
//! basename has the `agent-` prefix, this process is a script calling back
//! into the agent it was spawned from, not a user invoking the CLI. That
//! path never touches tracing or a Tokio runtime.

use std::path::Path;

fn main() -> std::process::ExitCode {
    let argv0 = std::env::args().next().unwrap_or_default();
    let basename = Path::new(&argv0)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    if minicoder_core::is_agent_command(basename) {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let code = minicoder_core::agent_command::run(basename, &args);
        return std::process::ExitCode::from(code as u8);
    }

    minicoder_cli::run()
}

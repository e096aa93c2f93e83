//! The re-entrant mode selected when this executable is invoked under one of
//! the reserved `agent-*` names: mutate the shared state file and exit.

use std::io::Read;
use std::path::Path;

use crate::state;

/// Runs the named agent command against `MINICODER_STATE_FILE`. Returns the
/// process exit code: 0 on success, 1 on any error.
pub fn run(cmd_name: &str, args: &[String]) -> i32 {
    let Ok(state_file) = std::env::var("MINICODER_STATE_FILE") else {
        eprintln!("Error: MINICODER_STATE_FILE is not set");
        return 1;
    };
    let state_path = Path::new(&state_file);

    let result = match cmd_name {
        "agent-files" => cmd_files(state_path, args),
        "agent-cd" => cmd_cd(state_path, args),
        "agent-done" => cmd_terminate(state_path, Terminal::Done),
        "agent-abort" => cmd_terminate(state_path, Terminal::Aborted),
        other => Err(format!("unknown agent command: {other}")),
    };

    match result {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {msg}");
            1
        }
    }
}

fn cmd_files(state_path: &Path, args: &[String]) -> Result<(), String> {
    let resolved: Vec<String> = args
        .iter()
        .map(|raw| match std::fs::canonicalize(raw) {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(_) => raw.clone(),
        })
        .collect();

    state::update_command_state(state_path, |file| {
        file.focused_files = Some(resolved.clone());
    })
    .map_err(|e| e.to_string())?;

    if resolved.is_empty() {
        println!("Cleared all focused files");
    } else {
        for path in &resolved {
            println!("Focused on: {path}");
        }
    }
    Ok(())
}

fn cmd_cd(state_path: &Path, args: &[String]) -> Result<(), String> {
    let target = args
        .first()
        .ok_or_else(|| "agent-cd requires a path argument".to_string())?;
    let resolved = std::fs::canonicalize(target)
        .map_err(|e| format!("cannot resolve '{target}': {e}"))?;

    state::update_command_state(state_path, |file| {
        file.working_dir = Some(resolved.to_string_lossy().into_owned());
    })
    .map_err(|e| e.to_string())
}

enum Terminal {
    Done,
    Aborted,
}

fn cmd_terminate(state_path: &Path, which: Terminal) -> Result<(), String> {
    let message = read_stdin_message();

    state::update_command_state(state_path, |file| match which {
        Terminal::Done => {
            file.done = Some(true);
            if let Some(msg) = &message {
                file.done_message = Some(msg.clone());
            }
        }
        Terminal::Aborted => {
            file.aborted = Some(true);
            if let Some(msg) = &message {
                file.abort_message = Some(msg.clone());
            }
        }
    })
    .map_err(|e| e.to_string())
}

/// Reads all of stdin, trims exactly one trailing `\n`, and returns `None`
/// if the result is empty (e.g. stdin was closed with no input piped in).
fn read_stdin_message() -> Option<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).ok()?;
    if buf.ends_with('\n') {
        buf.pop();
    }
    if buf.is_empty() { None } else { Some(buf) }
}

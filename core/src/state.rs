use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// The agent's view of the world across iterations. Owned exclusively by the
/// iteration controller; `Sandbox::execute` borrows it mutably for the
/// duration of a single script run.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub working_dir: PathBuf,
    pub focused_files: Vec<PathBuf>,
    /// Full text of the previous iteration's transcript (model response plus
    /// script output). Holds exactly one iteration's worth; never accumulated.
    pub prev_iteration: String,
    pub iteration: u32,
    pub done: bool,
    pub done_message: Option<String>,
    pub aborted: bool,
    pub abort_message: Option<String>,
}

impl AgentState {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            focused_files: Vec::new(),
            prev_iteration: String::new(),
            iteration: 0,
            done: false,
            done_message: None,
            aborted: false,
            abort_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done || self.aborted
    }
}

/// On-disk projection exchanged through `MINICODER_STATE_FILE`. Every field
/// is optional: readers only apply the fields that are actually present, so a
/// script that never touches `agent-files` leaves `focused_files` untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StateFile {
    pub working_dir: Option<String>,
    pub focused_files: Option<Vec<String>>,
    pub done: Option<bool>,
    pub done_message: Option<String>,
    pub aborted: Option<bool>,
    pub abort_message: Option<String>,
}

/// Writes the projection of `state` that the sandbox seeds a script with
/// (working directory and focused files only — termination fields are set by
/// the script, never by the parent).
pub fn write_initial(path: &Path, state: &AgentState) -> std::io::Result<()> {
    let file = StateFile {
        working_dir: Some(state.working_dir.to_string_lossy().into_owned()),
        focused_files: Some(
            state
                .focused_files
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        ),
        done: None,
        done_message: None,
        aborted: None,
        abort_message: None,
    };
    let json = serde_json::to_string(&file).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// Reads the state file back after a script has run and merges present
/// fields into `state`. Any read/parse failure is silently ignored: the
/// script may have crashed before writing anything, and losing its last
/// mutation is preferable to aborting the whole iteration.
pub fn read_and_merge(path: &Path, state: &mut AgentState) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let Ok(file) = serde_json::from_str::<StateFile>(&content) else {
        return;
    };

    if let Some(true) = file.done {
        state.done = true;
        if let Some(msg) = file.done_message {
            state.done_message = Some(msg);
        }
    }
    if let Some(true) = file.aborted {
        state.aborted = true;
        if let Some(msg) = file.abort_message {
            state.abort_message = Some(msg);
        }
    }
    if let Some(wd) = file.working_dir {
        state.working_dir = PathBuf::from(wd);
    }
    if let Some(files) = file.focused_files {
        state.focused_files = files.into_iter().map(PathBuf::from).collect();
    }
}

/// Reads and mutates the state file from within an `agent-*` command
/// invocation: load what's there (or start empty), apply `f`, write back.
pub fn update_command_state(
    path: &Path,
    f: impl FnOnce(&mut StateFile),
) -> std::io::Result<()> {
    let mut file = match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str::<StateFile>(&content).unwrap_or_default(),
        Err(_) => StateFile::default(),
    };
    f(&mut file);
    let json = serde_json::to_string(&file).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

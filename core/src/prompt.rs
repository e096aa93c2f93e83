//! Assembles the per-iteration prompt and applies the byte-budget truncation
//! policy used to keep it under the model's context window.

use std::path::Path;

use crate::fsutil;

const TEMPLATE_HEAD: &str = r#"You are an AI agent that is part of an outer execution loop.
Your goal is to execute one shell script per iteration in order to accomplish a user task, or answer a user question.

# HOW TO EXECUTE SCRIPTS

Output a single shell script in this format:

exec
```
# Your POSIX shell script here
```

Your script will be run automatically at the end of your turn, and the output will be returned in the next iteration.
Scripts run with -e (exit on error) and -x (debug trace) flags set.
The exec code blocks support markdown delimiters (3+ ` or ~). Adjust the delimiters if your script contains backticks.

# AGENT COMMANDS

Special commands that control the agent loop are available in your scripts PATH (use them within exec blocks):

- agent-files [FILES...] # Replace currently focused files (shown in every iteration, empty to clear)
- agent-cd PATH          # Change working directory permanently (persists across iterations)
- agent-abort            # Stop with failure (pipe message: echo "reason" | agent-abort)
- agent-done             # Complete successfully (pipe message: echo "summary" | agent-done)

# STATE MANAGEMENT

What persists between iterations:
- Working directory (via agent-cd)
- Focused files list (via agent-files)
- Your own output and the script execution from the previous iteration

What does NOT persist:
- Shell variables
- Current directory from 'cd' command
- Output from older iteration

# PROGRESS TRACKING

Maintain a structured task list with clear status markers:

- [ ] Main task
  - [✓] Completed subtask (verified in previous iteration)
  - [→] Current subtask (what this script will do)
  - [ ] Pending subtask (for future iterations)
  - [✗] Failed subtask (needs retry or different approach)

Only mark tasks [✓] complete AFTER seeing successful output, you shouldn't assume success.

# TASK COMPLETION

- You should only run the `agent-done` command when the original user request is satisfied
- Supply a message agent-done to answer the user questions or explain what was achieved
- It is easier for the user to read the agent-done message than any execution output

# ERROR HANDLING

When your exec script fails:
- Examine the -x trace output to identify the failing command
- Check exit codes and error messages
- Consider aborting with agent-abort if the task cannot proceed

# BEST PRACTICES

- State clearly what your script will attempt
- Focus files you'll need to reference in future iterations
- Mention important information for use in the next iteration
- Break complex tasks into smaller, verifiable steps
- Try to accomplish steps each iteration in logical chunks
- Verify outputs before proceeding (verify success in the next iteration)
- Track your own progress via notes (you can only see the output of the last iteration)
"#;

/// Renders the full prompt for one iteration.
pub fn render(
    user_request: &str,
    working_dir: &str,
    focused_files_rendered: &str,
    history_rendered: &str,
    extra_instructions: Option<&str>,
) -> String {
    let mut out = String::with_capacity(
        TEMPLATE_HEAD.len()
            + user_request.len()
            + working_dir.len()
            + focused_files_rendered.len()
            + history_rendered.len()
            + extra_instructions.map_or(0, str::len)
            + 256,
    );
    out.push_str(TEMPLATE_HEAD);

    if let Some(extra) = extra_instructions {
        out.push_str("\n# CUSTOM INSTRUCTIONS\n\n");
        out.push_str(extra);
        if !extra.ends_with('\n') {
            out.push('\n');
        }
    }

    out.push_str("\n--- CURRENT STATE ---\n\n");
    out.push_str("User query/request:\n\n");
    out.push_str(user_request);
    out.push_str("\n\nWorking directory:\n\n");
    out.push_str(working_dir);
    out.push_str("\n\nFocused files:\n\n");
    out.push_str(focused_files_rendered);
    out.push_str("\n\nLast iteration:\n\n");
    out.push_str(history_rendered);
    out
}

/// Renders the "Focused files" section: each file as a `--- path ---` banner
/// followed by its content, binary placeholder, or read-error placeholder.
pub fn render_focused_files(files: &[std::path::PathBuf]) -> String {
    if files.is_empty() {
        return "(none)".to_string();
    }
    files
        .iter()
        .map(|path| render_one_focused_file(path))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_one_focused_file(path: &Path) -> String {
    let body = match fsutil::is_binary_file(path) {
        Ok(true) => match std::fs::metadata(path) {
            Ok(meta) => format!("[Binary data ({} bytes)]", meta.len()),
            Err(err) => format!("[Error reading file: {err}]"),
        },
        Ok(false) => match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => format!("[Error reading file: {err}]"),
        },
        Err(err) => format!("[Error reading file: {err}]"),
    };
    format!("--- {} ---\n{body}", path.display())
}

const TRUNCATION_NOTICE_HEAD: &str = "\n[... content truncated, remainder omitted ...]";
const TRUNCATION_NOTICE_HISTORY: &str = "[... earlier output truncated ...]\n";

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Truncates `text` to roughly `max_bytes`, keeping the *start* and anchoring
/// the cut at the nearest preceding newline. Used for the focused-files
/// section: callers care about a file's beginning, not its tail.
pub fn truncate_keep_head(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let budget = max_bytes.saturating_sub(TRUNCATION_NOTICE_HEAD.len());
    let limit = floor_boundary(text, budget.min(text.len()));
    let cut = text[..limit].rfind('\n').unwrap_or(limit);
    format!("{}{TRUNCATION_NOTICE_HEAD}", &text[..cut])
}

/// Truncates `text` to roughly `max_bytes`, keeping the *tail*. Used for the
/// previous-iteration history: the most recent output matters most. Anchors
/// the keep-point at the first newline found within the last 1 KiB of the
/// window being discarded, so the kept text starts on a line boundary.
pub fn truncate_keep_tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let budget = max_bytes.saturating_sub(TRUNCATION_NOTICE_HISTORY.len());
    let start_window = floor_boundary(text, text.len().saturating_sub(budget));
    let search_from = floor_boundary(text, start_window.saturating_sub(1024));
    let region = &text[search_from..start_window];
    let tail_start = match region.find('\n') {
        Some(rel) => search_from + rel + 1,
        None => start_window,
    };
    format!("{TRUNCATION_NOTICE_HISTORY}{}", &text[tail_start..])
}

//! The loop that ties together prompt assembly, the model call, script
//! extraction, and sandboxed execution, one iteration at a time.

use std::io::Write;
use std::path::PathBuf;

use crate::error::Result;
use crate::llm_client;
use crate::llm_client::ChunkKind;
use crate::model_config::ModelDescriptor;
use crate::prompt;
use crate::sandbox;
use crate::script_extractor;
use crate::spinner::Spinner;
use crate::state::AgentState;

/// How the loop ended. `Err` is reserved for failures the loop cannot
/// recover from (configuration, transport, sandbox setup); everything else
/// is a defined terminal outcome.
#[derive(Debug)]
pub enum Outcome {
    Success(Option<String>),
    Aborted(Option<String>),
    Cancelled,
    MaxIterations,
}

pub struct RunParams<'a> {
    pub user_request: String,
    pub model: &'a ModelDescriptor,
    pub client: &'a reqwest::Client,
    pub max_iterations: u32,
    pub debug: bool,
    pub working_dir: PathBuf,
    pub focused_files: Vec<PathBuf>,
    pub extra_instructions: Option<String>,
}

/// One-shot newline bookkeeping for the streamed reasoning/content transcript.
/// A newline is inserted before the first reasoning chunk ever seen, and
/// before the first content chunk only if reasoning came first and didn't
/// already end on a newline. Later transitions within the same stream don't
/// re-trigger either newline, matching the original's once-per-turn header
/// flags rather than a per-transition check.
#[derive(Default)]
struct StreamHeaders {
    reasoning_header_shown: bool,
    response_header_shown: bool,
    last_char_newline: bool,
}

impl StreamHeaders {
    fn new() -> Self {
        Self {
            last_char_newline: true,
            ..Default::default()
        }
    }

    /// Returns `true` if a newline should be written before `text`, and
    /// records `text`'s trailing character for the next call. No-op on empty
    /// chunks, matching the original's `chunk_len > 0` guard.
    fn leading_newline_for(&mut self, kind: ChunkKind, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let newline = match kind {
            ChunkKind::Reasoning => {
                let emit = !self.reasoning_header_shown;
                self.reasoning_header_shown = true;
                emit
            }
            ChunkKind::Content => {
                let emit = !self.response_header_shown
                    && self.reasoning_header_shown
                    && !self.last_char_newline;
                self.response_header_shown = true;
                emit
            }
        };
        self.last_char_newline = text.ends_with('\n');
        newline
    }
}

struct Budget {
    max_context_bytes: usize,
    focused_files_budget: usize,
    history_budget: usize,
}

fn compute_budget(model: &ModelDescriptor) -> Budget {
    let max_context_bytes = ((model.max_tokens as f64) * 4.0 * 0.9 / 2.0) as usize;
    let base_prompt_len = prompt::render("", "", "(none)", "(none)", None).len();
    let margin = (max_context_bytes as f64 * 0.2) as usize;
    let available = max_context_bytes
        .saturating_sub(base_prompt_len)
        .saturating_sub(margin);
    let focused_files_budget = available * 40 / 100;
    let history_budget = available.saturating_sub(focused_files_budget);
    Budget {
        max_context_bytes,
        focused_files_budget,
        history_budget,
    }
}

pub async fn run(params: RunParams<'_>, is_cancelled: impl Fn() -> bool) -> Result<Outcome> {
    let budget = compute_budget(params.model);
    let mut state = AgentState::new(params.working_dir);
    state.focused_files = params.focused_files;

    loop {
        if is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        state.iteration += 1;

        if state.iteration > 1 {
            println!();
        }
        println!("=== Iteration {} ===", state.iteration);

        let focused_full = prompt::render_focused_files(&state.focused_files);
        let (focused_rendered, unused_focus_budget) = if focused_full.len() > budget.focused_files_budget {
            (
                prompt::truncate_keep_head(&focused_full, budget.focused_files_budget),
                0,
            )
        } else {
            (
                focused_full.clone(),
                budget.focused_files_budget - focused_full.len(),
            )
        };

        let history_budget_this_iteration = budget.history_budget + unused_focus_budget;
        let history_full = if state.prev_iteration.is_empty() {
            "(none)".to_string()
        } else {
            state.prev_iteration.clone()
        };
        let history_rendered = if history_full.len() > history_budget_this_iteration {
            prompt::truncate_keep_tail(&history_full, history_budget_this_iteration)
        } else {
            history_full
        };

        let rendered_prompt = prompt::render(
            &params.user_request,
            &state.working_dir.display().to_string(),
            &focused_rendered,
            &history_rendered,
            params.extra_instructions.as_deref(),
        );

        if params.debug {
            print_debug_block(&budget, &focused_full, &rendered_prompt);
        }

        let mut spinner = Spinner::new();
        spinner.start("Waiting for model...");

        let mut headers = StreamHeaders::new();
        let mut spinner_stopped = false;

        let response = llm_client::complete(
            params.client,
            params.model,
            &rendered_prompt,
            |text, kind| {
                if text.is_empty() {
                    return;
                }
                if !spinner_stopped {
                    spinner.stop();
                    spinner_stopped = true;
                }
                let mut stdout = std::io::stdout();
                if headers.leading_newline_for(kind, text) {
                    let _ = writeln!(stdout);
                }
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            },
            &is_cancelled,
        )
        .await;
        spinner.stop();

        let response_text = match response {
            Ok(text) => text,
            Err(crate::error::MinicoderError::Cancelled) => return Ok(Outcome::Cancelled),
            Err(err) => return Err(err),
        };

        if !response_text.ends_with('\n') {
            println!();
        }

        state.prev_iteration = response_text.clone();
        if !state.prev_iteration.ends_with('\n') {
            state.prev_iteration.push('\n');
        }

        if let Some(script) = script_extractor::extract_exec_script(&response_text) {
            println!("Executing agent script...");
            let output = sandbox::execute(&script, &mut state).await?;
            state.prev_iteration.push_str(&output);
        }

        if state.done {
            println!("=== Success ===");
            if let Some(msg) = &state.done_message {
                println!("{msg}");
            }
            return Ok(Outcome::Success(state.done_message));
        }
        if state.aborted {
            println!("=== Abort ===");
            if let Some(msg) = &state.abort_message {
                println!("{msg}");
            }
            return Ok(Outcome::Aborted(state.abort_message));
        }
        if state.iteration >= params.max_iterations {
            println!("=== Iteration Limit Exceeded ===");
            return Ok(Outcome::MaxIterations);
        }
    }
}

fn print_debug_block(budget: &Budget, focused_full: &str, rendered_prompt: &str) {
    println!("--- DEBUG: Context management ---");
    println!("max_context_bytes: {}", budget.max_context_bytes);
    println!("focused_files_budget: {}", budget.focused_files_budget);
    println!("focused_files_actual: {}", focused_full.len());
    println!("history_budget: {}", budget.history_budget);
    println!("--- DEBUG: Prompt sent to LLM ---");
    println!("{rendered_prompt}");
    println!("--- END DEBUG ---");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_config::ModelDescriptor;

    fn model() -> ModelDescriptor {
        ModelDescriptor {
            name: "test".to_string(),
            endpoint: "https://x/chat/completions".to_string(),
            model: Some("test-model".to_string()),
            api_key: Some("key".to_string()),
            params: serde_json::Map::new(),
            max_tokens: 128_000,
        }
    }

    #[test]
    fn stream_headers_newline_before_first_reasoning_chunk_only() {
        let mut headers = StreamHeaders::new();
        assert!(headers.leading_newline_for(ChunkKind::Reasoning, "think"));
        assert!(!headers.leading_newline_for(ChunkKind::Reasoning, " more"));
    }

    #[test]
    fn stream_headers_newline_before_first_content_after_reasoning() {
        let mut headers = StreamHeaders::new();
        headers.leading_newline_for(ChunkKind::Reasoning, "think");
        assert!(headers.leading_newline_for(ChunkKind::Content, "done"));
    }

    #[test]
    fn stream_headers_no_newline_before_content_if_reasoning_ended_in_newline() {
        let mut headers = StreamHeaders::new();
        headers.leading_newline_for(ChunkKind::Reasoning, "think\n");
        assert!(!headers.leading_newline_for(ChunkKind::Content, "done"));
    }

    #[test]
    fn stream_headers_no_newline_when_content_comes_first() {
        let mut headers = StreamHeaders::new();
        assert!(!headers.leading_newline_for(ChunkKind::Content, "done"));
    }

    /// The key divergence from a naive per-transition check: once reasoning
    /// and content have each shown their header, further reasoning->content
    /// transitions within the same stream must NOT re-insert a newline.
    #[test]
    fn stream_headers_do_not_retrigger_on_later_transitions() {
        let mut headers = StreamHeaders::new();
        assert!(headers.leading_newline_for(ChunkKind::Reasoning, "think"));
        assert!(headers.leading_newline_for(ChunkKind::Content, "partial"));
        // Model interleaves more reasoning, then more content, later in the
        // same turn. Neither header is shown again.
        assert!(!headers.leading_newline_for(ChunkKind::Reasoning, "more thinking"));
        assert!(!headers.leading_newline_for(ChunkKind::Content, "more content"));
    }

    #[test]
    fn stream_headers_ignore_empty_chunks() {
        let mut headers = StreamHeaders::new();
        assert!(!headers.leading_newline_for(ChunkKind::Reasoning, ""));
        // An empty chunk must not count as "reasoning header shown".
        assert!(headers.leading_newline_for(ChunkKind::Reasoning, "think"));
    }

    #[test]
    fn budget_splits_available_bytes_forty_sixty() {
        let budget = compute_budget(&model());
        assert!(budget.focused_files_budget > 0);
        assert!(budget.history_budget > budget.focused_files_budget);
    }

    #[tokio::test]
    async fn max_iterations_is_reached_without_termination() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "no script here"}}]
            })))
            .mount(&server)
            .await;

        let mut model = model();
        model.endpoint = format!("{}/chat/completions", server.uri());
        let client = reqwest::Client::new();

        let outcome = run(
            RunParams {
                user_request: "do nothing".to_string(),
                model: &model,
                client: &client,
                max_iterations: 2,
                debug: false,
                working_dir: std::env::temp_dir(),
                focused_files: Vec::new(),
                extra_instructions: None,
            },
            || false,
        )
        .await
        .expect("run");

        assert!(matches!(outcome, Outcome::MaxIterations));
    }

    #[tokio::test]
    async fn agent_done_script_ends_the_loop_successfully() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "exec\n```\necho finished | agent-done\n```\n"}}]
            })))
            .mount(&server)
            .await;

        let mut model = model();
        model.endpoint = format!("{}/chat/completions", server.uri());
        let client = reqwest::Client::new();

        let outcome = run(
            RunParams {
                user_request: "finish".to_string(),
                model: &model,
                client: &client,
                max_iterations: 5,
                debug: false,
                working_dir: std::env::temp_dir(),
                focused_files: Vec::new(),
                extra_instructions: None,
            },
            || false,
        )
        .await
        .expect("run");

        match outcome {
            Outcome::Success(Some(msg)) => assert_eq!(msg, "finished"),
            other => panic!("expected success with message, got {other:?}"),
        }
    }
}

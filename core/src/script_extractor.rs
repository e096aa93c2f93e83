//! Finds fenced `exec` blocks inside a model response and concatenates their
//! bodies into the shell script to run for this iteration.

/// Extracts every `exec`-fenced block from `text`, concatenated with `\n`
/// between blocks. Returns `None` if no block is found.
pub fn extract_exec_script(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.split('\n').collect();
    let n = lines.len();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < n {
        if lines[i] == "exec" && i + 1 < n {
            if let Some((fence_char, fence_count)) = leading_fence(lines[i + 1]) {
                let mut close = None;
                let mut j = i + 2;
                while j < n {
                    if closes_fence(lines[j], fence_char, fence_count) {
                        close = Some(j);
                        break;
                    }
                    j += 1;
                }
                if let Some(close_idx) = close {
                    blocks.push(lines[i + 2..close_idx].join("\n"));
                    i = close_idx + 1;
                    continue;
                }
            }
        }
        i += 1;
    }

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n"))
    }
}

/// If `line` opens with a run of >=3 identical fence characters (backtick or
/// tilde), returns that character and the run length. Anything after the run
/// (a language tag) is ignored.
fn leading_fence(line: &str) -> Option<(char, usize)> {
    let first = line.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let count = leading_run(line, first);
    (count >= 3).then_some((first, count))
}

/// True if `line` begins with at least `count` copies of `ch` — a valid
/// closing fence for an opening fence of that character and width.
fn closes_fence(line: &str, ch: char, count: usize) -> bool {
    leading_run(line, ch) >= count
}

fn leading_run(line: &str, ch: char) -> usize {
    line.chars().take_while(|&c| c == ch).count()
}

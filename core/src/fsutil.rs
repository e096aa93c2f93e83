//! Small file-system helpers shared by the prompt renderer, the sandbox, and
//! the `--focus` CLI argument parser.

use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

const SNIFF_LEN: usize = 8 * 1024;

/// Heuristic binary-file detection: a null byte anywhere in the first 8 KiB
/// is conclusive; otherwise the file is treated as binary if more than 10%
/// of the sampled bytes are control characters outside tab/newline/CR.
pub fn is_binary_file(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; SNIFF_LEN];
    let mut total = 0usize;
    loop {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    let sample = &buf[..total];

    if sample.contains(&0) {
        return Ok(true);
    }
    if sample.is_empty() {
        return Ok(false);
    }
    let control = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
        .count();
    Ok(control * 10 > sample.len())
}

/// Removes a directory tree, logging a warning instead of failing the
/// iteration if cleanup doesn't succeed — the script has already run by the
/// time this is called, so a stray temp directory is a nuisance, not a
/// correctness problem.
pub fn remove_dir_all_best_effort(path: &Path) {
    if let Err(err) = std::fs::remove_dir_all(path) {
        tracing::warn!(path = %path.display(), error = %err, "failed to clean up temporary directory");
    }
}

/// Expands a `--focus` argument: shell-word-splits it, tilde-expands and
/// glob-expands each word, and drops anything that doesn't exist on disk. A
/// word with no glob metacharacters, or one whose pattern matches nothing,
/// passes through literally (mirroring POSIX `wordexp`'s `WRDE_NOCHECK`).
pub fn expand_focus_arg(raw: &str) -> Vec<PathBuf> {
    let words = shlex::split(raw).unwrap_or_default();
    let mut out = Vec::new();

    for word in words {
        let expanded = shellexpand::tilde(&word).into_owned();
        let mut matched_any = false;
        if let Ok(paths) = glob::glob(&expanded) {
            for entry in paths.flatten() {
                matched_any = true;
                out.push(entry);
            }
        }
        if !matched_any {
            out.push(PathBuf::from(expanded));
        }
    }

    out.into_iter().filter(|p| p.exists()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_file_is_not_binary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello\nworld\n").expect("write");
        assert!(!is_binary_file(&path).expect("check"));
    }

    #[test]
    fn null_byte_marks_file_binary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bin");
        std::fs::write(&path, [0u8, 1, 2, 3]).expect("write");
        assert!(is_binary_file(&path).expect("check"));
    }

    #[test]
    fn mostly_control_bytes_marks_file_binary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bin");
        let bytes: Vec<u8> = (0u8..=20).collect();
        std::fs::write(&path, bytes).expect("write");
        assert!(is_binary_file(&path).expect("check"));
    }

    #[test]
    fn expand_focus_arg_drops_nonexistent_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let existing = dir.path().join("present.txt");
        std::fs::write(&existing, "x").expect("write");
        let raw = format!("{} /nonexistent/path/nowhere", existing.display());
        let expanded = expand_focus_arg(&raw);
        assert_eq!(expanded, vec![existing]);
    }

    #[test]
    fn expand_focus_arg_splits_quoted_words() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("has space.txt");
        std::fs::write(&path, "x").expect("write");
        let raw = format!("\"{}\"", path.display());
        let expanded = expand_focus_arg(&raw);
        assert_eq!(expanded, vec![path]);
    }
}

//! A terminal spinner shown while waiting on the model. Idempotent
//! start/stop, writes only to stderr, and only when stderr is a TTY.

use std::io::IsTerminal;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Starts the spinner with `message`. No-op if already running or if
    /// stderr is not a TTY.
    pub fn start(&mut self, message: impl Into<String>) {
        if self.handle.is_some() || !std::io::stderr().is_terminal() {
            return;
        }
        let message = message.into();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let handle = std::thread::spawn(move || {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "\x1b[?25l");
            let mut frame = 0usize;
            while running.load(Ordering::SeqCst) {
                let _ = write!(stderr, "\r{} {message}", FRAMES[frame % FRAMES.len()]);
                let _ = stderr.flush();
                frame += 1;
                std::thread::sleep(FRAME_INTERVAL);
            }
            let _ = write!(stderr, "\r\x1b[2K\x1b[?25h");
            let _ = stderr.flush();
        });
        self.handle = Some(handle);
    }

    /// Stops the spinner. No-op if not running.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        let _ = handle.join();
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_stop_is_a_no_op() {
        let mut spinner = Spinner::new();
        spinner.stop();
        spinner.stop();
    }

    #[test]
    fn double_start_does_not_spawn_a_second_thread() {
        let mut spinner = Spinner::new();
        spinner.start("working");
        let first = spinner.handle.is_some();
        spinner.start("working again");
        spinner.stop();
        assert!(!first || spinner.handle.is_none());
    }
}

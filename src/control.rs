//! Stop control for the capture loop.
//!
//! Ctrl-C and the interactive stop command both set the same flag; the loop
//! checks it once per iteration and shuts down gracefully.

use anyhow::{anyhow, Result};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub const DEFAULT_STOP_COMMAND: &str = "q";

#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Route Ctrl-C to `stop`. May only be installed once per process.
pub fn install_interrupt_handler(stop: &StopSignal) -> Result<()> {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping");
        stop.request_stop();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))
}

pub fn is_stop_command(line: &str, command: &str) -> bool {
    line.trim().eq_ignore_ascii_case(command.trim())
}

/// Watch `input` line by line and request a stop on the stop command.
///
/// Returns when the command is seen or the input ends. End of input does not
/// stop the loop.
pub fn watch_stop_commands<R: BufRead>(input: R, command: &str, stop: &StopSignal) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        if is_stop_command(&line, command) {
            log::info!("stop command received");
            stop.request_stop();
            return;
        }
    }
    log::debug!("stop command input closed");
}

/// Background thread reading stop commands from stdin.
pub fn spawn_stop_command_listener(stop: StopSignal, command: String) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("stop-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            watch_stop_commands(stdin.lock(), &command, &stop);
        })
        .map_err(|e| anyhow!("failed to spawn stop command listener: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!other.is_stop_requested());
        stop.request_stop();
        assert!(other.is_stop_requested());
    }

    #[test]
    fn recognises_stop_command() {
        assert!(is_stop_command("q\n", "q"));
        assert!(is_stop_command("  Q ", "q"));
        assert!(!is_stop_command("quit", "q"));
    }

    #[test]
    fn watcher_stops_on_command() {
        let stop = StopSignal::new();
        watch_stop_commands(Cursor::new("status\nq\nignored\n"), "q", &stop);
        assert!(stop.is_stop_requested());
    }

    #[test]
    fn end_of_input_does_not_stop() {
        let stop = StopSignal::new();
        watch_stop_commands(Cursor::new("hello\n"), "q", &stop);
        assert!(!stop.is_stop_requested());
    }
}

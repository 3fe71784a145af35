//! Console output for the chat: `[sender] message`, colored by severity.

use colored::Colorize;

// -----------------------------------------------------------------------------
//   - Severity -
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Normal,
    Success,
    Warn,
    Error,
}

/// Format one console line. Returns `None` for an empty message, which is
/// never printed.
pub fn format_line(message: &str, sender: &str, severity: Severity) -> Option<String> {
    if message.is_empty() {
        return None;
    }

    let line = format!("[{sender}] {message}");
    let line = match severity {
        Severity::Normal => line,
        Severity::Success => line.green().to_string(),
        Severity::Warn => line.yellow().to_string(),
        Severity::Error => line.red().to_string(),
    };
    Some(line)
}

/// Print one line to stdout.
pub fn log(message: &str, sender: &str, severity: Severity) {
    if let Some(line) = format_line(message, sender, severity) {
        println!("{line}");
    }
}

// -----------------------------------------------------------------------------
//   - Sinks -
//   The session writes everything it shows the user through a sink,
//   so the console can be swapped out (tests record lines instead)
// -----------------------------------------------------------------------------
pub trait LineSink: Send + Sync {
    fn log(&self, message: &str, sender: &str, severity: Severity);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Console;

impl LineSink for Console {
    fn log(&self, message: &str, sender: &str, severity: Severity) {
        log(message, sender, severity);
    }
}

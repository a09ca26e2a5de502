//! Output log of the terminal panel.
//!
//! Lines are append-only. The only other mutation is a reset back to the
//! welcome banner.

use crate::panel::PanelEvent;

/// Kind tag of a log line; decides how the line is styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Info,
    Warning,
    Error,
    Output,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub kind: LogKind,
    pub text: String,
}

impl LogLine {
    pub fn new(kind: LogKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(LogKind::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(LogKind::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(LogKind::Error, text)
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self::new(LogKind::Output, text)
    }

    /// A submitted command, rendered after the prompt that was active.
    pub fn command(prompt: &str, command: &str) -> Self {
        Self::new(LogKind::Command, format!("{} {}", prompt, command))
    }
}

pub const WELCOME_BANNER: &str = "fleetdesk\nType 'help' for available commands\nSelect a target to begin...";

#[derive(Debug, Clone)]
pub struct Transcript {
    lines: Vec<LogLine>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self { lines: vec![LogLine::info(WELCOME_BANNER)] }
    }

    /// Apply the log-related part of a panel event; everything else is ignored.
    pub fn apply(&mut self, event: &PanelEvent) {
        match event {
            PanelEvent::Log(line) => self.lines.push(line.clone()),
            PanelEvent::ResetLog => self.reset(),
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        self.lines.clear();
        self.lines.push(LogLine::info(WELCOME_BANNER));
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.last()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_banner() {
        let t = Transcript::new();
        assert_eq!(t.len(), 1);
        assert_eq!(t.lines()[0].kind, LogKind::Info);
        assert!(t.lines()[0].text.contains("help"));
    }

    #[test]
    fn test_apply_and_reset() {
        let mut t = Transcript::new();
        t.apply(&PanelEvent::Log(LogLine::output("hello")));
        t.apply(&PanelEvent::SetInput(String::new()));
        assert_eq!(t.len(), 2);
        assert_eq!(t.last(), Some(&LogLine::output("hello")));

        t.apply(&PanelEvent::ResetLog);
        assert_eq!(t.len(), 1);
        assert_eq!(t.lines()[0].text, WELCOME_BANNER);
    }

    #[test]
    fn test_command_line_text() {
        let line = LogLine::command("HOST-A>alice$", "whoami");
        assert_eq!(line.kind, LogKind::Command);
        assert_eq!(line.text, "HOST-A>alice$ whoami");
    }
}

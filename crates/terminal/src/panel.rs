//! Terminal panel controller.
//!
//! A pure state machine: every operation mutates the panel and returns the
//! [`PanelEvent`]s a renderer and an executor must apply. Nothing here
//! performs I/O or reads the clock.
//!
//! Connection states: Disconnected -> (select) -> Connected ->
//! (disconnect | `exit` | unauthorized) -> Disconnected. Command outcomes
//! never change the connection state, except an unauthorized response.
//!
//! Remote commands run in two phases: submit, then a delayed poll for the
//! latest result. Each dispatch takes a fresh [`Ticket`]; completions for
//! any other ticket are stale and dropped, and a pending poll is cancelled
//! whenever a newer dispatch, a target change, a disconnect or a reset
//! supersedes it.

use std::time::Duration;

use fleetdesk_protocol::CommandResult;

use crate::history::{Direction, History, HistoryStep};
use crate::remote::{Completion, Outcome, RemoteError, Ticket};
use crate::transcript::LogLine;

/// Prompt shown while no target is connected.
pub const DISCONNECTED_PROMPT: &str = "fleet>";

/// Delay between a successful submission and the result poll.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_millis(2000);

const HELP_LINES: &[&str] = &[
    "Available commands:",
    "  help          - Show this help message",
    "  clear         - Clear terminal screen",
    "  exit          - Disconnect from current target",
    "  result        - Fetch the latest result from the target",
    "  [any command] - Execute on the connected target",
];

const NO_TARGET: &str = "Error: No target connected. Select a target first.";
const SESSION_EXPIRED: &str = "Session expired. Log in again.";

/// The remote agent the panel is addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub token: String,
    pub hostname: String,
    pub username: String,
}

impl Target {
    pub fn new(token: impl Into<String>, hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            hostname: hostname.into(),
            username: username.into(),
        }
    }

    /// `username@hostname`
    pub fn label(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }

    /// `hostname>username$`
    pub fn prompt(&self) -> String {
        format!("{}>{}$", self.hostname, self.username)
    }
}

/// Connection display: status text, target label and prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub connected: bool,
    pub target_label: Option<String>,
    pub prompt: String,
}

impl StatusView {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            target_label: None,
            prompt: DISCONNECTED_PROMPT.to_string(),
        }
    }

    fn connected(target: &Target) -> Self {
        Self {
            connected: true,
            target_label: Some(target.label()),
            prompt: target.prompt(),
        }
    }

    pub fn status_text(&self) -> &'static str {
        if self.connected {
            "CONNECTED"
        } else {
            "DISCONNECTED"
        }
    }
}

/// Work the executor must start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Submit { ticket: Ticket, token: String, command: String },
    /// Fetch the latest result right away
    Fetch { ticket: Ticket, token: String },
    /// Fetch the latest result once `delay` has elapsed
    SchedulePoll { ticket: Ticket, token: String, delay: Duration },
}

/// Everything the panel asks its surroundings to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    Log(LogLine),
    ResetLog,
    Status(StatusView),
    SetInput(String),
    EnableInput(bool),
    Request(Request),
    CancelPoll,
    SessionExpired,
}

pub struct TerminalPanel {
    target: Option<Target>,
    history: History,
    poll_delay: Duration,
    next_ticket: u64,
    /// Ticket whose completions are still wanted.
    live: Option<Ticket>,
}

impl Default for TerminalPanel {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_DELAY)
    }
}

impl TerminalPanel {
    pub fn new(poll_delay: Duration) -> Self {
        Self {
            target: None,
            history: History::new(),
            poll_delay,
            next_ticket: 1,
            live: None,
        }
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn poll_delay(&self) -> Duration {
        self.poll_delay
    }

    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }

    /// Ticket of the remote request still awaited, if any.
    pub fn pending(&self) -> Option<Ticket> {
        self.live
    }

    /// Current prompt text.
    pub fn prompt(&self) -> String {
        match &self.target {
            Some(t) => t.prompt(),
            None => DISCONNECTED_PROMPT.to_string(),
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    pub fn select_target(&mut self, target: Target) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        self.supersede(&mut events);

        events.push(PanelEvent::Status(StatusView::connected(&target)));
        events.push(PanelEvent::EnableInput(true));
        events.push(PanelEvent::Log(LogLine::info(format!("Connected to {}", target.label()))));
        events.push(PanelEvent::Log(LogLine::info("Type 'help' for available commands")));

        log::info!("terminal connected to {}", target.label());
        self.target = Some(target);
        events
    }

    pub fn disconnect_target(&mut self) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        if let Some(previous) = self.target.take() {
            self.supersede(&mut events);
            events.push(PanelEvent::Log(LogLine::warning(format!(
                "Disconnected from {}",
                previous.label()
            ))));
            log::info!("terminal disconnected from {}", previous.label());
        }

        events.push(PanelEvent::Status(StatusView::disconnected()));
        events.push(PanelEvent::EnableInput(false));
        events.push(PanelEvent::SetInput(String::new()));
        events
    }

    pub fn submit_command(&mut self, raw: &str) -> Vec<PanelEvent> {
        let command = raw.trim();
        if command.is_empty() {
            return Vec::new();
        }

        let mut events = vec![PanelEvent::Log(LogLine::command(&self.prompt(), command))];
        self.history.push(command);
        events.push(PanelEvent::SetInput(String::new()));

        match command.to_ascii_lowercase().as_str() {
            "help" => {
                events.extend(HELP_LINES.iter().map(|l| PanelEvent::Log(LogLine::info(*l))));
            }
            "clear" => events.push(PanelEvent::ResetLog),
            "exit" => events.extend(self.disconnect_target()),
            "result" => events.extend(self.fetch_result()),
            _ => match self.target.clone() {
                None => events.push(PanelEvent::Log(LogLine::error(NO_TARGET))),
                Some(target) => {
                    self.supersede(&mut events);
                    let ticket = self.issue_ticket();
                    log::debug!("dispatching {} to {}", ticket, target.label());
                    events.push(PanelEvent::Request(Request::Submit {
                        ticket,
                        token: target.token,
                        command: command.to_string(),
                    }));
                }
            },
        }
        events
    }

    /// Fetch the latest result for the connected target now.
    pub fn fetch_result(&mut self) -> Vec<PanelEvent> {
        let Some(target) = self.target.clone() else {
            return vec![PanelEvent::Log(LogLine::error(NO_TARGET))];
        };

        let mut events = Vec::new();
        self.supersede(&mut events);
        let ticket = self.issue_ticket();
        events.push(PanelEvent::Request(Request::Fetch { ticket, token: target.token }));
        events
    }

    pub fn navigate_history(&mut self, direction: Direction) -> Vec<PanelEvent> {
        match self.history.navigate(direction) {
            HistoryStep::Load(text) => vec![PanelEvent::SetInput(text)],
            HistoryStep::Clear => vec![PanelEvent::SetInput(String::new())],
            HistoryStep::Stay => Vec::new(),
        }
    }

    /// Back to the freshly constructed state.
    pub fn reset(&mut self) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        self.supersede(&mut events);
        self.target = None;
        self.history.clear();

        events.push(PanelEvent::ResetLog);
        events.push(PanelEvent::Status(StatusView::disconnected()));
        events.push(PanelEvent::EnableInput(false));
        events.push(PanelEvent::SetInput(String::new()));
        events
    }

    /// Feed back the result of a request issued earlier.
    pub fn on_completion(&mut self, completion: Completion) -> Vec<PanelEvent> {
        if self.live != Some(completion.ticket) {
            log::debug!("dropping stale completion {}", completion.ticket);
            return Vec::new();
        }

        match completion.outcome {
            Outcome::Submitted(Ok(())) => match &self.target {
                Some(target) => vec![PanelEvent::Request(Request::SchedulePoll {
                    ticket: completion.ticket,
                    token: target.token.clone(),
                    delay: self.poll_delay,
                })],
                None => {
                    self.live = None;
                    Vec::new()
                }
            },
            Outcome::Submitted(Err(RemoteError::Unauthorized))
            | Outcome::Fetched(Err(RemoteError::Unauthorized)) => self.expire(),
            Outcome::Submitted(Err(err)) => {
                self.live = None;
                let text = match err {
                    RemoteError::Rejected { detail, .. } => format!(
                        "Failed to execute command: {}",
                        detail.as_deref().unwrap_or("Unknown error")
                    ),
                    other => format!("Error: {}", other),
                };
                vec![PanelEvent::Log(LogLine::error(text))]
            }
            Outcome::Fetched(Ok(result)) => {
                self.live = None;
                vec![PanelEvent::Log(render_result(&result))]
            }
            Outcome::Fetched(Err(err)) => {
                self.live = None;
                let text = match err {
                    RemoteError::Rejected { detail: Some(detail), .. } => {
                        format!("Failed to retrieve command output: {}", detail)
                    }
                    RemoteError::Rejected { detail: None, .. } => "Failed to retrieve command output".to_string(),
                    other => format!("Error retrieving output: {}", other),
                };
                vec![PanelEvent::Log(LogLine::error(text))]
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn issue_ticket(&mut self) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.live = Some(ticket);
        ticket
    }

    /// Forget the awaited request and cancel its poll.
    fn supersede(&mut self, events: &mut Vec<PanelEvent>) {
        if let Some(ticket) = self.live.take() {
            log::debug!("superseding {}", ticket);
            events.push(PanelEvent::CancelPoll);
        }
    }

    fn expire(&mut self) -> Vec<PanelEvent> {
        log::warn!("backend rejected the session token");
        self.live = None;
        let mut events = vec![PanelEvent::Log(LogLine::error(SESSION_EXPIRED))];
        events.extend(self.disconnect_target());
        events.push(PanelEvent::SessionExpired);
        events
    }
}

fn render_result(result: &CommandResult) -> LogLine {
    match result.output() {
        Some(output) => LogLine::output(output),
        None => LogLine::info("Command executed successfully (no output)"),
    }
}

//! Rendering adapter around [`TerminalPanel`].
//!
//! `ConsoleSession` applies panel events to the widget state a front end
//! draws (transcript, status, input line), forwards remote requests to an
//! [`Executor`] and fires the delayed poll. Front ends call [`ConsoleSession::tick`]
//! from their event loop.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::history::Direction;
use crate::panel::{PanelEvent, Request, StatusView, Target, TerminalPanel};
use crate::remote::{Completion, Executor, InlineExecutor, Job, RemoteShell, ThreadExecutor};
use crate::scheduler::PollScheduler;
use crate::transcript::Transcript;

pub struct ConsoleSession {
    panel: TerminalPanel,
    transcript: Transcript,
    scheduler: PollScheduler,
    executor: Box<dyn Executor>,
    completions: Receiver<Completion>,
    status: StatusView,
    input: String,
    input_enabled: bool,
    expired: bool,
}

impl ConsoleSession {
    pub fn new(panel: TerminalPanel, executor: Box<dyn Executor>, completions: Receiver<Completion>) -> Self {
        Self {
            panel,
            transcript: Transcript::new(),
            scheduler: PollScheduler::new(),
            executor,
            completions,
            status: StatusView::disconnected(),
            input: String::new(),
            input_enabled: false,
            expired: false,
        }
    }

    /// Session whose remote calls run synchronously on the caller's thread.
    pub fn inline<S: RemoteShell + 'static>(shell: S, poll_delay: Duration) -> Self {
        let (executor, completions) = InlineExecutor::new(shell);
        Self::new(TerminalPanel::new(poll_delay), Box::new(executor), completions)
    }

    /// Session whose remote calls run on a background worker.
    pub fn threaded(shell: Arc<dyn RemoteShell>, poll_delay: Duration) -> Self {
        let (executor, completions) = ThreadExecutor::spawn(shell);
        Self::new(TerminalPanel::new(poll_delay), Box::new(executor), completions)
    }

    // ── Operations ──────────────────────────────────────────────────

    pub fn select_target(&mut self, target: Target, now: Instant) {
        let events = self.panel.select_target(target);
        self.apply(events, now);
    }

    pub fn disconnect(&mut self, now: Instant) {
        let events = self.panel.disconnect_target();
        self.apply(events, now);
    }

    /// Submit `raw` as if typed, regardless of whether input is enabled.
    pub fn submit(&mut self, raw: &str, now: Instant) {
        let events = self.panel.submit_command(raw);
        self.apply(events, now);
    }

    /// Submit the current input line. Ignored while input is disabled.
    pub fn submit_input(&mut self, now: Instant) {
        if !self.input_enabled {
            return;
        }
        let raw = std::mem::take(&mut self.input);
        self.submit(&raw, now);
    }

    pub fn navigate_history(&mut self, direction: Direction, now: Instant) {
        if !self.input_enabled {
            return;
        }
        let events = self.panel.navigate_history(direction);
        self.apply(events, now);
    }

    pub fn fetch_result(&mut self, now: Instant) {
        let events = self.panel.fetch_result();
        self.apply(events, now);
    }

    pub fn reset(&mut self, now: Instant) {
        let events = self.panel.reset();
        self.apply(events, now);
        self.expired = false;
    }

    /// Drain finished remote calls and fire a due poll. Returns true if
    /// anything visible may have changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        loop {
            let mut progressed = false;

            while let Ok(completion) = self.completions.try_recv() {
                let events = self.panel.on_completion(completion);
                self.apply(events, now);
                progressed = true;
            }

            if let Some(poll) = self.scheduler.take_due(now) {
                log::debug!("polling result for {}", poll.ticket);
                self.executor.dispatch(Job::Fetch { ticket: poll.ticket, token: poll.token });
                progressed = true;
            }

            if !progressed {
                break;
            }
            changed = true;
        }
        changed
    }

    // ── Input line ──────────────────────────────────────────────────

    pub fn insert_char(&mut self, c: char) {
        if self.input_enabled {
            self.input.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.input_enabled {
            self.input.pop();
        }
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn panel(&self) -> &TerminalPanel {
        &self.panel
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> &StatusView {
        &self.status
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Set once the backend rejected the session token.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// When the pending poll fires, if one is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    fn apply(&mut self, events: Vec<PanelEvent>, now: Instant) {
        for event in events {
            self.transcript.apply(&event);
            match event {
                PanelEvent::Log(_) | PanelEvent::ResetLog => {}
                PanelEvent::Status(status) => self.status = status,
                PanelEvent::SetInput(text) => self.input = text,
                PanelEvent::EnableInput(enabled) => self.input_enabled = enabled,
                PanelEvent::Request(Request::Submit { ticket, token, command }) => {
                    self.executor.dispatch(Job::Submit { ticket, token, command });
                }
                PanelEvent::Request(Request::Fetch { ticket, token }) => {
                    self.executor.dispatch(Job::Fetch { ticket, token });
                }
                PanelEvent::Request(Request::SchedulePoll { ticket, token, delay }) => {
                    self.scheduler.schedule(ticket, token, delay, now);
                }
                PanelEvent::CancelPoll => {
                    self.scheduler.cancel();
                }
                PanelEvent::SessionExpired => self.expired = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use fleetdesk_protocol::CommandResult;

    struct Silent;

    impl RemoteShell for Silent {
        fn submit_command(&self, _token: &str, _command: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        fn latest_result(&self, _token: &str) -> Result<CommandResult, RemoteError> {
            Ok(CommandResult::default())
        }
    }

    #[test]
    fn test_input_follows_connection() {
        let now = Instant::now();
        let mut s = ConsoleSession::inline(Silent, Duration::from_millis(10));
        s.insert_char('x');
        assert_eq!(s.input(), "");
        assert!(!s.input_enabled());

        s.select_target(Target::new("t", "h", "u"), now);
        assert!(s.input_enabled());
        assert_eq!(s.status().prompt, "h>u$");
        s.insert_char('l');
        s.insert_char('s');
        s.insert_char('x');
        s.backspace();
        assert_eq!(s.input(), "ls");

        s.disconnect(now);
        assert!(!s.input_enabled());
        assert_eq!(s.input(), "");
        assert_eq!(s.status().status_text(), "DISCONNECTED");
    }

    #[test]
    fn test_submit_input_clears_line() {
        let now = Instant::now();
        let mut s = ConsoleSession::inline(Silent, Duration::from_millis(10));
        s.select_target(Target::new("t", "h", "u"), now);
        for c in "help".chars() {
            s.insert_char(c);
        }
        s.submit_input(now);
        assert_eq!(s.input(), "");
        assert_eq!(s.panel().history().entries(), ["help"]);
    }

    #[test]
    fn test_tick_without_work_reports_no_change() {
        let mut s = ConsoleSession::inline(Silent, Duration::from_millis(10));
        assert!(!s.tick(Instant::now()));
        assert_eq!(s.next_deadline(), None);
    }
}

//! End-to-end console scenarios against a scripted remote shell.
//!
//! Time is driven explicitly, so the delayed poll is exercised without
//! sleeping.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fleetdesk_protocol::CommandResult;
use fleetdesk_terminal::{
    ConsoleSession, Direction, LogKind, LogLine, RemoteError, RemoteShell, Target, WELCOME_BANNER,
};

const DELAY: Duration = Duration::from_millis(2000);

#[derive(Default)]
struct ScriptedShell {
    calls: Mutex<Vec<String>>,
    submits: Mutex<VecDeque<Result<(), RemoteError>>>,
    results: Mutex<VecDeque<Result<CommandResult, RemoteError>>>,
}

impl ScriptedShell {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn on_submit(&self, r: Result<(), RemoteError>) -> &Self {
        self.submits.lock().unwrap().push_back(r);
        self
    }

    fn on_result(&self, r: Result<CommandResult, RemoteError>) -> &Self {
        self.results.lock().unwrap().push_back(r);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RemoteShell for ScriptedShell {
    fn submit_command(&self, token: &str, command: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(format!("POST {} {}", token, command));
        self.submits.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    fn latest_result(&self, token: &str) -> Result<CommandResult, RemoteError> {
        self.calls.lock().unwrap().push(format!("GET {}", token));
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandResult::default()))
    }
}

fn output(text: &str) -> CommandResult {
    CommandResult { command_output: Some(text.to_string()), ..CommandResult::default() }
}

fn session(shell: &Arc<ScriptedShell>) -> ConsoleSession {
    ConsoleSession::inline(shell.clone(), DELAY)
}

fn lines_of_kind(s: &ConsoleSession, kind: LogKind) -> Vec<String> {
    s.transcript()
        .lines()
        .iter()
        .filter(|l| l.kind == kind)
        .map(|l| l.text.clone())
        .collect()
}

#[test]
fn test_whoami_round_trip() {
    let shell = ScriptedShell::new();
    shell.on_result(Ok(output("alice")));
    let mut s = session(&shell);
    let t0 = Instant::now();

    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);
    s.submit("whoami", t0);
    s.tick(t0);
    assert_eq!(shell.calls(), ["POST tok1 whoami"]);

    // Not yet due
    s.tick(t0 + Duration::from_millis(1500));
    assert_eq!(shell.calls().len(), 1);

    s.tick(t0 + DELAY);
    assert_eq!(shell.calls(), ["POST tok1 whoami", "GET tok1"]);

    let lines = s.transcript().lines();
    let n = lines.len();
    assert_eq!(lines[n - 2], LogLine::new(LogKind::Command, "HOST-A>alice$ whoami"));
    assert_eq!(lines[n - 1], LogLine::output("alice"));
    assert!(s.next_deadline().is_none());
}

#[test]
fn test_help_without_target_makes_no_calls() {
    let shell = ScriptedShell::new();
    let mut s = session(&shell);
    let t0 = Instant::now();

    s.submit("help", t0);
    s.tick(t0 + Duration::from_secs(10));

    assert!(shell.calls().is_empty());
    let info = lines_of_kind(&s, LogKind::Info);
    assert!(info.iter().any(|l| l == "Available commands:"));
    assert!(info.iter().any(|l| l.contains("[any command]")));
    assert_eq!(lines_of_kind(&s, LogKind::Command), ["fleet> help"]);
}

#[test]
fn test_dir_without_target_is_one_error() {
    let shell = ScriptedShell::new();
    let mut s = session(&shell);
    let t0 = Instant::now();

    s.submit("dir", t0);
    s.tick(t0 + Duration::from_secs(10));

    assert!(shell.calls().is_empty());
    assert_eq!(lines_of_kind(&s, LogKind::Error), ["Error: No target connected. Select a target first."]);
}

#[test]
fn test_double_disconnect_adds_nothing() {
    let shell = ScriptedShell::new();
    let mut s = session(&shell);
    let t0 = Instant::now();

    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);
    s.disconnect(t0);
    let after_first = s.transcript().len();
    s.disconnect(t0);

    assert_eq!(s.transcript().len(), after_first);
    assert_eq!(lines_of_kind(&s, LogKind::Warning), ["Disconnected from alice@HOST-A"]);
}

#[test]
fn test_history_after_submissions() {
    let shell = ScriptedShell::new();
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);

    for cmd in ["hostname", "help", "   ", "ipconfig", ""] {
        s.submit(cmd, t0);
    }
    assert_eq!(s.panel().history().entries(), ["ipconfig", "help", "hostname"]);

    // Older visits 0..N-1 and then stays
    s.navigate_history(Direction::Older, t0);
    assert_eq!(s.input(), "ipconfig");
    s.navigate_history(Direction::Older, t0);
    s.navigate_history(Direction::Older, t0);
    assert_eq!(s.input(), "hostname");
    s.navigate_history(Direction::Older, t0);
    assert_eq!(s.input(), "hostname");
    assert_eq!(s.panel().history().cursor(), Some(2));

    // Newer returns to an empty prompt
    for _ in 0..3 {
        s.navigate_history(Direction::Newer, t0);
    }
    assert_eq!(s.input(), "");
    assert_eq!(s.panel().history().cursor(), None);
    s.navigate_history(Direction::Newer, t0);
    assert_eq!(s.input(), "");
}

#[test]
fn test_new_command_supersedes_pending_poll() {
    let shell = ScriptedShell::new();
    shell.on_result(Ok(output("second")));
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);

    s.submit("first", t0);
    s.tick(t0);
    let t1 = t0 + Duration::from_millis(1000);
    s.submit("second", t1);
    s.tick(t1);

    // The first poll would have fired at t0 + 2s; only the second one runs
    s.tick(t0 + DELAY);
    assert_eq!(shell.calls(), ["POST tok1 first", "POST tok1 second"]);
    s.tick(t1 + DELAY);
    assert_eq!(shell.calls(), ["POST tok1 first", "POST tok1 second", "GET tok1"]);
    assert_eq!(lines_of_kind(&s, LogKind::Output), ["second"]);
}

#[test]
fn test_disconnect_cancels_pending_poll() {
    let shell = ScriptedShell::new();
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);
    s.submit("whoami", t0);
    s.tick(t0);

    s.disconnect(t0);
    s.tick(t0 + DELAY * 2);
    assert_eq!(shell.calls(), ["POST tok1 whoami"]);
    assert!(lines_of_kind(&s, LogKind::Output).is_empty());
}

#[test]
fn test_submit_failure_reports_detail_and_stays_connected() {
    let shell = ScriptedShell::new();
    shell.on_submit(Err(RemoteError::Rejected { status: 404, detail: Some("Implant not found".into()) }));
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);

    s.submit("whoami", t0);
    s.tick(t0 + DELAY);

    assert_eq!(shell.calls(), ["POST tok1 whoami"]);
    assert_eq!(lines_of_kind(&s, LogKind::Error), ["Failed to execute command: Implant not found"]);
    assert!(s.panel().is_connected());
    assert!(s.input_enabled());
}

#[test]
fn test_poll_failure_is_inline() {
    let shell = ScriptedShell::new();
    shell.on_result(Err(RemoteError::Transport("operation timed out".into())));
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);

    s.submit("whoami", t0);
    s.tick(t0);
    s.tick(t0 + DELAY);

    assert_eq!(lines_of_kind(&s, LogKind::Error), ["Error retrieving output: operation timed out"]);
    assert!(s.panel().is_connected());
}

#[test]
fn test_empty_output_reports_success() {
    let shell = ScriptedShell::new();
    shell.on_result(Ok(output("")));
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);
    s.submit("mkdir tmp", t0);
    s.tick(t0);
    s.tick(t0 + DELAY);

    assert_eq!(s.transcript().last(), Some(&LogLine::info("Command executed successfully (no output)")));
}

#[test]
fn test_result_command_fetches_immediately() {
    let shell = ScriptedShell::new();
    shell.on_result(Ok(output("late output")));
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);

    s.submit("RESULT", t0);
    s.tick(t0);

    assert_eq!(shell.calls(), ["GET tok1"]);
    assert_eq!(lines_of_kind(&s, LogKind::Output), ["late output"]);
}

#[test]
fn test_unauthorized_ends_session() {
    let shell = ScriptedShell::new();
    shell.on_submit(Err(RemoteError::Unauthorized));
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);

    s.submit("whoami", t0);
    s.tick(t0);

    assert!(s.is_expired());
    assert!(!s.panel().is_connected());
    assert!(!s.input_enabled());
    assert_eq!(lines_of_kind(&s, LogKind::Error), ["Session expired. Log in again."]);
}

#[test]
fn test_clear_and_reset_leave_banner() {
    let shell = ScriptedShell::new();
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);
    s.submit("help", t0);

    s.submit("clear", t0);
    assert_eq!(s.transcript().lines(), [LogLine::info(WELCOME_BANNER)]);
    assert!(s.panel().is_connected());

    s.submit("whoami", t0);
    s.reset(t0);
    s.tick(t0 + DELAY);
    assert_eq!(s.transcript().lines(), [LogLine::info(WELCOME_BANNER)]);
    assert!(s.panel().history().is_empty());
    assert!(!s.panel().is_connected());
    assert_eq!(shell.calls(), ["POST tok1 whoami"]);
}

#[test]
fn test_threaded_session_delivers_output() {
    let shell = ScriptedShell::new();
    shell.on_result(Ok(output("alice")));
    let mut s = ConsoleSession::threaded(shell.clone(), Duration::ZERO);
    s.select_target(Target::new("tok1", "HOST-A", "alice"), Instant::now());
    s.submit("whoami", Instant::now());

    let deadline = Instant::now() + Duration::from_secs(5);
    while lines_of_kind(&s, LogKind::Output).is_empty() && Instant::now() < deadline {
        s.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(lines_of_kind(&s, LogKind::Output), ["alice"]);
}

#[test]
fn test_unauthorized_poll_ends_session() {
    let shell = ScriptedShell::new();
    shell.on_result(Err(RemoteError::Unauthorized));
    let mut s = session(&shell);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);

    s.submit("whoami", t0);
    s.tick(t0);
    assert!(!s.is_expired());
    assert!(s.panel().is_connected());

    s.tick(t0 + DELAY);
    assert_eq!(shell.calls(), ["POST tok1 whoami", "GET tok1"]);
    assert!(s.is_expired());
    assert!(!s.panel().is_connected());
    assert!(!s.input_enabled());
    assert_eq!(s.status().status_text(), "DISCONNECTED");
    assert_eq!(lines_of_kind(&s, LogKind::Error), ["Session expired. Log in again."]);
    assert!(s.next_deadline().is_none());
}

struct SlowShell {
    submits: Mutex<u32>,
}

impl RemoteShell for SlowShell {
    fn submit_command(&self, _token: &str, _command: &str) -> Result<(), RemoteError> {
        *self.submits.lock().unwrap() += 1;
        std::thread::sleep(Duration::from_secs(1));
        Ok(())
    }

    fn latest_result(&self, _token: &str) -> Result<CommandResult, RemoteError> {
        Ok(CommandResult::default())
    }
}

#[test]
fn test_dropping_threaded_session_does_not_wait_for_queued_commands() {
    let shell = Arc::new(SlowShell { submits: Mutex::new(0) });
    let mut s = ConsoleSession::threaded(shell.clone(), DELAY);
    let t0 = Instant::now();
    s.select_target(Target::new("tok1", "HOST-A", "alice"), t0);
    for n in 0..5 {
        s.submit(&format!("cmd{}", n), t0);
    }

    let started = Instant::now();
    drop(s);
    assert!(started.elapsed() < Duration::from_millis(500));

    std::thread::sleep(Duration::from_millis(1500));
    assert!(*shell.submits.lock().unwrap() <= 1);
}

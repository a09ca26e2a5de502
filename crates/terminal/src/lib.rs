//! Interactive terminal panel for remote agents.
//!
//! The core is [`TerminalPanel`], a state machine that turns operator
//! input into [`PanelEvent`]s. [`ConsoleSession`] applies those events to
//! a transcript and an input line and drives remote calls through an
//! [`Executor`], so front ends only draw and forward keystrokes.

pub mod history;
pub mod panel;
pub mod remote;
pub mod scheduler;
pub mod selector;
pub mod session;
pub mod transcript;

pub use history::{Direction, History, HistoryStep};
pub use panel::{PanelEvent, Request, StatusView, Target, TerminalPanel, DEFAULT_POLL_DELAY, DISCONNECTED_PROMPT};
pub use remote::{
    run_job, Completion, Executor, InlineExecutor, Job, Outcome, RemoteError, RemoteShell, Ticket,
    ThreadExecutor,
};
pub use scheduler::{PollScheduler, ScheduledPoll};
pub use selector::{build_options, find_agent, option_value, parse_selection, SelectorError, TargetOption};
pub use session::ConsoleSession;
pub use transcript::{LogKind, LogLine, Transcript, WELCOME_BANNER};

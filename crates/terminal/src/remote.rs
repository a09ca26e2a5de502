//! Remote execution seam.
//!
//! The panel never talks to the network. It emits requests; an [`Executor`]
//! turns them into [`Job`]s against a [`RemoteShell`] and reports each
//! result as a [`Completion`] on a channel the UI thread drains.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fleetdesk_protocol::CommandResult;

/// Identifies one remote request issued by a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failure of a remote call, reduced to what the panel reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Credentials rejected; the session is over
    Unauthorized,
    /// Backend answered with a non-success status
    Rejected { status: u16, detail: Option<String> },
    /// Request never got an answer (connect, timeout, decode)
    Transport(String),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Unauthorized => write!(f, "Unauthorized"),
            RemoteError::Rejected { status, detail: Some(detail) } => write!(f, "HTTP {}: {}", status, detail),
            RemoteError::Rejected { status, detail: None } => write!(f, "HTTP {}", status),
            RemoteError::Transport(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Backend operations the terminal panel needs.
pub trait RemoteShell: Send + Sync {
    /// Queue `command` for the agent identified by `token`.
    fn submit_command(&self, token: &str, command: &str) -> Result<(), RemoteError>;

    /// Latest result the agent reported.
    fn latest_result(&self, token: &str) -> Result<CommandResult, RemoteError>;
}

impl<S: RemoteShell + ?Sized> RemoteShell for Arc<S> {
    fn submit_command(&self, token: &str, command: &str) -> Result<(), RemoteError> {
        (**self).submit_command(token, command)
    }

    fn latest_result(&self, token: &str) -> Result<CommandResult, RemoteError> {
        (**self).latest_result(token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Submit { ticket: Ticket, token: String, command: String },
    Fetch { ticket: Ticket, token: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Submitted(Result<(), RemoteError>),
    Fetched(Result<CommandResult, RemoteError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub ticket: Ticket,
    pub outcome: Outcome,
}

/// Run one job to completion on the current thread.
pub fn run_job(shell: &dyn RemoteShell, job: Job) -> Completion {
    match job {
        Job::Submit { ticket, token, command } => Completion {
            ticket,
            outcome: Outcome::Submitted(shell.submit_command(&token, &command)),
        },
        Job::Fetch { ticket, token } => Completion {
            ticket,
            outcome: Outcome::Fetched(shell.latest_result(&token)),
        },
    }
}

/// Something that accepts jobs and eventually posts their completions.
pub trait Executor {
    fn dispatch(&self, job: Job);
}

/// Runs jobs synchronously inside `dispatch`. Completions are still queued
/// on the channel, so callers observe them on their next drain exactly as
/// with the threaded executor.
pub struct InlineExecutor<S> {
    shell: S,
    completions: Sender<Completion>,
}

impl<S: RemoteShell> InlineExecutor<S> {
    pub fn new(shell: S) -> (Self, Receiver<Completion>) {
        let (tx, rx) = mpsc::channel();
        (Self { shell, completions: tx }, rx)
    }
}

impl<S: RemoteShell> Executor for InlineExecutor<S> {
    fn dispatch(&self, job: Job) {
        let completion = run_job(&self.shell, job);
        // Receiver gone means the session was dropped; nothing to report to.
        let _ = self.completions.send(completion);
    }
}

/// Runs jobs in order on one background worker thread.
///
/// Dropping the executor stops the worker before its next job and detaches
/// it; a request already in flight finishes in the background and its
/// completion is discarded.
pub struct ThreadExecutor {
    jobs: Option<Sender<Job>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadExecutor {
    pub fn spawn(shell: Arc<dyn RemoteShell>) -> (Self, Receiver<Completion>) {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);

        let worker = thread::Builder::new()
            .name("fleetdesk-remote".into())
            .spawn(move || {
                for job in job_rx {
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }
                    let completion = run_job(shell.as_ref(), job);
                    if done_tx.send(completion).is_err() {
                        break;
                    }
                }
                log::debug!("remote worker stopped");
            })
            .map_err(|e| log::error!("failed to spawn remote worker: {}", e))
            .ok();

        (Self { jobs: Some(job_tx), stop, worker }, done_rx)
    }
}

impl Executor for ThreadExecutor {
    fn dispatch(&self, job: Job) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        if jobs.send(job).is_err() {
            log::warn!("remote worker is gone; job dropped");
        }
    }
}

impl Drop for ThreadExecutor {
    fn drop(&mut self) {
        // Queued jobs are abandoned; the worker exits once its current call returns.
        self.stop.store(true, Ordering::Release);
        self.jobs.take();
        if self.worker.take().is_some() {
            log::debug!("remote worker detached");
        }
    }
}

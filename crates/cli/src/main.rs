// fleetdesk - operator console for remote fleet agents

mod exit_codes;
mod fleet;
mod shell;
mod tui;
mod util;

use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use fleetdesk_config::Settings;

use exit_codes::{EXIT_ERROR, EXIT_NOT_AUTH, EXIT_SUCCESS, EXIT_USAGE};
use fleet::Context;

#[derive(Parser)]
#[command(name = "fleetdesk")]
#[command(about = "Operator console for remote fleet agents")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Backend base URL (overrides the saved login and settings)
    #[arg(long, global = true, env = "FLEETDESK_API_BASE")]
    api_base: Option<String>,

    /// Bearer token (overrides the saved login)
    #[arg(long, global = true, env = "FLEETDESK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with operator credentials and save the token
    #[command(after_help = "\
Examples:
  fleetdesk login --username admin
  echo \"$PASSWORD\" | fleetdesk login --username admin --password-stdin
  fleetdesk login --api-base https://fleet.example.net")]
    Login {
        /// Operator username (prompted when omitted on a TTY)
        #[arg(long, short = 'u')]
        username: Option<String>,

        /// Read the password from the first line of stdin
        #[arg(long)]
        password_stdin: bool,
    },

    /// Forget the saved token
    Logout,

    /// Show the operator the token belongs to
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List agents with their presence
    Agents {
        /// Only agents seen within the online threshold
        #[arg(long)]
        online: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Backend fleet summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one command on an agent and print its output
    #[command(after_help = "\
The agent may be given as its token, hostname, or user@host.

Examples:
  fleetdesk exec HOST-A whoami
  fleetdesk exec --wait-ms 5000 alice@HOST-A ipconfig /all")]
    Exec {
        /// Agent token, hostname, or user@host
        agent: String,

        /// Command line to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Delay before fetching the result (defaults to console.pollDelayMs)
        #[arg(long)]
        wait_ms: Option<u64>,
    },

    /// Show the latest result an agent reported
    Result {
        /// Agent token, hostname, or user@host
        agent: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove an agent from the backend
    #[command(after_help = "\
Asks for confirmation on a TTY unless --yes is given.

Examples:
  fleetdesk delete HOST-A
  fleetdesk delete --yes tok1")]
    Delete {
        /// Agent token, hostname, or user@host
        agent: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Interactive console
    Console {
        /// Connect to this agent on start
        #[arg(long)]
        target: Option<String>,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

/// Send `log` records to the log file. The console owns the screen, so
/// nothing is written to stderr.
fn init_logging(settings: &Settings) {
    let path = settings.log_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("warning: cannot create log directory {}: {}", parent.display(), e);
                return;
            }
        }
    }

    let file = match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {}", path.display(), e);
            return;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::load();
    init_logging(&settings);

    let ctx = Context { settings, api_base: cli.api_base, token: cli.token };

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: fleetdesk <command> [options]");
            eprintln!("       fleetdesk --help for more information");
            Ok(())
        }
        Some(Commands::Login { username, password_stdin }) => fleet::cmd_login(&ctx, username, password_stdin),
        Some(Commands::Logout) => fleet::cmd_logout(),
        Some(Commands::Whoami { json }) => fleet::cmd_whoami(&ctx, json),
        Some(Commands::Agents { online, json }) => fleet::cmd_agents(&ctx, online, json),
        Some(Commands::Status { json }) => fleet::cmd_status(&ctx, json),
        Some(Commands::Exec { agent, command, wait_ms }) => fleet::cmd_exec(&ctx, agent, command, wait_ms),
        Some(Commands::Result { agent, json }) => fleet::cmd_result(&ctx, agent, json),
        Some(Commands::Delete { agent, yes }) => fleet::cmd_delete(&ctx, agent, yes),
        Some(Commands::Console { target }) => cmd_console(&ctx, target),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            log::error!("{}", message);
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn cmd_console(ctx: &Context, target: Option<String>) -> Result<(), CliError> {
    let client = ctx.client()?;
    let operator = client.me().map_err(fleet::api_error)?;
    log::info!("console opened by {} against {}", operator.username, client.api_base());

    match tui::run(client, &ctx.settings, operator.username, target) {
        Ok(tui::ConsoleExit::Quit) => Ok(()),
        Ok(tui::ConsoleExit::SessionExpired) => {
            ctx.forget_expired_login();
            Err(CliError {
                code: EXIT_NOT_AUTH,
                message: "Session expired".into(),
                hint: Some("run `fleetdesk login` again".into()),
            })
        }
        Err(e) => Err(CliError { code: EXIT_ERROR, message: e, hint: None }),
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

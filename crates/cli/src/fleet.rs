//! Backend subcommands: login, logout, whoami, agents, status, delete, exec, result.

use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use fleetdesk_api_client::{
    auth_file_path, delete_auth, delete_auth_at, load_auth, save_auth, ApiError, AuthCredentials,
    ClientOptions, ConsoleClient,
};
use fleetdesk_config::Settings;
use fleetdesk_protocol::{default_online_threshold, AgentRecord, Presence};
use fleetdesk_terminal::{
    find_agent, run_job, Job, LogKind, Outcome, PanelEvent, RemoteError, Request, Target, TerminalPanel,
};

use crate::exit_codes::*;
use crate::shell::HttpShell;
use crate::util;
use crate::CliError;

/// Settings plus the global `--api-base` / `--token` overrides.
pub struct Context {
    pub settings: Settings,
    pub api_base: Option<String>,
    pub token: Option<String>,
}

impl Context {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            agent_prefix: self.settings.agent_prefix.clone(),
            timeout: self.settings.timeout(),
        }
    }

    /// Base URL: flag or environment, then saved login, then settings.
    pub fn api_base(&self, saved: Option<&AuthCredentials>) -> String {
        self.api_base
            .clone()
            .or_else(|| saved.map(|c| c.api_base.clone()))
            .unwrap_or_else(|| self.settings.api_base.clone())
    }

    /// Authenticated client from the token override or the saved login.
    pub fn client(&self) -> Result<ConsoleClient, CliError> {
        let saved = load_auth();
        let token = match (&self.token, &saved) {
            (Some(token), _) => token.clone(),
            (None, Some(creds)) => creds.token.clone(),
            (None, None) => return Err(api_error(ApiError::NotAuthenticated)),
        };
        let creds = AuthCredentials::new(token, self.api_base(saved.as_ref()));
        Ok(ConsoleClient::new(creds, self.client_options()))
    }

    /// Drop the saved login after the backend rejected the session.
    pub fn forget_expired_login(&self) {
        if let Some(path) = auth_file_path() {
            self.forget_expired_login_at(&path);
        }
    }

    /// A token passed by flag or environment is not the saved one, so the
    /// saved file is only removed when no override was given.
    fn forget_expired_login_at(&self, path: &std::path::Path) {
        if self.token.is_some() {
            log::warn!("session expired for the overriding token; saved login kept");
            return;
        }
        log::warn!("session expired, removing saved credentials");
        if let Err(e) = delete_auth_at(path) {
            log::warn!("failed to remove credentials: {}", e);
        }
    }

    fn threshold(&self) -> chrono::Duration {
        online_threshold(&self.settings)
    }
}

/// Presence threshold from `console.onlineThresholdMinutes`. Values that are
/// not a positive, representable number of minutes fall back to the default.
pub fn online_threshold(settings: &Settings) -> chrono::Duration {
    match chrono::Duration::try_minutes(settings.online_threshold_minutes) {
        Some(threshold) if threshold > chrono::Duration::zero() => threshold,
        _ => {
            log::warn!(
                "console.onlineThresholdMinutes = {} is out of range; using the default",
                settings.online_threshold_minutes
            );
            default_online_threshold()
        }
    }
}

pub fn api_error(e: ApiError) -> CliError {
    let hint = match &e {
        ApiError::NotAuthenticated => Some("run `fleetdesk login` or set FLEETDESK_TOKEN".to_string()),
        ApiError::Unauthorized(_) => Some("token expired or revoked; run `fleetdesk login` again".to_string()),
        ApiError::Network(_) => Some("check --api-base / FLEETDESK_API_BASE".to_string()),
        _ => None,
    };
    CliError { code: api_exit_code(&e), message: e.to_string(), hint }
}

// ── Login ───────────────────────────────────────────────────────────

pub fn cmd_login(ctx: &Context, username: Option<String>, password_stdin: bool) -> Result<(), CliError> {
    let interactive = atty::is(atty::Stream::Stdin);

    let username = match username {
        Some(u) => u,
        None if interactive && !password_stdin => util::prompt_line("Username: ")
            .map_err(|e| CliError { code: EXIT_ERROR, message: e, hint: None })?,
        None => {
            return Err(CliError::usage("No username provided").with_hint("pass --username"));
        }
    };
    if username.trim().is_empty() {
        return Err(CliError::usage("No username provided").with_hint("pass --username"));
    }

    let password = if password_stdin {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| CliError { code: EXIT_ERROR, message: e.to_string(), hint: None })?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else if interactive {
        util::prompt_secret("Password: ").map_err(|e| CliError { code: EXIT_ERROR, message: e, hint: None })?
    } else {
        return Err(CliError::usage("No password provided and stdin is not a TTY")
            .with_hint("pipe the password with --password-stdin"));
    };

    let api_base = ctx.api_base(load_auth().as_ref());
    let opts = ctx.client_options();

    let token = ConsoleClient::login(&api_base, username.trim(), &password, &opts).map_err(|e| match e {
        ApiError::Unauthorized(detail) => CliError {
            code: EXIT_NOT_AUTH,
            message: format!("Login failed: {}", detail.as_deref().unwrap_or("invalid credentials")),
            hint: Some("check username and password".into()),
        },
        ApiError::Network(msg) => CliError {
            code: EXIT_NETWORK,
            message: format!("Cannot reach {}: {}", api_base, msg),
            hint: None,
        },
        other => api_error(other),
    })?;

    // Verify the token works before saving it
    let creds = AuthCredentials::new(token.access_token, api_base.clone());
    let operator = ConsoleClient::new(creds.clone(), opts).me().map_err(api_error)?;

    let creds = AuthCredentials { username: Some(operator.username.clone()), ..creds };
    save_auth(&creds).map_err(|e| CliError { code: EXIT_ERROR, message: e, hint: None })?;

    log::info!("logged in as {} at {}", operator.username, api_base);
    eprintln!("Logged in as {} ({})", operator.username, api_base);
    Ok(())
}

pub fn cmd_logout() -> Result<(), CliError> {
    if load_auth().is_none() {
        eprintln!("Not logged in");
        return Ok(());
    }
    delete_auth().map_err(|e| CliError { code: EXIT_ERROR, message: e, hint: None })?;
    eprintln!("Logged out");
    Ok(())
}

pub fn cmd_whoami(ctx: &Context, json: bool) -> Result<(), CliError> {
    let client = ctx.client()?;
    let me = client.me().map_err(api_error)?;
    if json {
        let out = serde_json::json!({
            "id": me.id,
            "username": me.username,
            "api_base": client.api_base(),
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
    } else {
        println!("{} (id {}) at {}", me.username, me.id, client.api_base());
    }
    Ok(())
}

// ── Agents / status ─────────────────────────────────────────────────

pub fn cmd_agents(ctx: &Context, online_only: bool, json: bool) -> Result<(), CliError> {
    let client = ctx.client()?;
    let agents = client.list_agents().map_err(api_error)?;
    let now = Utc::now();
    let threshold = ctx.threshold();

    let rows: Vec<(&AgentRecord, Presence)> = agents
        .iter()
        .map(|a| (a, a.presence(now, threshold)))
        .filter(|(_, p)| !online_only || p.is_online())
        .collect();

    if json {
        let out: Vec<serde_json::Value> = rows
            .iter()
            .map(|(a, p)| {
                serde_json::json!({
                    "token": a.token,
                    "hostname": a.hostname,
                    "username": a.username,
                    "ip_address": a.ip_address,
                    "operating_system": a.operating_system,
                    "last_seen": a.last_seen.to_rfc3339(),
                    "presence": p,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }

    if rows.is_empty() {
        eprintln!("No agents");
        return Ok(());
    }

    println!(
        "{} {} {} {} LAST SEEN",
        util::pad_right("STATUS", 8),
        util::pad_right("USER@HOST", 28),
        util::pad_right("IP", 16),
        util::pad_right("OS", 20),
    );
    for (agent, presence) in rows {
        println!(
            "{} {} {} {} {}",
            util::pad_right(presence.tag(), 8),
            util::pad_right(&agent.label(), 28),
            util::pad_right(&agent.ip_address, 16),
            util::pad_right(&agent.operating_system, 20),
            util::format_age(agent.last_seen, now),
        );
    }
    Ok(())
}

pub fn cmd_status(ctx: &Context, json: bool) -> Result<(), CliError> {
    let client = ctx.client()?;
    let summary = client.status().map_err(api_error)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
    } else {
        println!(
            "{} agents: {} active, {} offline",
            summary.total_implants, summary.active_implants, summary.offline_implants
        );
    }
    Ok(())
}

pub fn cmd_delete(ctx: &Context, agent: String, yes: bool) -> Result<(), CliError> {
    let client = ctx.client()?;
    let record = resolve_agent(&client, &agent)?;

    if !yes {
        if !atty::is(atty::Stream::Stdin) {
            return Err(CliError::usage("Refusing to delete without confirmation")
                .with_hint("pass --yes when stdin is not a TTY"));
        }
        let answer = util::prompt_line(&format!("Delete {}? [y/N] ", record.label()))
            .map_err(|e| CliError { code: EXIT_ERROR, message: e, hint: None })?;
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            eprintln!("Aborted");
            return Ok(());
        }
    }

    let ack = client.delete_agent(&record.token).map_err(api_error)?;
    log::info!("deleted agent {} ({})", record.label(), record.token);
    if ack.msg.is_empty() {
        eprintln!("Deleted {}", record.label());
    } else {
        eprintln!("Deleted {}: {}", record.label(), ack.msg);
    }
    Ok(())
}

/// Resolve `query` against the agent listing.
pub fn resolve_agent(client: &ConsoleClient, query: &str) -> Result<AgentRecord, CliError> {
    let agents = client.list_agents().map_err(api_error)?;
    find_agent(&agents, query).cloned().ok_or_else(|| CliError {
        code: EXIT_NO_SUCH_AGENT,
        message: format!("No agent matches {:?}", query),
        hint: Some("use a token, hostname or user@host from `fleetdesk agents`".into()),
    })
}

// ── Exec / result ───────────────────────────────────────────────────

/// Run one command through the terminal panel and print what it logs.
pub fn cmd_exec(ctx: &Context, agent: String, command: Vec<String>, wait_ms: Option<u64>) -> Result<(), CliError> {
    let command = command.join(" ");
    if command.trim().is_empty() {
        return Err(CliError::usage("empty command"));
    }

    let client = ctx.client()?;
    let record = resolve_agent(&client, &agent)?;
    let now = Utc::now();
    if record.presence(now, ctx.threshold()) == Presence::Offline {
        return Err(CliError {
            code: EXIT_AGENT_OFFLINE,
            message: format!("{} is offline", record.label()),
            hint: Some(format!("last seen {}", util::format_age(record.last_seen, now))),
        });
    }

    let delay = wait_ms.map(Duration::from_millis).unwrap_or_else(|| ctx.settings.poll_delay());
    let shell = HttpShell::new(client);
    let mut panel = TerminalPanel::new(delay);
    panel.select_target(Target::new(&record.token, &record.hostname, &record.username));

    let mut failure: Option<RemoteError> = None;
    let mut last_error_line: Option<String> = None;
    let mut queue: VecDeque<PanelEvent> = panel.submit_command(&command).into();

    while let Some(event) = queue.pop_front() {
        let job = match event {
            PanelEvent::Log(line) => {
                match line.kind {
                    LogKind::Output => println!("{}", line.text),
                    LogKind::Error => last_error_line = Some(line.text),
                    LogKind::Info | LogKind::Warning => eprintln!("{}", line.text),
                    LogKind::Command => {}
                }
                continue;
            }
            PanelEvent::Request(Request::Submit { ticket, token, command }) => Job::Submit { ticket, token, command },
            PanelEvent::Request(Request::Fetch { ticket, token }) => Job::Fetch { ticket, token },
            PanelEvent::Request(Request::SchedulePoll { ticket, token, delay }) => {
                log::debug!("waiting {:?} before polling {}", delay, ticket);
                thread::sleep(delay);
                Job::Fetch { ticket, token }
            }
            _ => continue,
        };

        let completion = run_job(&shell, job);
        if let Outcome::Submitted(Err(e)) | Outcome::Fetched(Err(e)) = &completion.outcome {
            failure = Some(e.clone());
        }
        queue.extend(panel.on_completion(completion));
    }

    match failure {
        None => Ok(()),
        Some(err) => {
            let hint = match err {
                RemoteError::Unauthorized => Some("run `fleetdesk login` again".to_string()),
                _ => None,
            };
            Err(CliError {
                code: remote_exit_code(&err),
                message: last_error_line.unwrap_or_else(|| err.to_string()),
                hint,
            })
        }
    }
}

pub fn cmd_result(ctx: &Context, agent: String, json: bool) -> Result<(), CliError> {
    let client = ctx.client()?;
    let record = resolve_agent(&client, &agent)?;
    let result = client.latest_result(&record.token).map_err(api_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
        return Ok(());
    }

    if result.last_command_executed.is_none() && result.command_output.is_none() {
        return Err(CliError {
            code: EXIT_NO_RESULT,
            message: format!("{} has not reported a result yet", record.label()),
            hint: None,
        });
    }

    if let Some(cmd) = &result.last_command_executed {
        eprintln!("{}> {}", record.label(), cmd);
    }
    match result.output() {
        Some(output) => println!("{}", output),
        None => eprintln!("(no output)"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdesk_api_client::save_auth_to;

    fn context(token: Option<&str>) -> Context {
        Context { settings: Settings::default(), api_base: None, token: token.map(String::from) }
    }

    fn saved_login(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("auth.json");
        save_auth_to(&AuthCredentials::new("saved".into(), "http://fleet".into()), &path).unwrap();
        path
    }

    #[test]
    fn expired_saved_login_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = saved_login(&dir);
        context(None).forget_expired_login_at(&path);
        assert!(!path.exists());
    }

    #[test]
    fn expired_override_token_keeps_saved_login() {
        let dir = tempfile::tempdir().unwrap();
        let path = saved_login(&dir);
        context(Some("stale")).forget_expired_login_at(&path);
        assert!(path.exists());
    }

    #[test]
    fn threshold_from_settings() {
        let settings = Settings { online_threshold_minutes: 10, ..Settings::default() };
        assert_eq!(online_threshold(&settings), chrono::Duration::minutes(10));
    }

    #[test]
    fn threshold_out_of_range_uses_default() {
        for minutes in [i64::MAX, i64::MIN, 0, -3] {
            let settings = Settings { online_threshold_minutes: minutes, ..Settings::default() };
            assert_eq!(online_threshold(&settings), default_online_threshold());
        }
    }
}

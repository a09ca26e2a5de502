//! Fleet backend HTTP client.
//!
//! Blocking reqwest client (no Tokio runtime required). Every request
//! carries the bearer token; HTTP 401 is surfaced as
//! [`ApiError::Unauthorized`] so callers can end the session.

use std::time::Duration;

use fleetdesk_protocol::{
    Ack, AgentRecord, CommandResult, ErrorDetail, OperatorInfo, StatusSummary, TokenResponse,
    DEFAULT_AGENT_PREFIX,
};
use reqwest::blocking::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::{load_auth, AuthCredentials};

/// Fleet backend API client (blocking).
#[derive(Clone)]
pub struct ConsoleClient {
    http: reqwest::blocking::Client,
    api_base: String,
    agent_prefix: String,
    token: String,
}

/// Knobs that come from settings rather than credentials.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub agent_prefix: String,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            agent_prefix: DEFAULT_AGENT_PREFIX.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Error type for backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No auth credentials configured
    NotAuthenticated,
    /// Backend rejected the credentials (HTTP 401)
    Unauthorized(Option<String>),
    /// Network error
    Network(String),
    /// Non-success HTTP status, with the backend's `detail` when present
    Http { status: u16, detail: Option<String> },
    /// Response body did not match the expected shape
    Parse(String),
    /// Bad base URL or path
    InvalidUrl(String),
}

impl ApiError {
    /// Backend-supplied detail message, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized(detail) | ApiError::Http { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotAuthenticated => write!(f, "Not authenticated, run `fleetdesk login` first"),
            ApiError::Unauthorized(Some(detail)) => write!(f, "Unauthorized: {}", detail),
            ApiError::Unauthorized(None) => write!(f, "Unauthorized"),
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, detail: Some(detail) } => write!(f, "HTTP {}: {}", status, detail),
            ApiError::Http { status, detail: None } => write!(f, "HTTP {}", status),
            ApiError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ApiError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ConsoleClient {
    /// Create a new client using saved auth credentials.
    pub fn from_saved_auth(opts: ClientOptions) -> Result<Self, ApiError> {
        let creds = load_auth().ok_or(ApiError::NotAuthenticated)?;
        Ok(Self::new(creds, opts))
    }

    /// Create a new client with explicit credentials.
    pub fn new(creds: AuthCredentials, opts: ClientOptions) -> Self {
        Self {
            http: build_http(opts.timeout),
            api_base: normalize_base(&creds.api_base),
            agent_prefix: normalize_prefix(&opts.agent_prefix),
            token: creds.token,
        }
    }

    /// Exchange operator credentials for a bearer token (`POST /auth/login`).
    pub fn login(
        api_base: &str,
        username: &str,
        password: &str,
        opts: &ClientOptions,
    ) -> Result<TokenResponse, ApiError> {
        let http = build_http(opts.timeout);
        let url = join_url(&normalize_base(api_base), &["auth", "login"])?;
        let req = http
            .post(url)
            .form(&[("username", username), ("password", password)]);
        let resp = send(req, "POST /auth/login")?;
        decode(resp)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the operator the token belongs to.
    pub fn me(&self) -> Result<OperatorInfo, ApiError> {
        let url = join_url(&self.api_base, &["auth", "me"])?;
        decode(self.get(url, "GET /auth/me")?)
    }

    /// List every agent known to the backend.
    pub fn list_agents(&self) -> Result<Vec<AgentRecord>, ApiError> {
        // The listing route is the prefix itself with a trailing slash.
        let mut url = self.agent_url(&[])?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        decode(self.get(url, "GET agents")?)
    }

    /// Queue a command for an agent (`POST {prefix}/command/{token}?command=...`).
    pub fn send_command(&self, agent_token: &str, command: &str) -> Result<Ack, ApiError> {
        let mut url = self.agent_url(&["command", agent_token])?;
        url.query_pairs_mut().append_pair("command", command);
        let req = self.http.post(url).bearer_auth(&self.token).header("Content-Type", "application/json");
        let resp = send(req, "POST command")?;
        // Older backends answer with an empty body.
        Ok(resp.json::<Ack>().unwrap_or(Ack { msg: String::new() }))
    }

    /// Fetch the latest result recorded for an agent.
    pub fn latest_result(&self, agent_token: &str) -> Result<CommandResult, ApiError> {
        let url = self.agent_url(&["result", agent_token])?;
        decode(self.get(url, "GET result")?)
    }

    /// Remove an agent from the backend (`DELETE {prefix}/{token}`).
    pub fn delete_agent(&self, agent_token: &str) -> Result<Ack, ApiError> {
        let url = self.agent_url(&[agent_token])?;
        let req = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json");
        let resp = send(req, "DELETE agent")?;
        Ok(resp.json::<Ack>().unwrap_or(Ack { msg: String::new() }))
    }

    /// Backend fleet summary (`GET /status`).
    pub fn status(&self) -> Result<StatusSummary, ApiError> {
        let url = join_url(&self.api_base, &["status"])?;
        decode(self.get(url, "GET /status")?)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn agent_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut all: Vec<&str> = self
            .agent_prefix
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        all.extend_from_slice(segments);
        join_url(&self.api_base, &all)
    }

    fn get(&self, url: Url, what: &str) -> Result<Response, ApiError> {
        let req = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json");
        send(req, what)
    }
}

// ── Free functions ──────────────────────────────────────────────────

fn build_http(timeout: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .user_agent(format!("fleetdesk/{}", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

fn normalize_base(api_base: &str) -> String {
    api_base.trim().trim_end_matches('/').to_string()
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    format!("/{}", trimmed)
}

/// Append percent-encoded path segments to the base URL.
fn join_url(api_base: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = Url::parse(api_base).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", api_base, e)))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(format!("{} cannot be a base", api_base)))?;
        path.pop_if_empty();
        for seg in segments {
            path.push(seg);
        }
    }
    Ok(url)
}

fn send(req: RequestBuilder, what: &str) -> Result<Response, ApiError> {
    let response = req.send().map_err(|e| {
        log::debug!("{} failed: {}", what, e);
        ApiError::Network(e.to_string())
    })?;

    let status = response.status().as_u16();
    log::debug!("{} -> {}", what, status);
    if response.status().is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let detail = ErrorDetail::message_from_body(&body);
    if status == 401 {
        return Err(ApiError::Unauthorized(detail));
    }
    Err(ApiError::Http { status, detail })
}

fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    resp.json::<T>().map_err(|e| ApiError::Parse(e.to_string()))
}

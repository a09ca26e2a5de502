//! Console backend wire format.
//!
//! This crate defines the JSON payloads exchanged between the console and
//! the fleet backend. Field names follow the backend exactly; renaming a
//! field here breaks the console against every deployed backend.
//!
//! # Endpoints
//!
//! | Method | Path                          | Body / Response        |
//! |--------|-------------------------------|------------------------|
//! | POST   | `/auth/login` (form)          | [`TokenResponse`]      |
//! | GET    | `/auth/me`                    | [`OperatorInfo`]       |
//! | GET    | `{prefix}/`                   | `Vec<AgentRecord>`     |
//! | POST   | `{prefix}/command/{token}`    | [`Ack`]                |
//! | GET    | `{prefix}/result/{token}`     | [`CommandResult`]      |
//! | DELETE | `{prefix}/{token}`            | [`Ack`]                |
//! | GET    | `/status`                     | [`StatusSummary`]      |
//!
//! Error responses carry an [`ErrorDetail`] body.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod timestamp;

/// Default path prefix of the agent endpoints.
pub const DEFAULT_AGENT_PREFIX: &str = "/implants";

/// Agents not seen for this many minutes are reported offline.
pub const DEFAULT_ONLINE_THRESHOLD_MINUTES: i64 = 5;

// =============================================================================
// Auth
// =============================================================================

/// Response of `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Response of `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub id: i64,
    pub username: String,
}

// =============================================================================
// Agents
// =============================================================================

/// One entry of the agent listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    #[serde(default)]
    pub id: i64,
    pub token: String,
    pub hostname: String,
    pub username: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub geo_location: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub is_local_admin: bool,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub is_alive: bool,
    #[serde(with = "timestamp")]
    pub last_seen: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub installed_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    /// `username@hostname`, the label used by the console everywhere.
    pub fn label(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }

    /// Presence at `now` for the given staleness threshold.
    pub fn presence(&self, now: DateTime<Utc>, threshold: Duration) -> Presence {
        Presence::from_last_seen(self.last_seen, now, threshold)
    }
}

/// Derived agent presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

impl Presence {
    /// Online if the agent was seen strictly less than `threshold` ago.
    pub fn from_last_seen(last_seen: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> Self {
        if now.signed_duration_since(last_seen) < threshold {
            Presence::Online
        } else {
            Presence::Offline
        }
    }

    pub fn is_online(self) -> bool {
        matches!(self, Presence::Online)
    }

    /// Upper-case tag, e.g. `ONLINE`.
    pub fn tag(self) -> &'static str {
        match self {
            Presence::Online => "ONLINE",
            Presence::Offline => "OFFLINE",
        }
    }
}

/// Default staleness threshold as a chrono duration.
pub fn default_online_threshold() -> Duration {
    Duration::minutes(DEFAULT_ONLINE_THRESHOLD_MINUTES)
}

// =============================================================================
// Commands
// =============================================================================

/// Generic acknowledgement (`{"msg": "..."}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub msg: String,
}

/// Latest command result reported for an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(default)]
    pub implant_token: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub last_command_sent: Option<String>,
    #[serde(default)]
    pub last_command_executed: Option<String>,
    #[serde(default)]
    pub command_output: Option<String>,
    #[serde(default)]
    pub execution_time: Option<String>,
    #[serde(default)]
    pub is_alive: bool,
    #[serde(default)]
    pub last_seen: Option<String>,
}

impl CommandResult {
    /// Output text, or `None` when absent or empty.
    pub fn output(&self) -> Option<&str> {
        self.command_output.as_deref().filter(|s| !s.is_empty())
    }
}

// =============================================================================
// Status / errors
// =============================================================================

/// Response of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total_implants: u64,
    pub active_implants: u64,
    pub offline_implants: u64,
}

/// Error body returned by the backend on non-success responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub detail: serde_json::Value,
}

impl ErrorDetail {
    /// Extract a human-readable message from an error body.
    ///
    /// `detail` is usually a string; validation failures carry a list of
    /// objects with a `msg` field, which are joined with `; `.
    pub fn message_from_body(body: &str) -> Option<String> {
        let parsed: ErrorDetail = serde_json::from_str(body).ok()?;
        match parsed.detail {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            serde_json::Value::Array(items) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if msgs.is_empty() {
                    None
                } else {
                    Some(msgs.join("; "))
                }
            }
            _ => None,
        }
    }
}

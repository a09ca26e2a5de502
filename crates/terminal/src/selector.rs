//! Target selection.
//!
//! Builds the option list shown to the operator from an agent listing and
//! turns a picked option back into a [`Target`]. Option values use the
//! `token|hostname|username` form.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use fleetdesk_protocol::{AgentRecord, Presence};

use crate::panel::Target;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOption {
    pub value: String,
    pub label: String,
    pub presence: Presence,
    pub target: Target,
}

impl TargetOption {
    /// Only online agents can be selected.
    pub fn is_selectable(&self) -> bool {
        self.presence.is_online()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Value is not `token|hostname|username` with three non-empty parts
    Malformed(String),
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::Malformed(value) => write!(f, "malformed target value: {:?}", value),
        }
    }
}

impl std::error::Error for SelectorError {}

/// Encode a target as a selector value.
pub fn option_value(target: &Target) -> String {
    format!("{}|{}|{}", target.token, target.hostname, target.username)
}

pub fn build_options(agents: &[AgentRecord], now: DateTime<Utc>, threshold: Duration) -> Vec<TargetOption> {
    agents
        .iter()
        .map(|agent| {
            let presence = agent.presence(now, threshold);
            let target = Target::new(&agent.token, &agent.hostname, &agent.username);
            let label = if agent.ip_address.is_empty() {
                format!("{} [{}]", agent.label(), presence.tag())
            } else {
                format!("{} ({}) [{}]", agent.label(), agent.ip_address, presence.tag())
            };
            TargetOption {
                value: option_value(&target),
                label,
                presence,
                target,
            }
        })
        .collect()
}

pub fn parse_selection(value: &str) -> Result<Target, SelectorError> {
    let parts: Vec<&str> = value.split('|').collect();
    match parts.as_slice() {
        [token, hostname, username] if !token.is_empty() && !hostname.is_empty() && !username.is_empty() => {
            Ok(Target::new(*token, *hostname, *username))
        }
        _ => Err(SelectorError::Malformed(value.to_string())),
    }
}

/// Find an agent by token, hostname (case-insensitive) or `user@host`.
pub fn find_agent<'a>(agents: &'a [AgentRecord], query: &str) -> Option<&'a AgentRecord> {
    let query = query.trim();
    agents
        .iter()
        .find(|a| a.token == query)
        .or_else(|| agents.iter().find(|a| a.hostname.eq_ignore_ascii_case(query)))
        .or_else(|| agents.iter().find(|a| a.label().eq_ignore_ascii_case(query)))
}

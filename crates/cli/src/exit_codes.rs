//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing input)|
//! | 40-49   | backend          | Authentication, transport, agent state   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use fleetdesk_api_client::ApiError;
use fleetdesk_terminal::RemoteError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required input.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Backend (40-49)
// =============================================================================

/// No saved token, or the backend rejected it (HTTP 401).
pub const EXIT_NOT_AUTH: u8 = 40;

/// Backend unreachable, timed out, or answered with an unreadable body.
pub const EXIT_NETWORK: u8 = 41;

/// Backend answered with a non-success status.
pub const EXIT_REJECTED: u8 = 42;

/// No agent matches the given token, hostname or user@host.
pub const EXIT_NO_SUCH_AGENT: u8 = 43;

/// Agent exists but has not checked in within the online threshold.
pub const EXIT_AGENT_OFFLINE: u8 = 44;

/// Agent has not reported any command result yet.
pub const EXIT_NO_RESULT: u8 = 45;

/// Map a client error to its exit code.
pub fn api_exit_code(err: &ApiError) -> u8 {
    match err {
        ApiError::NotAuthenticated | ApiError::Unauthorized(_) => EXIT_NOT_AUTH,
        ApiError::Network(_) | ApiError::Parse(_) | ApiError::InvalidUrl(_) => EXIT_NETWORK,
        ApiError::Http { .. } => EXIT_REJECTED,
    }
}

/// Map a remote execution error to its exit code.
pub fn remote_exit_code(err: &RemoteError) -> u8 {
    match err {
        RemoteError::Unauthorized => EXIT_NOT_AUTH,
        RemoteError::Rejected { .. } => EXIT_REJECTED,
        RemoteError::Transport(_) => EXIT_NETWORK,
    }
}

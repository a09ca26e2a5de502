//! HTTP-backed remote shell for the terminal panel.

use fleetdesk_api_client::{ApiError, ConsoleClient};
use fleetdesk_protocol::CommandResult;
use fleetdesk_terminal::{RemoteError, RemoteShell};

pub struct HttpShell {
    client: ConsoleClient,
}

impl HttpShell {
    pub fn new(client: ConsoleClient) -> Self {
        Self { client }
    }
}

impl RemoteShell for HttpShell {
    fn submit_command(&self, token: &str, command: &str) -> Result<(), RemoteError> {
        let ack = self.client.send_command(token, command).map_err(remote_error)?;
        if !ack.msg.is_empty() {
            log::debug!("backend ack: {}", ack.msg);
        }
        Ok(())
    }

    fn latest_result(&self, token: &str) -> Result<CommandResult, RemoteError> {
        self.client.latest_result(token).map_err(remote_error)
    }
}

pub fn remote_error(err: ApiError) -> RemoteError {
    match err {
        ApiError::Unauthorized(_) | ApiError::NotAuthenticated => RemoteError::Unauthorized,
        ApiError::Http { status, detail } => RemoteError::Rejected { status, detail },
        other => RemoteError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_mapping() {
        assert_eq!(remote_error(ApiError::Unauthorized(Some("expired".into()))), RemoteError::Unauthorized);
        assert_eq!(
            remote_error(ApiError::Http { status: 404, detail: Some("Implant not found".into()) }),
            RemoteError::Rejected { status: 404, detail: Some("Implant not found".into()) }
        );
        assert_eq!(
            remote_error(ApiError::Network("connection refused".into())),
            RemoteError::Transport("Network error: connection refused".into())
        );
    }
}

//! HTTP contract tests for the backend client.
//!
//! These pin the request shapes the backend expects: paths, bearer header,
//! URL-encoded command text, and how error bodies are turned into errors.

use httpmock::prelude::*;
use serde_json::json;

use fleetdesk_api_client::{ApiError, AuthCredentials, ClientOptions, ConsoleClient};

fn client(server: &MockServer) -> ConsoleClient {
    ConsoleClient::new(
        AuthCredentials::new("op-token".into(), server.base_url()),
        ClientOptions::default(),
    )
}

#[test]
fn login_returns_access_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(200)
            .json_body(json!({ "access_token": "jwt-abc", "token_type": "bearer" }));
    });

    let tok = ConsoleClient::login(&server.base_url(), "operator", "hunter22", &ClientOptions::default())
        .unwrap();
    assert_eq!(tok.access_token, "jwt-abc");
    mock.assert();
}

#[test]
fn login_rejected_maps_to_unauthorized_with_detail() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(401)
            .json_body(json!({ "detail": "Incorrect username or password" }));
    });

    let err = ConsoleClient::login(&server.base_url(), "operator", "wrong", &ClientOptions::default())
        .unwrap_err();
    assert_eq!(err, ApiError::Unauthorized(Some("Incorrect username or password".into())));
}

#[test]
fn me_sends_bearer_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/auth/me")
            .header("Authorization", "Bearer op-token");
        then.status(200).json_body(json!({ "id": 1, "username": "operator" }));
    });

    let me = client(&server).me().unwrap();
    assert_eq!(me.username, "operator");
    mock.assert();
}

#[test]
fn list_agents_parses_records() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/implants/");
        then.status(200).json_body(json!([
            {
                "id": 1,
                "token": "tok1",
                "ip_address": "10.0.0.5",
                "geo_location": "Lisbon, PT",
                "operating_system": "Windows 11",
                "username": "alice",
                "hostname": "HOST-A",
                "is_local_admin": false,
                "language": "en-US",
                "is_alive": true,
                "last_seen": "2025-06-15T14:30:00.000001",
                "installed_at": "2025-06-01T08:00:00"
            },
            {
                "id": 2,
                "token": "tok2",
                "username": "bob",
                "hostname": "HOST-B",
                "last_seen": "2025-06-14T09:00:00"
            }
        ]));
    });

    let agents = client(&server).list_agents().unwrap();
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0].label(), "alice@HOST-A");
    assert_eq!(agents[1].ip_address, "");
}

#[test]
fn send_command_encodes_query() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/implants/command/tok1")
            .query_param("command", "echo a&b = c")
            .header("Authorization", "Bearer op-token");
        then.status(200).json_body(json!({ "msg": "Command sent successfully" }));
    });

    let ack = client(&server).send_command("tok1", "echo a&b = c").unwrap();
    assert_eq!(ack.msg, "Command sent successfully");
    mock.assert();
}

#[test]
fn send_command_not_found_carries_detail() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/implants/command/missing");
        then.status(404).json_body(json!({ "detail": "Implant not found" }));
    });

    let err = client(&server).send_command("missing", "whoami").unwrap_err();
    assert_eq!(err, ApiError::Http { status: 404, detail: Some("Implant not found".into()) });
}

#[test]
fn server_error_without_json_has_no_detail() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/implants/command/tok1");
        then.status(502).body("<html>bad gateway</html>");
    });

    let err = client(&server).send_command("tok1", "whoami").unwrap_err();
    assert_eq!(err, ApiError::Http { status: 502, detail: None });
}

#[test]
fn latest_result_reads_output() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/implants/result/tok1");
        then.status(200).json_body(json!({
            "implant_token": "tok1",
            "hostname": "HOST-A",
            "username": "alice",
            "last_command_sent": "whoami",
            "last_command_executed": "whoami",
            "command_output": "alice",
            "execution_time": "2025-06-15T14:30:02",
            "is_alive": true,
            "last_seen": "2025-06-15T14:30:02"
        }));
    });

    let result = client(&server).latest_result("tok1").unwrap();
    assert_eq!(result.output(), Some("alice"));
}

#[test]
fn expired_token_maps_to_unauthorized() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/implants/result/tok1");
        then.status(401).json_body(json!({ "detail": "Could not validate credentials" }));
    });

    let err = client(&server).latest_result("tok1").unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
}

#[test]
fn delete_agent_sends_bearer_and_reads_ack() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE)
            .path("/implants/tok1")
            .header("Authorization", "Bearer op-token");
        then.status(200).json_body(json!({ "msg": "Implant deleted successfully" }));
    });

    let ack = client(&server).delete_agent("tok1").unwrap();
    assert_eq!(ack.msg, "Implant deleted successfully");
    mock.assert();
}

#[test]
fn delete_unknown_agent_carries_detail() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(DELETE).path("/implants/gone");
        then.status(404).json_body(json!({ "detail": "Implant not found" }));
    });

    let err = client(&server).delete_agent("gone").unwrap_err();
    assert_eq!(err, ApiError::Http { status: 404, detail: Some("Implant not found".into()) });
}

#[test]
fn delete_with_expired_token_maps_to_unauthorized() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(DELETE).path("/implants/tok1");
        then.status(401).json_body(json!({ "detail": "Could not validate credentials" }));
    });

    let err = client(&server).delete_agent("tok1").unwrap_err();
    assert_eq!(err, ApiError::Unauthorized(Some("Could not validate credentials".into())));
}

#[test]
fn custom_agent_prefix_is_used() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api/agents/result/tok9");
        then.status(200).json_body(json!({ "command_output": "" }));
    });

    let opts = ClientOptions { agent_prefix: "api/agents/".into(), ..ClientOptions::default() };
    let c = ConsoleClient::new(AuthCredentials::new("op-token".into(), server.base_url()), opts);
    let result = c.latest_result("tok9").unwrap();
    assert_eq!(result.output(), None);
    mock.assert();
}

#[test]
fn status_summary() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/status");
        then.status(200).json_body(json!({
            "total_implants": 3,
            "active_implants": 2,
            "offline_implants": 1
        }));
    });

    let status = client(&server).status().unwrap();
    assert_eq!(status.total_implants, 3);
    assert_eq!(status.offline_implants, 1);
}

#[test]
fn connection_refused_is_network_error() {
    let c = ConsoleClient::new(
        AuthCredentials::new("t".into(), "http://127.0.0.1:9".into()),
        ClientOptions::default(),
    );
    assert!(matches!(c.me(), Err(ApiError::Network(_))));
}

//! Fleet backend API client, shared by the CLI and the interactive console.
//!
//! This crate is the single source of truth for talking to the backend:
//! login, operator info, agent listing and removal, command submission,
//! result fetch.
//!
//! No UI concepts. No retries. Every call is one blocking request.

mod auth;
mod client;

pub use auth::{
    AuthCredentials, auth_file_path, load_auth, load_auth_from, save_auth, save_auth_to,
    delete_auth, delete_auth_at,
};
pub use client::{ApiError, ClientOptions, ConsoleClient};

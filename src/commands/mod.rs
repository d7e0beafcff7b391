//! CLI command handlers.

mod auth;

pub use auth::{run_account_command, run_auth_capture_command, run_auth_clear_command};

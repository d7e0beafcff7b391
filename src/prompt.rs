//! Interactive cookie acquisition from the operator.

use std::sync::LazyLock;

use async_trait::async_trait;
use inquire::{Password, PasswordDisplayMode};
use regex::Regex;
use tokio::task::spawn_blocking;

static COOKIE_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*Cookie:\s*").ok());

/// Errors from prompting the operator.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// The operator cancelled or interrupted the prompt.
    #[error("cookie prompt was cancelled")]
    Cancelled,
    /// The terminal could not be used for prompting.
    #[error("cookie prompt failed: {0}")]
    Terminal(String),
    /// The blocking prompt task panicked or was cancelled.
    #[error("cookie prompt task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Shows a message to the operator and returns what they typed.
#[async_trait]
pub trait SecretPrompt: Send + Sync {
    /// Prompts with `message` and returns the entered text.
    async fn prompt_for_secret(&self, message: &str) -> Result<String, PromptError>;
}

/// Hidden-input terminal prompt backed by `inquire`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

#[async_trait]
impl SecretPrompt for TerminalPrompt {
    async fn prompt_for_secret(&self, message: &str) -> Result<String, PromptError> {
        let message = message.to_string();
        spawn_blocking(move || {
            Password::new(&message)
                .without_confirmation()
                .with_display_mode(PasswordDisplayMode::Hidden)
                .prompt()
                .map_err(|error| match error {
                    inquire::InquireError::OperationCanceled
                    | inquire::InquireError::OperationInterrupted => PromptError::Cancelled,
                    other => PromptError::Terminal(other.to_string()),
                })
        })
        .await?
    }
}

/// Removes a leading `Cookie:` header label, as copied from browser dev tools.
///
/// Matching is case-insensitive and eats surrounding whitespace.
#[must_use]
pub fn strip_cookie_label(input: &str) -> String {
    match COOKIE_LABEL.as_ref() {
        Some(label) => label.replace(input, "").into_owned(),
        None => input.to_string(),
    }
}

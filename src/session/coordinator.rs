//! Process-wide ownership of the operator prompt.
//!
//! Prompting the operator is exclusive: two prompts printed at the same time on
//! one terminal are unusable. Every session shares one
//! [`AcquisitionCoordinator`], and only the holder of its [`PromptGuard`] may
//! prompt. Attempts made while the guard is held are dropped, not queued.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::prompt::{PromptError, SecretPrompt, TerminalPrompt};

/// Shared prompt lock plus the prompt implementation it protects.
pub struct AcquisitionCoordinator {
    prompt: Arc<dyn SecretPrompt>,
    prompting: AtomicBool,
}

impl AcquisitionCoordinator {
    /// Creates a coordinator around `prompt`.
    #[must_use]
    pub fn new(prompt: Arc<dyn SecretPrompt>) -> Self {
        Self {
            prompt,
            prompting: AtomicBool::new(false),
        }
    }

    /// Creates a coordinator that prompts on the controlling terminal.
    #[must_use]
    pub fn terminal() -> Self {
        Self::new(Arc::new(TerminalPrompt))
    }

    /// Returns `true` while a prompt is outstanding.
    #[must_use]
    pub fn is_prompting(&self) -> bool {
        self.prompting.load(Ordering::Acquire)
    }

    /// Takes the prompt lock, or returns `None` when another prompt is active.
    #[must_use]
    pub fn try_lock(&self) -> Option<PromptGuard<'_>> {
        self.prompting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PromptGuard { coordinator: self })
    }
}

impl fmt::Debug for AcquisitionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionCoordinator")
            .field("prompting", &self.is_prompting())
            .finish_non_exhaustive()
    }
}

/// Exclusive right to prompt the operator. Releases the lock on drop.
#[derive(Debug)]
pub struct PromptGuard<'a> {
    coordinator: &'a AcquisitionCoordinator,
}

impl PromptGuard<'_> {
    /// Prompts the operator with `message`.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when the prompt is cancelled or the terminal fails.
    pub async fn prompt(&self, message: &str) -> Result<String, PromptError> {
        self.coordinator.prompt.prompt_for_secret(message).await
    }
}

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.prompting.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct EchoPrompt;

    #[async_trait]
    impl SecretPrompt for EchoPrompt {
        async fn prompt_for_secret(&self, message: &str) -> Result<String, PromptError> {
            Ok(message.to_string())
        }
    }

    #[test]
    fn test_try_lock_is_exclusive_until_guard_drops() {
        let coordinator = AcquisitionCoordinator::new(Arc::new(EchoPrompt));

        let guard = coordinator.try_lock();
        assert!(guard.is_some());
        assert!(coordinator.is_prompting());
        assert!(coordinator.try_lock().is_none());

        drop(guard);
        assert!(!coordinator.is_prompting());
        assert!(coordinator.try_lock().is_some());
    }

    #[tokio::test]
    async fn test_guard_prompts_through_shared_prompt() {
        let coordinator = AcquisitionCoordinator::new(Arc::new(EchoPrompt));
        let guard = coordinator.try_lock().unwrap();
        assert_eq!(guard.prompt("hello").await.unwrap(), "hello");
    }
}

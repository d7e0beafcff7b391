//! Shared fakes for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secure_cookie_proxy::{
    AcquisitionCoordinator, CredentialStore, PromptError, SecretPrompt, StoreError,
};
use tokio::sync::Notify;

/// In-memory credential store with switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_value(account: &str, value: &str) -> Arc<Self> {
        let store = Self::default();
        store
            .values
            .lock()
            .unwrap()
            .insert(account.to_string(), value.to_string());
        Arc::new(store)
    }

    pub fn value(&self, account: &str) -> Option<String> {
        self.values.lock().unwrap().get(account).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn simulated_failure(operation: &str) -> StoreError {
    StoreError::KeychainUnavailable {
        reason: format!("simulated {operation} failure"),
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, account: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(simulated_failure("read"));
        }
        Ok(self.value(account))
    }

    async fn set(&self, account: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(simulated_failure("write"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap()
            .insert(account.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<bool, StoreError> {
        Ok(self.values.lock().unwrap().remove(account).is_some())
    }

    fn describe(&self) -> String {
        "memory store".to_string()
    }
}

/// Prompt that replays scripted answers; `None` answers cancel the prompt.
///
/// With [`ScriptedPrompt::gated`] each answer waits for [`ScriptedPrompt::release`].
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Option<String>>>,
    messages: Mutex<Vec<String>>,
    gated: bool,
    entered: Notify,
    released: Notify,
}

impl ScriptedPrompt {
    pub fn answering<I, S>(answers: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().map(|a| Some(a.into())).collect()),
            ..Self::default()
        })
    }

    pub fn gated(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(VecDeque::from([Some(answer.to_string())])),
            gated: true,
            ..Self::default()
        })
    }

    pub fn cancelling() -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(VecDeque::from([None])),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Waits until a prompt has been shown.
    pub async fn wait_entered(&self) {
        with_timeout(self.entered.notified()).await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl SecretPrompt for ScriptedPrompt {
    async fn prompt_for_secret(&self, message: &str) -> Result<String, PromptError> {
        self.messages.lock().unwrap().push(message.to_string());
        self.entered.notify_one();
        if self.gated {
            self.released.notified().await;
        }
        let answer = self.answers.lock().unwrap().pop_front();
        match answer {
            Some(Some(text)) => Ok(text),
            Some(None) => Err(PromptError::Cancelled),
            None => Ok(String::new()),
        }
    }
}

pub fn coordinator(prompt: &Arc<ScriptedPrompt>) -> Arc<AcquisitionCoordinator> {
    Arc::new(AcquisitionCoordinator::new(prompt.clone()))
}

/// Awaits `future`, failing the test after five seconds.
pub async fn with_timeout<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting in test")
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    with_timeout(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

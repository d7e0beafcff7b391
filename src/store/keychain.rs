//! System keychain storage via `keyring`.
//!
//! Entries live under the [`KEYRING_SERVICE`] service with the credential
//! account as the entry user. Keychain calls block, so they run on the
//! blocking pool; platform panics surface as [`StoreError::KeychainUnavailable`].

use std::panic::{AssertUnwindSafe, catch_unwind};

use async_trait::async_trait;
use keyring::credential::{CredentialBuilderApi, CredentialPersistence};
use tokio::task::spawn_blocking;
use tracing::{debug, instrument};

use super::{CredentialStore, StoreError};

/// Keychain service name shared by every proxy target.
pub const KEYRING_SERVICE: &str = "HttpProxySecureCookies";

const PROBE_ACCOUNT: &str = "__secure-cookie-proxy-probe__";
const PROBE_VALUE: &str = "probe";

/// Stores cookie strings in the operating system keychain.
#[derive(Debug, Clone)]
pub struct KeychainStore {
    service: String,
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeychainStore {
    /// Creates a store using the default service name.
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }

    /// Checks whether the keychain persists values across entry handles.
    ///
    /// The platform store must keep credentials until they are deleted; the
    /// in-memory mock and the kernel keyring (cleared on reboot) do not count.
    /// Then a probe value is written through one handle, read back through a
    /// fresh one and removed again.
    pub async fn probe() -> bool {
        if !default_store_persists() {
            debug!("default keychain store does not persist across reboots");
            return false;
        }

        let result = spawn_blocking(|| {
            let writer = safe_entry(KEYRING_SERVICE, PROBE_ACCOUNT)?;
            safe_set_password(&writer, PROBE_VALUE)?;
            let reader = safe_entry(KEYRING_SERVICE, PROBE_ACCOUNT)?;
            let persisted = matches!(safe_get_password(&reader), Ok(Some(value)) if value == PROBE_VALUE);
            let _ = safe_delete_credential(&writer);
            Ok::<_, StoreError>(persisted)
        })
        .await;

        match result {
            Ok(Ok(persisted)) => persisted,
            Ok(Err(error)) => {
                debug!(error = %error, "keychain probe failed");
                false
            }
            Err(error) => {
                debug!(error = %error, "keychain probe task failed");
                false
            }
        }
    }
}

#[async_trait]
impl CredentialStore for KeychainStore {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, account: &str) -> Result<Option<String>, StoreError> {
        let service = self.service.clone();
        let account = account.to_string();
        spawn_blocking(move || {
            let entry = safe_entry(&service, &account)?;
            safe_get_password(&entry)
        })
        .await?
    }

    #[instrument(level = "debug", skip(self, value))]
    async fn set(&self, account: &str, value: &str) -> Result<(), StoreError> {
        let service = self.service.clone();
        let account = account.to_string();
        let value = value.to_string();
        spawn_blocking(move || {
            let entry = safe_entry(&service, &account)?;
            safe_set_password(&entry, &value)
        })
        .await?
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete(&self, account: &str) -> Result<bool, StoreError> {
        let service = self.service.clone();
        let account = account.to_string();
        spawn_blocking(move || {
            let entry = safe_entry(&service, &account)?;
            safe_delete_credential(&entry)
        })
        .await?
    }

    fn describe(&self) -> String {
        "system keychain".to_string()
    }
}

fn default_store_persists() -> bool {
    catch_unwind(|| {
        matches!(
            keyring::default::default_credential_builder().persistence(),
            CredentialPersistence::UntilDelete
        )
    })
    .unwrap_or(false)
}

fn keychain_error(error: &keyring::Error) -> StoreError {
    StoreError::KeychainUnavailable {
        reason: error.to_string(),
    }
}

fn panicked() -> StoreError {
    StoreError::KeychainUnavailable {
        reason: "keychain backend panicked".to_string(),
    }
}

fn safe_entry(service: &str, account: &str) -> Result<keyring::Entry, StoreError> {
    catch_unwind(|| keyring::Entry::new(service, account))
        .map_err(|_| panicked())?
        .map_err(|error| keychain_error(&error))
}

fn safe_get_password(entry: &keyring::Entry) -> Result<Option<String>, StoreError> {
    match catch_unwind(AssertUnwindSafe(|| entry.get_password())).map_err(|_| panicked())? {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(error) => Err(keychain_error(&error)),
    }
}

fn safe_set_password(entry: &keyring::Entry, password: &str) -> Result<(), StoreError> {
    catch_unwind(AssertUnwindSafe(|| entry.set_password(password)))
        .map_err(|_| panicked())?
        .map_err(|error| keychain_error(&error))
}

fn safe_delete_credential(entry: &keyring::Entry) -> Result<bool, StoreError> {
    match catch_unwind(AssertUnwindSafe(|| entry.delete_credential())).map_err(|_| panicked())? {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(error) => Err(keychain_error(&error)),
    }
}

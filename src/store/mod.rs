//! Credential storage for captured cookie strings.
//!
//! One raw cookie string is stored per credential account. Two backends sit
//! behind the [`CredentialStore`] trait:
//! - [`KeychainStore`] - the operating system keychain via `keyring`
//! - [`FileStore`] - one UTF-8 text file per account under a cookie directory
//!
//! [`open_store`] picks the backend once at startup. With [`StoreBackend::Auto`]
//! a keychain probe decides, falling back to files when the keychain cannot
//! persist values.

mod file;
mod keychain;

pub use file::{DEFAULT_COOKIE_DIR_NAME, FileStore, cookie_file_name};
pub use keychain::{KEYRING_SERVICE, KeychainStore};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

/// Errors for credential storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The system keychain rejected the operation or is not reachable.
    #[error("unable to access system keychain: {reason}")]
    KeychainUnavailable {
        /// Backend-provided failure description.
        reason: String,
    },
    /// The stored value is not valid UTF-8.
    #[error("stored cookie value for '{account}' is not valid UTF-8")]
    InvalidEncoding {
        /// Account whose value could not be decoded.
        account: String,
    },
    /// A blocking storage task panicked or was cancelled.
    #[error("credential storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Get/set access to stored cookie strings keyed by credential account.
///
/// `get` returns `Ok(None)` for accounts with nothing stored; errors are
/// reserved for I/O-level failures.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the stored raw cookie string for `account`, if any.
    async fn get(&self, account: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` for `account`, overwriting any previous value.
    async fn set(&self, account: &str, value: &str) -> Result<(), StoreError>;

    /// Removes the stored value. Returns `true` when something was removed.
    async fn delete(&self, account: &str) -> Result<bool, StoreError>;

    /// Human-readable location of the stored values, used in operator prompts.
    fn describe(&self) -> String;
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    /// Probe the keychain and fall back to files.
    #[default]
    Auto,
    /// Always use the system keychain.
    Keychain,
    /// Always use the cookie directory.
    File,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Keychain => "keychain",
            Self::File => "file",
        })
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "keychain" => Ok(Self::Keychain),
            "file" => Ok(Self::File),
            other => Err(format!(
                "unknown storage backend '{other}' (expected auto, keychain or file)"
            )),
        }
    }
}

/// Opens the credential store for `backend`.
///
/// `cookie_dir` overrides the file backend directory (default
/// `<cwd>/.proxy-cookies`).
///
/// # Errors
///
/// Returns [`StoreError::Io`] when the file backend is selected and no cookie
/// directory was given while the current directory cannot be determined.
pub async fn open_store(
    backend: StoreBackend,
    cookie_dir: Option<PathBuf>,
) -> Result<Arc<dyn CredentialStore>, StoreError> {
    let use_keychain = match backend {
        StoreBackend::Keychain => true,
        StoreBackend::File => false,
        StoreBackend::Auto => KeychainStore::probe().await,
    };

    if use_keychain {
        info!(backend = %StoreBackend::Keychain, "Using system keychain for proxy cookies");
        return Ok(Arc::new(KeychainStore::new()));
    }

    let dir = match cookie_dir {
        Some(dir) => dir,
        None => FileStore::default_dir()?,
    };
    debug!(dir = %dir.display(), "keychain unavailable or disabled; using cookie directory");
    info!(backend = %StoreBackend::File, dir = %dir.display(), "Using cookie files for proxy cookies");
    Ok(Arc::new(FileStore::new(dir)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str_is_case_insensitive() {
        assert_eq!("AUTO".parse::<StoreBackend>().unwrap(), StoreBackend::Auto);
        assert_eq!(
            "keychain".parse::<StoreBackend>().unwrap(),
            StoreBackend::Keychain
        );
        assert_eq!("File".parse::<StoreBackend>().unwrap(), StoreBackend::File);
        assert!("vault".parse::<StoreBackend>().is_err());
    }

    #[tokio::test]
    async fn test_open_store_file_backend_uses_given_dir() {
        let tempdir = tempfile::TempDir::new().unwrap();
        let store = open_store(StoreBackend::File, Some(tempdir.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(store.describe(), tempdir.path().display().to_string());

        store.set("example.com", "sid=abc").await.unwrap();
        assert_eq!(
            store.get("example.com").await.unwrap().as_deref(),
            Some("sid=abc")
        );
    }
}

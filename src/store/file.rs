//! File-backed cookie storage.
//!
//! Layout: `<dir>/<account>.txt`, where the account has every character other
//! than ASCII letters, digits, `.` and `-` replaced by `_` and is lower-cased.
//! Each file holds the raw cookie string as UTF-8 text.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument};

use super::{CredentialStore, StoreError};

/// Directory name used under the working directory when none is configured.
pub const DEFAULT_COOKIE_DIR_NAME: &str = ".proxy-cookies";

/// Stores cookie strings as plain files under a cookie directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns `<cwd>/.proxy-cookies`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the current directory is unavailable.
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        Ok(std::env::current_dir()?.join(DEFAULT_COOKIE_DIR_NAME))
    }

    /// Directory holding the cookie files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the cookie file for `account`.
    #[must_use]
    pub fn cookie_file_path(&self, account: &str) -> PathBuf {
        self.dir.join(cookie_file_name(account))
    }
}

/// File name used for `account`.
#[must_use]
pub fn cookie_file_name(account: &str) -> String {
    let sanitized: String = account
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{sanitized}.txt")
}

#[async_trait]
impl CredentialStore for FileStore {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, account: &str) -> Result<Option<String>, StoreError> {
        let path = self.cookie_file_path(account);
        match fs::read(&path).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::InvalidEncoding {
                    account: account.to_string(),
                }),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cookie file stored");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(level = "debug", skip(self, value))]
    async fn set(&self, account: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.cookie_file_path(account);
        fs::write(&path, value.as_bytes()).await?;
        set_owner_only_permissions(&path).await?;
        debug!(path = %path.display(), "wrote cookie file");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete(&self, account: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.cookie_file_path(account)).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(unix)]
async fn set_owner_only_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = std::fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owner_only_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

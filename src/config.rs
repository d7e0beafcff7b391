//! Per-target proxy options.
//!
//! [`SecureCookieProxyOptions`] holds the cookie-session settings for one
//! upstream target plus a [`PassthroughOptions`] bag handed to the transport
//! untouched. Options deserialize from camelCase JSON; closures (cookie rewrite,
//! chained user hooks) are runtime-only and set in code.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cookie::CookieSet;
use crate::proxy::{RequestHook, ResponseHook};

/// Status codes treated as "credentials missing or expired" by default.
pub const DEFAULT_UNAUTHORIZED_STATUS: u16 = 401;

/// Path attribute used when backfilling cookies to the client by default.
pub const DEFAULT_COOKIE_PATH: &str = "/";

/// Transforms the cached cookies before they are backfilled to the client.
pub type CookieRewrite = Arc<dyn Fn(&CookieSet) -> CookieSet + Send + Sync>;

/// Errors raised while validating options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The target is not an absolute URL.
    #[error("invalid proxy target '{target}': {source}")]
    InvalidTarget {
        /// Offending target string.
        target: String,
        /// URL parse failure.
        #[source]
        source: url::ParseError,
    },
    /// The target URL has no host.
    #[error("proxy target '{target}' has no host")]
    MissingHost {
        /// Offending target string.
        target: String,
    },
    /// An unauthorized status code is outside the HTTP status range.
    #[error("invalid unauthorized status code {code} (expected 100-599)")]
    InvalidStatusCode {
        /// The rejected code.
        code: u16,
    },
    /// The configured or derived credential account is empty.
    #[error("credential account for '{target}' is empty")]
    EmptyAccount {
        /// Target whose account resolved to an empty string.
        target: String,
    },
    /// A path rewrite pattern is not a valid regular expression.
    #[error("invalid path rewrite pattern '{pattern}': {source}")]
    InvalidPathRewrite {
        /// The rejected pattern.
        pattern: String,
        /// Regex compile failure.
        #[source]
        source: regex::Error,
    },
    /// Sessions spawn acquisition tasks and must be built inside a Tokio runtime.
    #[error("secure cookie proxy must be set up inside a Tokio runtime")]
    NoRuntime,
}

/// One or many unauthorized status codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusCodes {
    /// A single status code.
    One(u16),
    /// A list of status codes.
    Many(Vec<u16>),
}

impl Default for StatusCodes {
    fn default() -> Self {
        Self::Many(vec![DEFAULT_UNAUTHORIZED_STATUS])
    }
}

impl StatusCodes {
    /// Returns the codes as a list.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u16> {
        match self {
            Self::One(code) => vec![*code],
            Self::Many(codes) => codes.clone(),
        }
    }
}

/// A `pathRewrite` rule: the first match of `from` is replaced by `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRewrite {
    /// Regular expression matched against the request path.
    pub from: String,
    /// Replacement text.
    pub to: String,
}

/// Options forwarded to the proxy transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassthroughOptions {
    /// Verify upstream TLS certificates.
    #[serde(default)]
    pub secure: bool,
    /// Rewrite the `Host` header to the target host.
    #[serde(default = "default_change_origin")]
    pub change_origin: bool,
    /// Ordered request path rewrite rules.
    #[serde(default)]
    pub path_rewrite: Vec<PathRewrite>,
    /// Any other transport option, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for PassthroughOptions {
    fn default() -> Self {
        Self {
            secure: false,
            change_origin: default_change_origin(),
            path_rewrite: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

fn default_change_origin() -> bool {
    true
}

/// Options for proxying one upstream target with cookie replay.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureCookieProxyOptions {
    /// Upstream URL.
    pub target: String,
    /// Credential account; defaults to the target without its scheme.
    #[serde(default)]
    pub keychain_account: Option<String>,
    /// Status codes that trigger re-acquisition.
    #[serde(default)]
    pub unauthorized_status_code: StatusCodes,
    /// Path attribute for backfilled cookies; defaults to `/`.
    #[serde(default)]
    pub cookie_path_rewrite: Option<String>,
    /// Transform applied to cached cookies before backfilling them.
    #[serde(skip)]
    pub cookie_rewrite: Option<CookieRewrite>,
    /// Caller hook run after cookies are injected into a forwarded request.
    #[serde(skip)]
    pub on_proxy_req: Option<RequestHook>,
    /// Caller hook run after cookies are injected into a WebSocket upgrade.
    #[serde(skip)]
    pub on_proxy_req_ws: Option<RequestHook>,
    /// Caller hook run after the response cookies are reconciled.
    #[serde(skip)]
    pub on_proxy_res: Option<ResponseHook>,
    /// Transport options.
    #[serde(flatten)]
    pub passthrough: PassthroughOptions,
}

impl SecureCookieProxyOptions {
    /// Creates options for `target` with every other setting at its default.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            keychain_account: None,
            unauthorized_status_code: StatusCodes::default(),
            cookie_path_rewrite: None,
            cookie_rewrite: None,
            on_proxy_req: None,
            on_proxy_req_ws: None,
            on_proxy_res: None,
            passthrough: PassthroughOptions::default(),
        }
    }

    /// Sets the credential account.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.keychain_account = Some(account.into());
        self
    }

    /// Sets the unauthorized status codes.
    #[must_use]
    pub fn with_unauthorized_status(mut self, codes: StatusCodes) -> Self {
        self.unauthorized_status_code = codes;
        self
    }

    /// Sets the cookie rewrite transform.
    #[must_use]
    pub fn with_cookie_rewrite(
        mut self,
        rewrite: impl Fn(&CookieSet) -> CookieSet + Send + Sync + 'static,
    ) -> Self {
        self.cookie_rewrite = Some(Arc::new(rewrite));
        self
    }

    /// Sets the path attribute for backfilled cookies.
    #[must_use]
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path_rewrite = Some(path.into());
        self
    }

    /// Credential account for this target.
    #[must_use]
    pub fn account(&self) -> String {
        self.keychain_account
            .clone()
            .unwrap_or_else(|| derive_account(&self.target).to_string())
    }

    /// Unauthorized status codes as a list.
    #[must_use]
    pub fn unauthorized_codes(&self) -> Vec<u16> {
        self.unauthorized_status_code.to_vec()
    }

    /// Path attribute for backfilled cookies.
    #[must_use]
    pub fn cookie_path(&self) -> &str {
        self.cookie_path_rewrite
            .as_deref()
            .unwrap_or(DEFAULT_COOKIE_PATH)
    }

    /// Whether the target is a WebSocket endpoint.
    #[must_use]
    pub fn ws(&self) -> bool {
        self.target.starts_with("ws")
    }

    /// Checks the options before a session is built.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparseable or host-less target, an out of
    /// range status code, an empty account, or an invalid path rewrite pattern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.target).map_err(|source| ConfigError::InvalidTarget {
            target: self.target.clone(),
            source,
        })?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingHost {
                target: self.target.clone(),
            });
        }

        if let Some(code) = self
            .unauthorized_codes()
            .into_iter()
            .find(|code| !(100..=599).contains(code))
        {
            return Err(ConfigError::InvalidStatusCode { code });
        }

        if self.account().trim().is_empty() {
            return Err(ConfigError::EmptyAccount {
                target: self.target.clone(),
            });
        }

        for rule in &self.passthrough.path_rewrite {
            Regex::new(&rule.from).map_err(|source| ConfigError::InvalidPathRewrite {
                pattern: rule.from.clone(),
                source,
            })?;
        }

        Ok(())
    }
}

impl From<&str> for SecureCookieProxyOptions {
    fn from(target: &str) -> Self {
        Self::new(target)
    }
}

impl From<String> for SecureCookieProxyOptions {
    fn from(target: String) -> Self {
        Self::new(target)
    }
}

impl fmt::Debug for SecureCookieProxyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureCookieProxyOptions")
            .field("target", &self.target)
            .field("keychain_account", &self.keychain_account)
            .field("unauthorized_status_code", &self.unauthorized_status_code)
            .field("cookie_path_rewrite", &self.cookie_path_rewrite)
            .field("cookie_rewrite", &self.cookie_rewrite.is_some())
            .field("on_proxy_req", &self.on_proxy_req.is_some())
            .field("on_proxy_req_ws", &self.on_proxy_req_ws.is_some())
            .field("on_proxy_res", &self.on_proxy_res.is_some())
            .field("passthrough", &self.passthrough)
            .finish()
    }
}

/// Default credential account: the target with its scheme stripped.
#[must_use]
pub fn derive_account(target: &str) -> &str {
    target.split_once("://").map_or(target, |(_, rest)| rest)
}

//! Per-target cookie session: acquisition, injection and backfill.
//!
//! A [`CookieSession`] caches the cookie set for one upstream target and
//! drives its lifecycle:
//!
//! ```text
//! UNRESOLVED --acquire--> ACQUIRING --ok--> RESOLVED
//!      ^                      |                |
//!      +------ failure -------+   401 / empty  |
//!                             ^----------------+
//! ```
//!
//! Hooks never wait on acquisition. They spawn it on the runtime captured at
//! construction and carry on with whatever the cache held when they ran; the
//! next exchange after acquisition completes sees the new cookies.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use secure_cookie_proxy::{
//!     AcquisitionCoordinator, CookieSession, FileStore, SecureCookieProxyOptions,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = Arc::new(AcquisitionCoordinator::terminal());
//! let store = Arc::new(FileStore::new(".proxy-cookies"));
//! let options = SecureCookieProxyOptions::from("https://api.example.com");
//!
//! let session = Arc::new(CookieSession::new(&options, store, coordinator)?);
//! session.initialize();
//! # Ok(())
//! # }
//! ```

mod coordinator;

pub use coordinator::{AcquisitionCoordinator, PromptGuard};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, CookieRewrite, SecureCookieProxyOptions};
use crate::cookie::{self, CodecError, CookieSet};
use crate::prompt::{PromptError, strip_cookie_label};
use crate::store::{CredentialStore, StoreError};

/// Why an acquisition attempt did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Some session is already prompting the operator.
    PromptActive,
    /// This session already has an acquisition running.
    InFlight,
}

/// Failures absorbed by an acquisition attempt.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// Reading or writing the credential store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The operator prompt failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// The cookie string could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Result of one acquisition attempt. Never surfaced to the request path.
#[derive(Debug)]
pub enum AcquireOutcome {
    /// The cache was replaced with `cookies` entries.
    Resolved {
        /// Number of cookies now cached.
        cookies: usize,
    },
    /// The store holds nothing usable for the account.
    NoCredentials,
    /// The operator submitted an empty answer.
    NoInput,
    /// The attempt was dropped without side effects.
    Skipped(SkipReason),
    /// The attempt failed; the previous cache is untouched.
    Failed(AcquireError),
}

impl AcquireOutcome {
    /// Returns `true` when the cache was replaced.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Cookie cache and acquisition state for one upstream target.
pub struct CookieSession {
    target: String,
    account: String,
    unauthorized: Vec<u16>,
    cookie_path: String,
    cookie_rewrite: Option<CookieRewrite>,
    store: Arc<dyn CredentialStore>,
    coordinator: Arc<AcquisitionCoordinator>,
    cached: RwLock<Option<Arc<CookieSet>>>,
    acquiring: AtomicBool,
    runtime: Handle,
}

impl CookieSession {
    /// Builds a session for the target described by `options`.
    ///
    /// The session starts unresolved; call [`CookieSession::initialize`] to
    /// load stored cookies in the background.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the options are invalid or no Tokio
    /// runtime is running.
    pub fn new(
        options: &SecureCookieProxyOptions,
        store: Arc<dyn CredentialStore>,
        coordinator: Arc<AcquisitionCoordinator>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        Ok(Self {
            target: options.target.clone(),
            account: options.account(),
            unauthorized: options.unauthorized_codes(),
            cookie_path: options.cookie_path().to_string(),
            cookie_rewrite: options.cookie_rewrite.clone(),
            store,
            coordinator,
            cached: RwLock::new(None),
            acquiring: AtomicBool::new(false),
            runtime,
        })
    }

    /// Upstream target URL.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Credential account used for the store.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Snapshot of the cached cookies, if any were acquired.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<CookieSet>> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` when a non-empty cookie set is cached.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cached().is_some_and(|cookies| !cookies.is_empty())
    }

    /// Returns `true` when `status` signals missing or expired credentials.
    #[must_use]
    pub fn is_unauthorized(&self, status: u16) -> bool {
        self.unauthorized.contains(&status)
    }

    /// Loads stored cookies in the background without prompting.
    pub fn initialize(self: &Arc<Self>) -> JoinHandle<AcquireOutcome> {
        self.spawn_acquire(None)
    }

    /// Runs [`CookieSession::acquire`] on the session runtime.
    pub fn spawn_acquire(
        self: &Arc<Self>,
        prompt_message: Option<String>,
    ) -> JoinHandle<AcquireOutcome> {
        let session = Arc::clone(self);
        self.runtime
            .spawn(async move { session.acquire(prompt_message.as_deref()).await })
    }

    /// Acquires cookies from the operator (`prompt_message` given) or the store.
    ///
    /// Does nothing while any session is prompting or while this session is
    /// already acquiring. A successful attempt replaces the cache wholesale;
    /// every failure is logged and leaves the cache as it was.
    #[instrument(level = "debug", skip(self, prompt_message), fields(account = %self.account, interactive = prompt_message.is_some()))]
    pub async fn acquire(&self, prompt_message: Option<&str>) -> AcquireOutcome {
        if self.coordinator.is_prompting() {
            debug!("operator prompt already active; skipping acquisition");
            return AcquireOutcome::Skipped(SkipReason::PromptActive);
        }
        let Some(_flight) = self.begin_flight() else {
            debug!("acquisition already in flight for this session");
            return AcquireOutcome::Skipped(SkipReason::InFlight);
        };

        let result = match prompt_message {
            Some(message) => {
                let Some(guard) = self.coordinator.try_lock() else {
                    debug!("operator prompt taken by another session; skipping acquisition");
                    return AcquireOutcome::Skipped(SkipReason::PromptActive);
                };
                self.acquire_from_operator(&guard, message).await
            }
            None => self.acquire_from_store().await,
        };

        match result {
            Ok(Some(cookies)) if !cookies.is_empty() => {
                let count = cookies.len();
                self.replace_cache(cookies);
                debug!(cookies = count, "cookie cache replaced");
                AcquireOutcome::Resolved { cookies: count }
            }
            Ok(Some(_)) => AcquireOutcome::NoCredentials,
            Ok(None) if prompt_message.is_some() => AcquireOutcome::NoInput,
            Ok(None) => AcquireOutcome::NoCredentials,
            Err(AcquireError::Prompt(PromptError::Cancelled)) => {
                info!("Cookie prompt cancelled.");
                AcquireOutcome::Failed(AcquireError::Prompt(PromptError::Cancelled))
            }
            Err(error) => {
                warn!(error = %error, "Failed to get valid cookies.");
                AcquireOutcome::Failed(error)
            }
        }
    }

    /// Applies cached cookies to a request about to be forwarded.
    ///
    /// With nothing cached, a prompt is requested in the background and the
    /// request goes out unchanged. Otherwise every cached cookie the client's
    /// own `incoming_cookie` header does not name is prepended to that header,
    /// and the result is handed to `set_cookie_header`. The client's pairs are
    /// passed through verbatim, so client values win and names the codec would
    /// reject still reach the target.
    ///
    /// Returns the spawned acquisition, if one was requested.
    pub fn decorate_outbound_request(
        self: &Arc<Self>,
        incoming_cookie: Option<&str>,
        set_cookie_header: impl FnOnce(String),
    ) -> Option<JoinHandle<AcquireOutcome>> {
        let cached = self.cached().filter(|cookies| !cookies.is_empty());
        let Some(cached) = cached else {
            debug!(account = %self.account, "no cached cookies; requesting operator input");
            return Some(self.spawn_acquire(Some(self.missing_cookies_message())));
        };

        if let Some(header) = merge_outbound_cookie(&cached, incoming_cookie) {
            set_cookie_header(header);
        }
        None
    }

    /// Inspects a response from the target before it reaches the client.
    ///
    /// An unauthorized `status` requests a prompt in the background; the
    /// response itself is not held back. Independently, cached cookies the
    /// client did not send and the origin did not set are appended to the
    /// response's `Set-Cookie` list via `replace_set_cookie`.
    ///
    /// Returns the spawned acquisition, if one was requested.
    pub fn decorate_inbound_response<S: AsRef<str>>(
        self: &Arc<Self>,
        status: u16,
        request_path: &str,
        request_cookie: Option<&str>,
        response_set_cookie: &[S],
        replace_set_cookie: impl FnOnce(Vec<String>),
    ) -> Option<JoinHandle<AcquireOutcome>> {
        let acquisition = if self.is_unauthorized(status) {
            info!(account = %self.account, status, path = request_path, "Upstream rejected credentials");
            Some(self.spawn_acquire(Some(self.unauthorized_message(request_path))))
        } else {
            None
        };

        if let Some(cached) = self.cached() {
            let client_cookies = match &self.cookie_rewrite {
                Some(rewrite) => rewrite(&cached),
                None => (*cached).clone(),
            };
            if let Some(directives) = backfill_set_cookie(
                &client_cookies,
                &cookie::decode(request_cookie),
                response_set_cookie,
                &self.cookie_path,
            ) {
                replace_set_cookie(directives);
            }
        }

        acquisition
    }

    async fn acquire_from_store(&self) -> Result<Option<CookieSet>, AcquireError> {
        let Some(raw) = self.store.get(&self.account).await? else {
            debug!("no stored cookies for account");
            return Ok(None);
        };
        Ok(Some(cookie::decode_credential(&raw)?))
    }

    async fn acquire_from_operator(
        &self,
        guard: &PromptGuard<'_>,
        message: &str,
    ) -> Result<Option<CookieSet>, AcquireError> {
        let entered = guard.prompt(message).await?;
        let cleaned = strip_cookie_label(&entered);
        if cleaned.trim().is_empty() {
            info!("No cookies provided.");
            return Ok(None);
        }

        let cookies = cookie::decode_credential(&cleaned)?;
        self.store.set(&self.account, &cleaned).await?;
        info!(location = %self.store.describe(), "Successfully saved your cookie. Please refresh.");
        Ok(Some(cookies))
    }

    fn begin_flight(&self) -> Option<FlightGuard<'_>> {
        self.acquiring
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flag: &self.acquiring,
            })
    }

    fn replace_cache(&self, cookies: CookieSet) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(cookies));
    }

    fn missing_cookies_message(&self) -> String {
        format!(
            "\nNo stored cookies found for proxy target {}.\nCopy and paste your cookies to get authenticated:",
            self.account
        )
    }

    fn unauthorized_message(&self, request_path: &str) -> String {
        format!(
            "\nAuthentication failed for {base}{request_path}\n\n\
             You either haven't provided an auth cookie or it expired.\n\
             Please login to {target} and copy the HTTP cookie string here.\n\n\
             It will be securely stored in {location}:",
            base = self.target.trim_end_matches('/'),
            target = self.target,
            location = self.store.describe(),
        )
    }
}

impl fmt::Debug for CookieSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSession")
            .field("target", &self.target)
            .field("account", &self.account)
            .field("unauthorized", &self.unauthorized)
            .field("cookie_path", &self.cookie_path)
            .field("cached", &self.cached())
            .field("acquiring", &self.acquiring.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Builds the outbound `Cookie` header from `cached` and the client's header.
///
/// Cached cookies named by the client are left out; the rest are encoded ahead
/// of the client's header text, which is kept as sent. Cached cookies that
/// cannot be encoded are skipped. Returns `None` when nothing is injected.
#[must_use]
pub fn merge_outbound_cookie(cached: &CookieSet, incoming_cookie: Option<&str>) -> Option<String> {
    let client = cookie::decode(incoming_cookie);
    let mut pairs: Vec<String> = cached
        .iter()
        .filter(|(name, _)| !client.contains(name))
        .filter_map(|(name, value)| match cookie::encode_pair(name, value) {
            Ok(pair) => Some(pair),
            Err(error) => {
                warn!(cookie = name, error = %error, "Skipping cached cookie that cannot be sent upstream");
                None
            }
        })
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let incoming = incoming_cookie
        .map(|header| header.trim().trim_end_matches(';').trim())
        .filter(|header| !header.is_empty());
    if let Some(incoming) = incoming {
        pairs.push(incoming.to_string());
    }
    Some(pairs.join("; "))
}

/// Computes the `Set-Cookie` list after backfilling `client_cookies`.
///
/// A cookie is backfilled only when its name is in neither `request_cookies`
/// nor the origin's own `origin_set_cookie` directives. Returns `None` when
/// nothing needs to be added; otherwise the origin directives, unchanged and
/// in order, followed by one `name=value; Path=<path>` directive per
/// backfilled cookie.
#[must_use]
pub fn backfill_set_cookie<S: AsRef<str>>(
    client_cookies: &CookieSet,
    request_cookies: &CookieSet,
    origin_set_cookie: &[S],
    path: &str,
) -> Option<Vec<String>> {
    let (mut directives, origin_cookies) = cookie::decode_set_cookie(origin_set_cookie);
    let original_len = directives.len();

    for (name, value) in client_cookies.iter() {
        if request_cookies.contains(name) || origin_cookies.contains(name) {
            continue;
        }
        match cookie::serialize_set_cookie(name, value, path) {
            Ok(directive) => directives.push(directive),
            Err(error) => warn!(cookie = name, error = %error, "Skipping cookie that cannot be sent to the client"),
        }
    }

    (directives.len() > original_len).then_some(directives)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> CookieSet {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_merge_injects_cached_cookies_before_client_header() {
        let cached = set(&[("sid", "abc"), ("lang", "en")]);
        assert_eq!(
            merge_outbound_cookie(&cached, None).as_deref(),
            Some("sid=abc; lang=en")
        );
        assert_eq!(
            merge_outbound_cookie(&cached, Some("sid=zzz; theme=dark")).as_deref(),
            Some("lang=en; sid=zzz; theme=dark")
        );
    }

    #[test]
    fn test_merge_returns_none_when_client_names_every_cookie() {
        let cached = set(&[("sid", "abc")]);
        assert!(merge_outbound_cookie(&cached, Some("sid=client")).is_none());
    }

    #[test]
    fn test_merge_passes_client_pairs_through_verbatim() {
        let cached = set(&[("sid", "abc")]);
        assert_eq!(
            merge_outbound_cookie(&cached, Some("cart[1]=x; user=José;")).as_deref(),
            Some("sid=abc; cart[1]=x; user=José")
        );
    }

    #[test]
    fn test_merge_skips_cached_names_that_cannot_be_encoded() {
        let cached = set(&[("bad name", "x"), ("sid", "abc")]);
        assert_eq!(
            merge_outbound_cookie(&cached, Some("  ")).as_deref(),
            Some("sid=abc")
        );
        assert!(merge_outbound_cookie(&set(&[("bad name", "x")]), None).is_none());
    }

    #[test]
    fn test_backfill_skips_cookies_set_by_origin() {
        let cached = set(&[("token", "cached"), ("other", "val")]);
        let directives =
            backfill_set_cookie(&cached, &CookieSet::new(), &["token=xyz"], "/").unwrap();

        assert_eq!(
            directives,
            vec!["token=xyz".to_string(), "other=val; Path=/".to_string()]
        );
    }

    #[test]
    fn test_backfill_skips_cookies_sent_by_client() {
        let cached = set(&[("sid", "abc"), ("pref", "1")]);
        let request = set(&[("sid", "client")]);
        let directives = backfill_set_cookie(&cached, &request, &[] as &[&str], "/app").unwrap();
        assert_eq!(directives, vec!["pref=1; Path=/app".to_string()]);
    }

    #[test]
    fn test_backfill_returns_none_when_nothing_missing() {
        let cached = set(&[("sid", "abc")]);
        let request = set(&[("sid", "abc")]);
        assert!(backfill_set_cookie(&cached, &request, &["x=1"], "/").is_none());
        assert!(backfill_set_cookie(&CookieSet::new(), &request, &["x=1"], "/").is_none());
    }

    #[test]
    fn test_backfill_preserves_origin_attributes_and_order() {
        let cached = set(&[("c", "3")]);
        let origin = ["a=1; HttpOnly; Secure", "b=2; Max-Age=60; Path=/x"];
        let directives = backfill_set_cookie(&cached, &CookieSet::new(), &origin, "/").unwrap();
        assert_eq!(directives[0], "a=1; HttpOnly; Secure");
        assert_eq!(directives[1], "b=2; Max-Age=60; Path=/x");
        assert_eq!(directives[2], "c=3; Path=/");
    }

    #[test]
    fn test_backfill_skips_invalid_names() {
        let cached = set(&[("bad name", "x"), ("good", "y")]);
        let directives = backfill_set_cookie(&cached, &CookieSet::new(), &[] as &[&str], "/").unwrap();
        assert_eq!(directives, vec!["good=y; Path=/".to_string()]);
    }
}

//! Glue between cookie sessions and a reverse-proxy transport.
//!
//! A transport exposes interception points around each forwarded exchange.
//! [`SecureCookieProxy`] implements [`ProxyHooks`] for one target: it feeds
//! header maps into its [`CookieSession`] and then runs any hooks the caller
//! chained in through the options. [`Forwarder`] is a small `reqwest`-based
//! transport that drives those hooks.

mod forward;

pub use forward::{ForwardError, ForwardRequest, ForwardResponse, Forwarder};

use std::str::Utf8Error;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::StatusCode;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigError, PathRewrite, SecureCookieProxyOptions};
use crate::session::{AcquireOutcome, AcquisitionCoordinator, CookieSession};
use crate::store::CredentialStore;

/// Caller hook for outbound requests.
pub type RequestHook = Arc<dyn Fn(&mut OutboundRequest<'_>) + Send + Sync>;

/// Caller hook for inbound responses.
pub type ResponseHook = Arc<dyn Fn(&mut InboundResponse<'_>) + Send + Sync>;

/// A request about to be forwarded upstream.
#[derive(Debug)]
pub struct OutboundRequest<'a> {
    /// Headers that will be sent upstream.
    pub headers: &'a mut HeaderMap,
    /// Headers of the request the client sent to the proxy.
    pub client_headers: &'a HeaderMap,
    /// Path and query of the client request.
    pub path: &'a str,
}

/// An upstream response about to be returned to the client.
#[derive(Debug)]
pub struct InboundResponse<'a> {
    /// Upstream status code.
    pub status: StatusCode,
    /// Path and query of the client request.
    pub request_path: &'a str,
    /// Headers of the request the client sent to the proxy.
    pub client_headers: &'a HeaderMap,
    /// Headers that will be returned to the client.
    pub headers: &'a mut HeaderMap,
}

/// Interception points a transport calls for each exchange.
pub trait ProxyHooks: Send + Sync {
    /// Called before an HTTP request is forwarded.
    fn on_proxy_req(&self, request: &mut OutboundRequest<'_>);

    /// Called before a WebSocket upgrade request is forwarded.
    fn on_proxy_req_ws(&self, request: &mut OutboundRequest<'_>);

    /// Called before an upstream response is returned.
    fn on_proxy_res(&self, response: &mut InboundResponse<'_>);
}

/// Settings the transport applies itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTransportConfig {
    /// Upstream URL.
    pub target: String,
    /// Verify upstream TLS certificates.
    pub secure: bool,
    /// Rewrite the `Host` header to the target host.
    pub change_origin: bool,
    /// Proxy WebSocket upgrades.
    pub ws: bool,
    /// Cookie path rewrite, as configured.
    pub cookie_path_rewrite: Option<String>,
    /// Request path rewrite rules.
    pub path_rewrite: Vec<PathRewrite>,
    /// Remaining transport options.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Cookie-replaying proxy hooks for one upstream target.
pub struct SecureCookieProxy {
    session: Arc<CookieSession>,
    transport: ProxyTransportConfig,
    on_proxy_req: Option<RequestHook>,
    on_proxy_req_ws: Option<RequestHook>,
    on_proxy_res: Option<ResponseHook>,
    initial_load: Mutex<Option<JoinHandle<AcquireOutcome>>>,
}

impl SecureCookieProxy {
    /// Builds the hooks for one target and starts loading stored cookies.
    ///
    /// Setup does not wait for the store; use
    /// [`SecureCookieProxy::wait_initialized`] when that matters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid options or when called outside a
    /// Tokio runtime.
    pub fn build(
        options: impl Into<SecureCookieProxyOptions>,
        store: Arc<dyn CredentialStore>,
        coordinator: Arc<AcquisitionCoordinator>,
    ) -> Result<Self, ConfigError> {
        let options = options.into();
        let session = Arc::new(CookieSession::new(&options, store, coordinator)?);
        let initial_load = session.initialize();

        let transport = ProxyTransportConfig {
            target: options.target.clone(),
            secure: options.passthrough.secure,
            change_origin: options.passthrough.change_origin,
            ws: options.ws(),
            cookie_path_rewrite: options.cookie_path_rewrite.clone(),
            path_rewrite: options.passthrough.path_rewrite.clone(),
            extra: options.passthrough.extra.clone(),
        };
        info!(upstream = %transport.target, account = %session.account(), ws = transport.ws, "Configured secure cookie proxy");

        Ok(Self {
            session,
            transport,
            on_proxy_req: options.on_proxy_req,
            on_proxy_req_ws: options.on_proxy_req_ws,
            on_proxy_res: options.on_proxy_res,
            initial_load: Mutex::new(Some(initial_load)),
        })
    }

    /// Cookie session behind these hooks.
    #[must_use]
    pub fn session(&self) -> &Arc<CookieSession> {
        &self.session
    }

    /// Settings for the transport.
    #[must_use]
    pub fn transport(&self) -> &ProxyTransportConfig {
        &self.transport
    }

    /// Waits for the startup load from the store.
    ///
    /// Returns `None` once the result was already taken by an earlier call.
    pub async fn wait_initialized(&self) -> Option<AcquireOutcome> {
        let handle = self
            .initial_load
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                warn!(error = %error, "Initial cookie load task failed");
                None
            }
        }
    }

    fn add_cookie(&self, request: &mut OutboundRequest<'_>) {
        let incoming = match joined_cookie_header(request.client_headers) {
            Ok(incoming) => incoming,
            Err(error) => {
                warn!(error = %error, "Client Cookie header is not UTF-8; forwarding request unchanged");
                // Still request cookies when none are cached; never touch the header.
                self.session.decorate_outbound_request(None, |_| {});
                return;
            }
        };
        let headers = &mut *request.headers;
        self.session
            .decorate_outbound_request(incoming.as_deref(), |header| {
                match HeaderValue::from_str(&header) {
                    Ok(value) => {
                        headers.insert(COOKIE, value);
                    }
                    Err(error) => warn!(error = %error, "Merged cookie header is not a valid header value"),
                }
            });
    }
}

impl ProxyHooks for SecureCookieProxy {
    fn on_proxy_req(&self, request: &mut OutboundRequest<'_>) {
        self.add_cookie(request);
        if let Some(hook) = &self.on_proxy_req {
            hook(request);
        }
    }

    fn on_proxy_req_ws(&self, request: &mut OutboundRequest<'_>) {
        self.add_cookie(request);
        if let Some(hook) = &self.on_proxy_req_ws {
            hook(request);
        }
    }

    fn on_proxy_res(&self, response: &mut InboundResponse<'_>) {
        let request_cookie = lossy_cookie_header(response.client_headers);
        // Only names are read from the origin directives; the header values
        // themselves stay in the map untouched.
        let origin: Vec<String> = response
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();

        let headers = &mut *response.headers;
        self.session.decorate_inbound_response(
            response.status.as_u16(),
            response.request_path,
            request_cookie.as_deref(),
            &origin,
            |directives| append_set_cookie(headers, directives.iter().skip(origin.len())),
        );

        if let Some(hook) = &self.on_proxy_res {
            hook(response);
        }
    }
}

impl std::fmt::Debug for SecureCookieProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureCookieProxy")
            .field("session", &self.session)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// All `Cookie` header values joined into one header string.
///
/// HTTP/2 clients may split cookies over several header fields. Fails when a
/// field is not UTF-8, since the joined text replaces the client's header.
fn joined_cookie_header(headers: &HeaderMap) -> Result<Option<String>, Utf8Error> {
    let values = headers
        .get_all(COOKIE)
        .iter()
        .map(|value| std::str::from_utf8(value.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((!values.is_empty()).then(|| values.join("; ")))
}

/// Like [`joined_cookie_header`], replacing invalid UTF-8. Used for name lookups only.
fn lossy_cookie_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<_> = headers
        .get_all(COOKIE)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()))
        .collect();
    (!values.is_empty()).then(|| values.join("; "))
}

fn append_set_cookie<'a>(headers: &mut HeaderMap, directives: impl Iterator<Item = &'a String>) {
    for directive in directives {
        match HeaderValue::from_str(directive) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(error) => warn!(error = %error, "Dropping Set-Cookie directive that is not a valid header value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_cookie_header_merges_split_fields() {
        let mut headers = HeaderMap::new();
        assert!(joined_cookie_header(&headers).unwrap().is_none());

        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("b=2"));
        assert_eq!(
            joined_cookie_header(&headers).unwrap().as_deref(),
            Some("a=1; b=2")
        );
    }

    #[test]
    fn test_joined_cookie_header_keeps_utf8_and_rejects_invalid_bytes() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_bytes("user=José".as_bytes()).unwrap());
        assert_eq!(
            joined_cookie_header(&headers).unwrap().as_deref(),
            Some("user=José")
        );

        headers.append(COOKIE, HeaderValue::from_bytes(b"bad=\xff").unwrap());
        assert!(joined_cookie_header(&headers).is_err());
        assert!(lossy_cookie_header(&headers).unwrap().starts_with("user=José; bad="));
    }

    #[test]
    fn test_append_set_cookie_keeps_existing_values() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_bytes("name=José".as_bytes()).unwrap());

        let added = ["other=val; Path=/".to_string()];
        append_set_cookie(&mut headers, added.iter());

        let values: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.as_bytes().to_vec())
            .collect();
        assert_eq!(
            values,
            vec!["name=José".as_bytes().to_vec(), b"other=val; Path=/".to_vec()]
        );
    }
}

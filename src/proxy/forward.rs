//! Minimal buffered HTTP forwarder built on `reqwest`.
//!
//! Forwards one fully-read client request to the target and returns the fully
//! read upstream response, running [`ProxyHooks`] on both sides. Intended for
//! embedding the cookie proxy in simple development servers; streaming and
//! WebSocket upgrades are left to richer transports.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use tracing::{debug, instrument};

use super::{InboundResponse, OutboundRequest, ProxyHooks, SecureCookieProxy};
use crate::config::ConfigError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers scoped to a single connection; never forwarded.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Errors produced while forwarding a request.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The HTTP client could not be constructed.
    #[error("failed to build upstream HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// A path rewrite rule failed to compile.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The upstream request failed.
    #[error("upstream request to {url} failed: {source}")]
    Upstream {
        /// URL that was requested.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The upstream response body could not be read.
    #[error("failed to read upstream response body from {url}: {source}")]
    Body {
        /// URL that was requested.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
}

/// A buffered client request.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// Request method.
    pub method: Method,
    /// Path and query, starting with `/`.
    pub path: String,
    /// Client request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Vec<u8>,
}

impl ForwardRequest {
    /// A body-less `GET` for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Adds a client header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// A buffered upstream response, after the response hook ran.
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    /// Upstream status.
    pub status: StatusCode,
    /// Headers to return to the client.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

/// Forwards requests to one cookie proxy's target.
#[derive(Debug)]
pub struct Forwarder {
    proxy: Arc<SecureCookieProxy>,
    client: reqwest::Client,
    rewrites: Vec<(Regex, String)>,
}

impl Forwarder {
    /// Creates a forwarder for `proxy`, honoring its transport settings.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError`] when the HTTP client cannot be built or a path
    /// rewrite pattern is invalid.
    pub fn new(proxy: Arc<SecureCookieProxy>) -> Result<Self, ForwardError> {
        let transport = proxy.transport();
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!transport.secure)
            .build()
            .map_err(ForwardError::Client)?;

        let rewrites = transport
            .path_rewrite
            .iter()
            .map(|rule| {
                Regex::new(&rule.from)
                    .map(|pattern| (pattern, rule.to.clone()))
                    .map_err(|source| ConfigError::InvalidPathRewrite {
                        pattern: rule.from.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            proxy,
            client,
            rewrites,
        })
    }

    /// Applies the path rewrite rules in order.
    #[must_use]
    pub fn rewrite_path(&self, path: &str) -> String {
        self.rewrites
            .iter()
            .fold(path.to_string(), |current, (pattern, replacement)| {
                pattern.replace(&current, replacement.as_str()).into_owned()
            })
    }

    /// Forwards `request` upstream and returns the client-facing response.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError`] when the upstream exchange fails.
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse, ForwardError> {
        let transport = self.proxy.transport();
        let url = format!(
            "{}{}",
            transport.target.trim_end_matches('/'),
            self.rewrite_path(&request.path)
        );

        let mut outbound = strip_hop_by_hop(&request.headers);
        if transport.change_origin {
            outbound.remove(header::HOST);
        }
        self.proxy.on_proxy_req(&mut OutboundRequest {
            headers: &mut outbound,
            client_headers: &request.headers,
            path: &request.path,
        });

        debug!(url = %url, "forwarding request upstream");
        let upstream = self
            .client
            .request(request.method.clone(), &url)
            .headers(outbound)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|source| ForwardError::Upstream {
                url: url.clone(),
                source,
            })?;

        let status = upstream.status();
        let mut headers = strip_hop_by_hop(upstream.headers());
        let body = upstream
            .bytes()
            .await
            .map_err(|source| ForwardError::Body {
                url: url.clone(),
                source,
            })?
            .to_vec();

        self.proxy.on_proxy_res(&mut InboundResponse {
            status,
            request_path: &request.path,
            client_headers: &request.headers,
            headers: &mut headers,
        });

        Ok(ForwardResponse {
            status,
            headers,
            body,
        })
    }
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut stripped = headers.clone();
    for name in &HOP_BY_HOP {
        stripped.remove(name);
    }
    stripped.remove("keep-alive");
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_hop_by_hop_keeps_end_to_end_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let stripped = strip_hop_by_hop(&headers);
        assert!(stripped.get(header::CONNECTION).is_none());
        assert!(stripped.get("keep-alive").is_none());
        assert_eq!(stripped.get(header::COOKIE).unwrap(), "a=1");
        assert_eq!(stripped.get(header::ACCEPT).unwrap(), "*/*");
    }
}

//! Secure Cookie Proxy Library
//!
//! Keeps upstream authentication cookies alive across a local development
//! reverse proxy: cookies captured once (from the keychain, a cookie file, or
//! the operator's terminal) are injected into forwarded requests and backfilled
//! into responses so the browser can use them too.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`cookie`] - Cookie sets and `Cookie` / `Set-Cookie` header codecs
//! - [`store`] - Credential storage backends (keychain, cookie files)
//! - [`prompt`] - Interactive cookie entry
//! - [`session`] - Per-target cookie lifecycle and the shared prompt lock
//! - [`config`] - Per-target options and transport pass-through settings
//! - [`proxy`] - Proxy hook glue and a reference `reqwest` forwarder

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cookie;
pub mod prompt;
pub mod proxy;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::{
    ConfigError, CookieRewrite, PassthroughOptions, PathRewrite, SecureCookieProxyOptions,
    StatusCodes, derive_account,
};
pub use cookie::{CodecError, CookieSet};
pub use prompt::{PromptError, SecretPrompt, TerminalPrompt, strip_cookie_label};
pub use proxy::{
    ForwardError, ForwardRequest, ForwardResponse, Forwarder, InboundResponse, OutboundRequest,
    ProxyHooks, ProxyTransportConfig, SecureCookieProxy,
};
pub use session::{
    AcquireError, AcquireOutcome, AcquisitionCoordinator, CookieSession, SkipReason,
    backfill_set_cookie, merge_outbound_cookie,
};
pub use store::{CredentialStore, FileStore, KeychainStore, StoreBackend, StoreError, open_store};

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_SOCKETS_ENV: &str = "SECURE_COOKIE_PROXY_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_SOCKETS_ENV)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a wiremock upstream, or returns `None` when the sandbox forbids
/// binding localhost sockets (panics instead when sockets are required).
#[track_caller]
pub fn start_upstream_or_skip() -> impl Future<Output = Option<MockServer>> {
    let can_bind = TcpListener::bind("127.0.0.1:0").is_ok();
    if !can_bind {
        let location = Location::caller();
        let message = format!(
            "[socket-bound-test] cannot bind a localhost socket for the mock upstream at {}:{}",
            location.file(),
            location.line()
        );
        assert!(
            !sockets_required(),
            "{message}. Unset {REQUIRE_SOCKETS_ENV} to allow skipping."
        );
        eprintln!("{message}. Skipping test. Set {REQUIRE_SOCKETS_ENV}=1 to fail instead.");
    }

    async move {
        if can_bind {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}

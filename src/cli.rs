//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use secure_cookie_proxy::StoreBackend;

/// Manage the cookies a secure cookie proxy replays to upstream targets.
#[derive(Parser, Debug)]
#[command(name = "secure-cookie-proxy")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the credential account derived for a target
    Account {
        /// Upstream target URL
        target: String,
    },
    /// Capture or clear stored cookies
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Prompt for a cookie string and store it for the target
    Capture(StoreArgs),
    /// Remove the stored cookie string for the target
    Clear(StoreArgs),
}

#[derive(ClapArgs, Debug)]
pub struct StoreArgs {
    /// Upstream target URL
    pub target: String,

    /// Credential account (defaults to the target without its scheme)
    #[arg(long)]
    pub account: Option<String>,

    /// Storage backend: auto, keychain or file
    #[arg(long, default_value_t = StoreBackend::Auto)]
    pub backend: StoreBackend,

    /// Cookie directory for the file backend (default: ./.proxy-cookies)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_account_subcommand_parses() {
        let args = Args::try_parse_from(["secure-cookie-proxy", "account", "https://example.com"])
            .unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(matches!(args.command, Command::Account { target } if target == "https://example.com"));
    }

    #[test]
    fn test_cli_auth_capture_defaults() {
        let args =
            Args::try_parse_from(["secure-cookie-proxy", "auth", "capture", "https://example.com"])
                .unwrap();
        let Command::Auth(AuthCommand::Capture(store)) = args.command else {
            panic!("expected auth capture");
        };
        assert_eq!(store.backend, StoreBackend::Auto);
        assert!(store.account.is_none());
        assert!(store.dir.is_none());
    }

    #[test]
    fn test_cli_auth_clear_with_overrides() {
        let args = Args::try_parse_from([
            "secure-cookie-proxy",
            "-vv",
            "auth",
            "clear",
            "https://example.com",
            "--account",
            "shared",
            "--backend",
            "file",
            "--dir",
            "/tmp/cookies",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        let Command::Auth(AuthCommand::Clear(store)) = args.command else {
            panic!("expected auth clear");
        };
        assert_eq!(store.account.as_deref(), Some("shared"));
        assert_eq!(store.backend, StoreBackend::File);
        assert_eq!(store.dir, Some(PathBuf::from("/tmp/cookies")));
    }

    #[test]
    fn test_cli_rejects_unknown_backend() {
        let result = Args::try_parse_from([
            "secure-cookie-proxy",
            "auth",
            "clear",
            "https://example.com",
            "--backend",
            "vault",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["secure-cookie-proxy", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}

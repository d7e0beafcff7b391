//! Auth command handlers: capture and clear stored proxy cookies.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use secure_cookie_proxy::{
    AcquireOutcome, AcquisitionCoordinator, CookieSession, SecureCookieProxyOptions, open_store,
};
use tracing::info;

use crate::cli::StoreArgs;

pub fn run_account_command(target: &str) -> Result<()> {
    let options = SecureCookieProxyOptions::from(target);
    options
        .validate()
        .map_err(|error| anyhow!("Invalid target: {error}"))?;
    println!("{}", options.account());
    Ok(())
}

pub async fn run_auth_capture_command(args: &StoreArgs) -> Result<()> {
    let options = options_for(args)?;
    let store = open_store(args.backend, args.dir.clone())
        .await
        .map_err(|error| anyhow!("Failed to open cookie storage: {error}"))?;
    let location = store.describe();
    let coordinator = Arc::new(AcquisitionCoordinator::terminal());
    let session = CookieSession::new(&options, store, coordinator)
        .map_err(|error| anyhow!("Invalid proxy options: {error}"))?;

    info!("Cookie capture for {}", options.target);
    info!("1. Log into {} in your browser.", options.target);
    info!("2. Open the developer tools network tab and select any request to the site.");
    info!("3. Copy the value of the `Cookie` request header.");

    let message = format!(
        "Paste the HTTP cookie string for {}. It will be stored in {location}:",
        options.target
    );
    match session.acquire(Some(&message)).await {
        AcquireOutcome::Resolved { cookies } => {
            info!(account = %session.account(), cookies, "Cookies captured");
            Ok(())
        }
        AcquireOutcome::NoInput => bail!("No cookie input provided"),
        AcquireOutcome::Failed(error) => Err(anyhow!("Cookie capture failed: {error}")),
        other => bail!("Cookie capture did not complete: {other:?}"),
    }
}

pub async fn run_auth_clear_command(args: &StoreArgs) -> Result<()> {
    let options = options_for(args)?;
    let account = options.account();
    let store = open_store(args.backend, args.dir.clone())
        .await
        .map_err(|error| anyhow!("Failed to open cookie storage: {error}"))?;

    let removed = store
        .delete(&account)
        .await
        .map_err(|error| anyhow!("Failed to clear stored cookies: {error}"))?;

    if removed {
        info!(account = %account, location = %store.describe(), "Cleared stored proxy cookies");
    } else {
        info!(account = %account, "No stored proxy cookies found");
    }

    Ok(())
}

fn options_for(args: &StoreArgs) -> Result<SecureCookieProxyOptions> {
    let mut options = SecureCookieProxyOptions::from(args.target.as_str());
    options.keychain_account.clone_from(&args.account);
    options
        .validate()
        .map_err(|error| anyhow!("Invalid proxy options: {error}"))?;
    Ok(options)
}

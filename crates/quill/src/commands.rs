//! CLI command handlers: login, logout, whoami, and wakeup

use std::io;

use anyhow::{bail, Result};
use console::style;
use dialoguer::Select;
use tracing::info;

use crate::auth::{
    DeviceAuthClient, DevicePoller, PollError, TokenRecord, TokenStore, TokioSleeper,
};
use crate::chat::{self, Session};
use crate::config::Config;

/// Run the device-authorization flow and store the resulting token.
pub async fn login(config: &Config) -> Result<()> {
    let store = TokenStore::new()?;

    if let Some(record) = store.load() {
        if !record.is_expired() {
            let redo = chat::confirm(
                "You are already logged in. Do you want to re-authenticate?",
                false,
            )?;
            if !redo {
                println!("{}", style("Keeping the current session.").dim());
                return Ok(());
            }
        }
    }

    let client = DeviceAuthClient::new(&config.auth.server_url, &config.auth.client_id)?;
    let code = client.request_device_code().await?;
    info!(
        "Device authorization started against {}",
        config.auth.server_url
    );

    println!();
    println!(
        "Visit {} and enter the code below to authorize this device.",
        style(&code.verification_uri).blue().underlined()
    );
    println!("Your code: {}", style(&code.user_code).yellow().bold());
    println!();

    if chat::confirm("Open the verification page in your browser?", true)? {
        let target = code
            .verification_uri_complete
            .as_deref()
            .unwrap_or(&code.verification_uri);
        if let Err(e) = open::that(target) {
            println!(
                "{}",
                style(format!("Could not open the browser: {e}")).yellow()
            );
        }
    }

    let spinner = chat::thinking_spinner(&format!(
        "Waiting for authorization (expires in {} minutes)...",
        code.expires_in / 60
    ));
    let mut poller = DevicePoller::new(client, TokioSleeper, u64::from(code.interval));
    let outcome = poller.run(&code.device_code).await;
    spinner.finish_and_clear();

    let grant = match outcome {
        Ok(grant) => grant,
        Err(PollError::Denied) => bail!("Authorization was denied. No token was saved."),
        Err(PollError::Expired) => {
            bail!("The device code expired before authorization completed. Run login again.")
        }
        Err(PollError::Fatal(message)) => bail!("Device authorization failed: {message}"),
    };

    let record = TokenRecord::from_grant(grant);
    store.save(&record)?;
    info!("Login completed, token stored");

    println!();
    println!("{}", style("Login successful!").green().bold());
    print_expiry(&record);
    Ok(())
}

/// Remove the stored token after confirmation.
pub fn logout() -> Result<()> {
    let store = TokenStore::new()?;

    if store.load().is_none() {
        println!("{}", style("You are not logged in.").yellow());
        return Ok(());
    }

    if !chat::confirm("Are you sure you want to log out?", false)? {
        println!("{}", style("Logout cancelled.").dim());
        return Ok(());
    }

    store.clear()?;
    println!(
        "{}",
        style("Logged out. The stored token was removed.").green()
    );
    Ok(())
}

/// Show the authenticated user's identity and token expiry.
pub async fn whoami(config: &Config) -> Result<()> {
    let store = TokenStore::new()?;
    let record = require_token(&store)?;

    let client = DeviceAuthClient::new(&config.auth.server_url, &config.auth.client_id)?;
    let user = client.fetch_userinfo(&record.access_token).await?;

    println!("{} {}", style("User ID:").cyan().bold(), user.id);
    println!("{} {}", style("Name:").cyan().bold(), user.name);
    println!("{} {}", style("Email:").cyan().bold(), user.email);
    print_expiry(&record);
    Ok(())
}

/// Greet the user and dispatch into one of the interactive chat modes.
pub async fn wakeup(config: &Config) -> Result<()> {
    let store = TokenStore::new()?;
    let record = require_token(&store)?;

    let client = DeviceAuthClient::new(&config.auth.server_url, &config.auth.client_id)?;
    let spinner = chat::thinking_spinner("Fetching user information...");
    let user = client.fetch_userinfo(&record.access_token).await;
    spinner.finish_and_clear();
    let user = user?;

    println!(
        "{}",
        style(format!(
            "Welcome back, {}! Your AI service is awake.",
            user.name
        ))
        .green()
    );

    let api_key = match config.model.api_key.clone() {
        Some(key) => key,
        None => match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!(
                "No model API key configured. Set ANTHROPIC_API_KEY or add api_key \
                 to the [model] section of your config."
            ),
        },
    };

    let session = Session::new(config.clone(), user, api_key)?;

    let modes = ["Chat", "Tools", "Agentic mode"];
    let choice = match Select::new()
        .with_prompt("Choose an AI interaction mode")
        .items(&modes)
        .default(0)
        .interact()
    {
        Ok(index) => index,
        Err(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::Interrupted => {
            println!("{}", style("Cancelled.").yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match choice {
        0 => chat::run_chat_session(&session, None).await,
        1 => chat::run_tool_session(&session, None).await,
        _ => chat::run_agent_session(&session, None).await,
    }
}

/// Load the stored token, failing with a login hint when absent or stale
fn require_token(store: &TokenStore) -> Result<TokenRecord> {
    let Some(record) = store.load() else {
        bail!("You are not logged in. Run `quill login` first.");
    };
    if record.is_expired() {
        bail!("Your session has expired. Run `quill login` to sign in again.");
    }
    Ok(record)
}

fn print_expiry(record: &TokenRecord) {
    if let Some(expires_at) = record.expires_at {
        println!(
            "{}",
            style(format!(
                "Token expires at {}",
                expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            ))
            .dim()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenGrant;
    use tempfile::tempdir;

    fn grant(expires_in: Option<u64>) -> TokenGrant {
        TokenGrant {
            access_token: "tok".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            scope: None,
            expires_in,
        }
    }

    #[test]
    fn test_require_token_reports_missing_login() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("token.json"));

        let err = require_token(&store).unwrap_err();
        assert!(err.to_string().contains("not logged in"));
    }

    #[test]
    fn test_require_token_reports_expired_session() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("token.json"));
        // One minute of validity is inside the expiry buffer
        store
            .save(&TokenRecord::from_grant(grant(Some(60))))
            .unwrap();

        let err = require_token(&store).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_require_token_returns_fresh_record() {
        let dir = tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("token.json"));
        store
            .save(&TokenRecord::from_grant(grant(Some(3600))))
            .unwrap();

        let record = require_token(&store).unwrap();
        assert_eq!(record.access_token, "tok");
    }
}

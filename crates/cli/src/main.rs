//! glowctl — command-line client for the Luma lighting cloud
//!
//! This binary is the composition root: it reads the environment once,
//! initializes tracing, and dispatches to the authentication subsystem.
//! The Luma resource commands (lights, scenes) attach on top of the
//! authenticated handle produced by `login`.

mod config;

use anyhow::{Context, Result};
use common::Secret;
use luma_auth::constants::EXPIRY_BUFFER_MINUTES;
use luma_auth::{Authenticator, CredentialStore};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing with LOG_LEVEL / RUST_LOG support, quiet by default for a CLI
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_default();

    match command.as_str() {
        "login" => login().await,
        "logout" => logout().await,
        "status" => status().await,
        "" | "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            anyhow::bail!("unknown command: {other}")
        }
    }
}

fn print_usage() {
    println!(
        "glowctl — Luma lighting cloud CLI\n\n\
         Usage: glowctl <command>\n\n\
         Commands:\n  \
         login    Sign in to Luma (opens your browser)\n  \
         logout   Remove stored credentials\n  \
         status   Show sign-in state and token expiry\n\n\
         Environment:\n  \
         GLOWCTL_CLIENT_ID         OAuth client identifier (required for login)\n  \
         GLOWCTL_CLIENT_SECRET     OAuth client secret (required for login)\n  \
         GLOWCTL_CALLBACK_PORT     Loopback port for the login redirect (default 8719)\n  \
         GLOWCTL_CREDENTIALS_PATH  Credential file (default ~/.glowctl/credentials.json)"
    );
}

async fn login() -> Result<()> {
    let auth_config =
        config::auth_config_from_env().context("loading configuration from environment")?;
    let authenticator = Authenticator::new(auth_config);

    let handle = authenticator.authenticate().await?;
    println!("Signed in to Luma (scopes: {})", handle.scope());
    Ok(())
}

async fn logout() -> Result<()> {
    let store = CredentialStore::new(config::credentials_path_from_env());
    store.delete().await.context("removing credential file")?;
    println!("Signed out; local credentials removed.");
    Ok(())
}

async fn status() -> Result<()> {
    let store = CredentialStore::new(config::credentials_path_from_env());
    match store.load().await {
        Some(credential) => {
            let token = Secret::new(credential.access_token.clone());
            println!("Signed in to Luma (token {})", token.preview());
            println!("Scopes: {}", credential.scope);
            if credential.is_expiring(EXPIRY_BUFFER_MINUTES) {
                println!("Access token is expiring; the next command will refresh it.");
            } else {
                let now_ms = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                let remaining_min = credential.expires_at.saturating_sub(now_ms) / 60_000;
                println!("Access token valid for about {remaining_min} min.");
            }
        }
        None => println!("Not signed in. Run `glowctl login`."),
    }
    Ok(())
}

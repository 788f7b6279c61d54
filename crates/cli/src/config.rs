//! Environment-backed configuration for the glowctl binary
//!
//! The environment is read exactly once, here, at startup. Everything
//! below this layer takes an explicit `AuthConfig` — no env reads deep in
//! the call stack.

use std::path::PathBuf;

use common::Secret;
use luma_auth::AuthConfig;
use luma_auth::constants::{
    ENV_CALLBACK_PORT, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_CREDENTIALS_PATH,
};

/// Build the auth configuration from the environment.
///
/// Client id and secret are required (they come from glowctl's
/// registration with Luma); callback port and credential path are
/// optional overrides.
pub fn auth_config_from_env() -> common::Result<AuthConfig> {
    let client_id = require_env(ENV_CLIENT_ID)?;
    let client_secret = require_env(ENV_CLIENT_SECRET)?;
    let mut config = AuthConfig::new(client_id, Secret::new(client_secret));

    if let Some(port) = optional_env(ENV_CALLBACK_PORT) {
        config.callback_port = port.parse().map_err(|_| {
            common::Error::Config(format!("{ENV_CALLBACK_PORT} must be a port number, got {port}"))
        })?;
    }
    if let Some(path) = optional_env(ENV_CREDENTIALS_PATH) {
        config.credentials_path = PathBuf::from(path);
    }

    Ok(config)
}

/// Resolve the credential file path alone.
///
/// `status` and `logout` only touch the local file, so they must not
/// demand the OAuth client identity.
pub fn credentials_path_from_env() -> PathBuf {
    optional_env(ENV_CREDENTIALS_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(AuthConfig::default_credentials_path)
}

fn require_env(key: &str) -> common::Result<String> {
    optional_env(key).ok_or_else(|| common::Error::Config(format!("{key} must be set")))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

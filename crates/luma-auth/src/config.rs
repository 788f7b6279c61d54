//! Authentication configuration
//!
//! All entry points in this crate take an explicit [`AuthConfig`] rather
//! than reading the environment ad hoc. The composition root (the glowctl
//! binary) reads env vars once at startup and builds one of these.

use std::path::PathBuf;
use std::time::Duration;

use common::Secret;

use crate::constants::{
    AUTHORIZE_ENDPOINT, CREDENTIALS_FILE, DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT_SECS,
    EXPIRY_BUFFER_MINUTES, REDIRECT_PATH, SCOPES, TOKEN_ENDPOINT,
};

/// Configuration for the authentication subsystem.
///
/// Endpoint and path fields default to the Luma cloud values from
/// [`crate::constants`]; tests point them at local stubs.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client identifier (from glowctl's registration with Luma)
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: Secret<String>,
    /// Provider authorization endpoint (opened in the browser)
    pub authorize_endpoint: String,
    /// Provider token endpoint (code exchange and refresh)
    pub token_endpoint: String,
    /// Space-separated scopes to request
    pub scopes: String,
    /// Loopback port for the redirect listener
    pub callback_port: u16,
    /// Path component of the redirect URI
    pub redirect_path: String,
    /// Where the credential file lives
    pub credentials_path: PathBuf,
    /// How long to wait for the browser redirect
    pub callback_timeout: Duration,
    /// Minutes before expiry at which a token counts as expiring
    pub expiry_buffer_minutes: u64,
}

impl AuthConfig {
    /// Build a config with Luma defaults for everything but the client
    /// identity.
    pub fn new(client_id: impl Into<String>, client_secret: Secret<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            authorize_endpoint: AUTHORIZE_ENDPOINT.into(),
            token_endpoint: TOKEN_ENDPOINT.into(),
            scopes: SCOPES.into(),
            callback_port: DEFAULT_CALLBACK_PORT,
            redirect_path: REDIRECT_PATH.into(),
            credentials_path: Self::default_credentials_path(),
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
            expiry_buffer_minutes: EXPIRY_BUFFER_MINUTES,
        }
    }

    /// Default credential file location: `~/.glowctl/credentials.json`.
    /// Falls back to the current directory when no home dir is resolvable
    /// (containers, odd service environments).
    pub fn default_credentials_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".glowctl")
            .join(CREDENTIALS_FILE)
    }

    /// The loopback redirect URI sent to the provider. Must be byte-identical
    /// in the authorization request and the code exchange.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://127.0.0.1:{}{}",
            self.callback_port, self.redirect_path
        )
    }
}

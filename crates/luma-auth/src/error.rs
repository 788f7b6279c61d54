//! Error types for OAuth authentication operations
//!
//! The taxonomy is deliberately closed: the listener and token layers only
//! produce [`Error`] variants, and the orchestrator matches on them
//! exhaustively. Callers outside this crate see a single
//! [`AuthenticationError`] carrying the originating cause.

use std::fmt;
use std::time::Duration;

/// Errors from OAuth authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No terminal redirect request arrived within the timeout
    #[error("no authorization callback received within {0:?}")]
    CallbackTimeout(Duration),

    /// CSRF state mismatch — fatal to the current attempt, never retried
    #[error("callback state does not match the value sent to the provider (possible CSRF)")]
    StateMismatch,

    /// Provider-reported denial, or malformed redirect parameters
    #[error("OAuth callback error: {error}: {description}")]
    Callback { error: String, description: String },

    /// Token refresh failed; converted into an interactive-flow fallback
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The only error type crossing the orchestrator's public boundary.
///
/// Wraps the failure that ended the attempt. When a token refresh failed
/// earlier in the same call and the interactive fallback then failed too,
/// the refresh cause is retained so it is not lost from diagnostics.
#[derive(Debug)]
pub struct AuthenticationError {
    cause: Error,
    refresh_cause: Option<Error>,
}

impl AuthenticationError {
    pub(crate) fn new(cause: Error) -> Self {
        Self {
            cause,
            refresh_cause: None,
        }
    }

    pub(crate) fn with_refresh_cause(cause: Error, refresh_cause: Option<Error>) -> Self {
        Self {
            cause,
            refresh_cause,
        }
    }

    /// The failure that ended the attempt.
    pub fn cause(&self) -> &Error {
        &self.cause
    }

    /// The refresh failure that preceded the interactive fallback, if any.
    pub fn refresh_cause(&self) -> Option<&Error> {
        self.refresh_cause.as_ref()
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication failed: {}", self.cause)?;
        if let Some(refresh) = &self.refresh_cause {
            write!(f, " (after earlier {refresh})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AuthenticationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

impl From<Error> for AuthenticationError {
    fn from(cause: Error) -> Self {
        Self::new(cause)
    }
}

//! Luma OAuth authentication library
//!
//! Obtains and maintains delegated access to the Luma cloud API for a
//! local interactive user: PKCE parameter generation, a single-shot
//! loopback redirect listener, on-disk credential persistence, and an
//! orchestrator that sequences load → reuse/refresh → interactive
//! consent → persist. Standalone library with no dependency on the
//! glowctl binary.
//!
//! Credential flow:
//! 1. [`Authenticator::authenticate`] loads stored credentials
//! 2. Fresh credentials are adopted directly; expiring ones are refreshed
//! 3. Otherwise `pkce` generates verifier/challenge/state and the system
//!    browser opens [`pkce::build_authorization_url`]
//! 4. [`RedirectListener`] captures the authorization code on loopback
//! 5. [`token::exchange_code`] trades the code (plus verifier) for tokens
//! 6. [`CredentialStore`] persists the record for the next invocation

pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod listener;
pub mod pkce;
pub mod token;

pub use config::AuthConfig;
pub use credentials::{CredentialSet, CredentialStore};
pub use error::{AuthenticationError, Error, Result};
pub use flow::{AuthHandle, Authenticator, BrowserLauncher};
pub use listener::{CallbackResult, RedirectListener};
pub use token::TokenResponse;

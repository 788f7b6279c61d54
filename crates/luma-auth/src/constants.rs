//! Luma cloud OAuth constants
//!
//! Public OAuth client configuration for the Luma lighting cloud. The
//! client identifier and secret are owned by glowctl's registration with
//! Luma and arrive via the environment — they are not generated here. The
//! actual secrets (access/refresh tokens) are managed by the credential
//! store.

/// Authorization endpoint opened in the user's browser
pub const AUTHORIZE_ENDPOINT: &str = "https://auth.lumacloud.io/oauth2/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://auth.lumacloud.io/oauth2/token";

/// Token revocation endpoint. Documented for completeness; glowctl does not
/// call it — logout only deletes the local credential file.
pub const REVOKE_ENDPOINT: &str = "https://auth.lumacloud.io/oauth2/revoke";

/// OAuth scopes required for light and scene access
pub const SCOPES: &str = "lights:read lights:write scenes:read";

/// Path the provider redirects back to on the loopback listener
pub const REDIRECT_PATH: &str = "/callback";

/// Default loopback port for the redirect listener.
/// `http://127.0.0.1:8719/callback` must match a redirect URI registered
/// with Luma, so the port is fixed unless overridden via
/// [`ENV_CALLBACK_PORT`].
pub const DEFAULT_CALLBACK_PORT: u16 = 8719;

/// Minutes before expiry at which a token counts as expiring
pub const EXPIRY_BUFFER_MINUTES: u64 = 5;

/// Default wait for the browser redirect before giving up
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

/// Credential file name under the per-user dot-directory (`~/.glowctl/`)
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Env var overriding the redirect listener port
pub const ENV_CALLBACK_PORT: &str = "GLOWCTL_CALLBACK_PORT";

/// Env var overriding the credential file path
pub const ENV_CREDENTIALS_PATH: &str = "GLOWCTL_CREDENTIALS_PATH";

/// Env var carrying the OAuth client identifier
pub const ENV_CLIENT_ID: &str = "GLOWCTL_CLIENT_ID";

/// Env var carrying the OAuth client secret
pub const ENV_CLIENT_SECRET: &str = "GLOWCTL_CLIENT_SECRET";

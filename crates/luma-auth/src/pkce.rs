//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier and S256 challenge used during the OAuth
//! authorization flow, plus the CSRF state token bound to a single attempt.
//! The verifier stays in memory for the duration of one flow and is sent
//! during token exchange; the challenge is included in the authorization
//! URL so the authorization server can verify the exchange request came
//! from the same party that initiated the flow. Nothing here does I/O or
//! touches shared state.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::config::AuthConfig;

/// Generate a cryptographically random PKCE code verifier.
///
/// Produces a 32-byte random value encoded as URL-safe base64 (no padding),
/// yielding 43 characters — the bottom of RFC 7636's 43-128 legal range.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
///
/// Deterministic: the authorization server recomputes this from the
/// verifier sent during token exchange and compares it against the
/// challenge from the authorization URL.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate the CSRF state token for one authorization attempt.
///
/// 24 random bytes encoded as URL-safe base64, 32 characters. The provider
/// echoes it back unchanged in the redirect; the listener rejects any
/// callback whose state differs.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the full authorization URL with all required OAuth parameters.
///
/// `access_type=offline` requests a refresh token; `prompt=consent` forces
/// re-consent so the provider issues one even when the user authorized
/// before.
pub fn build_authorization_url(config: &AuthConfig, state: &str, challenge: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&code_challenge={}&code_challenge_method=S256&access_type=offline&prompt=consent&state={}",
        config.authorize_endpoint,
        config.client_id,
        urlencoded(&config.redirect_uri()),
        urlencoded(&config.scopes),
        challenge,
        state,
    )
}

/// Minimal URL encoding for parameter values.
/// Only encodes characters that would break URL parameter parsing.
fn urlencoded(s: &str) -> String {
    s.replace(' ', "%20")
        .replace(':', "%3A")
        .replace('/', "%2F")
}

//! OAuth token exchange and refresh
//!
//! The two token endpoint interactions:
//! 1. Authorization code exchange (completing the interactive flow)
//! 2. Token refresh (reusing a stored refresh token)
//!
//! Both POST form bodies to the configured token endpoint with different
//! grant types. Responses come back as [`TokenResponse`]; converting
//! `expires_in` (a seconds delta) into an absolute expiry and deciding
//! refresh-token rotation is the orchestrator's job.

use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `refresh_token` is optional: providers may rotate it on refresh or keep
/// the old one, and refresh responses commonly omit it entirely. `scope`
/// is likewise optional; when absent the requested scopes apply.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Exchange an authorization code for tokens (completing the PKCE flow).
///
/// The code proves the user authorized; the verifier proves we are the
/// party that initiated the flow. The redirect URI must be byte-identical
/// to the one in the authorization request.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &AuthConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&config.token_endpoint)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose().as_str()),
            ("redirect_uri", &config.redirect_uri()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Refresh an access token using a stored refresh token.
///
/// The orchestrator converts any failure here into an interactive-flow
/// fallback; 401/403 are called out in the message since they mean the
/// refresh token itself is revoked or invalid rather than a transient
/// endpoint problem.
pub async fn refresh(
    client: &reqwest::Client,
    config: &AuthConfig,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&config.token_endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::TokenExchange(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

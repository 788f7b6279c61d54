//! Authentication orchestrator
//!
//! Sequences "load → reuse/refresh → interactive consent → persist" into
//! one entry point, [`Authenticator::authenticate`]. Within a call the
//! steps run strictly sequentially; the only internal concurrency is the
//! race between the redirect listener and its timeout, owned by
//! [`RedirectListener::wait`].
//!
//! Failure policy: a failed refresh is recoverable — it is attempted at
//! most once and falls through to the interactive flow with its cause
//! retained. The interactive flow has no internal retry; its first failure
//! ends the call. Only [`AuthenticationError`] leaves this module.

use std::sync::Arc;

use common::Secret;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::credentials::{CredentialSet, CredentialStore, now_millis};
use crate::error::{AuthenticationError, Error, Result};
use crate::listener::RedirectListener;
use crate::{pkce, token};

/// Opens the system browser at the authorization URL. Injectable so tests
/// and headless environments can drive the flow without a real browser.
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// A ready-to-use authenticated handle on the Luma API.
#[derive(Debug)]
pub struct AuthHandle {
    access_token: Secret<String>,
    scope: String,
}

impl AuthHandle {
    fn from_credential(credential: &CredentialSet) -> Self {
        Self {
            access_token: Secret::new(credential.access_token.clone()),
            scope: credential.scope.clone(),
        }
    }

    /// Bearer token for `Authorization` headers.
    pub fn bearer_token(&self) -> &str {
        self.access_token.expose()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

/// The authentication state machine.
pub struct Authenticator {
    config: AuthConfig,
    store: CredentialStore,
    http: reqwest::Client,
    launcher: BrowserLauncher,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        let store = CredentialStore::new(config.credentials_path.clone());
        let launcher: BrowserLauncher = Arc::new(|url: &str| open::that(url));
        Self {
            config,
            store,
            http: reqwest::Client::new(),
            launcher,
        }
    }

    /// Replace the browser launcher.
    pub fn with_launcher(mut self, launcher: BrowserLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    /// The credential store backing this authenticator (status reporting).
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Obtain an authenticated handle.
    ///
    /// Adopts stored credentials when they are not expiring; otherwise
    /// refreshes once; otherwise runs the interactive consent flow. The
    /// caller may invoke this again after a failure to retry the whole
    /// sequence from load.
    pub async fn authenticate(&self) -> std::result::Result<AuthHandle, AuthenticationError> {
        let existing = self.store.load().await;

        if let Some(credential) = &existing {
            if !credential.is_expiring(self.config.expiry_buffer_minutes) {
                debug!("stored credentials still fresh, adopting");
                return Ok(AuthHandle::from_credential(credential));
            }
        }

        let mut refresh_cause = None;
        if let Some(credential) = existing {
            info!("stored credentials expiring, attempting refresh");
            match self.refresh(&credential).await {
                Ok(refreshed) => {
                    self.store
                        .save(&refreshed)
                        .await
                        .map_err(AuthenticationError::new)?;
                    info!("token refresh succeeded");
                    return Ok(AuthHandle::from_credential(&refreshed));
                }
                Err(e) => {
                    warn!(error = %e, "token refresh failed, falling back to interactive flow");
                    refresh_cause = Some(e);
                }
            }
        }

        match self.interactive_flow().await {
            Ok(credential) => Ok(AuthHandle::from_credential(&credential)),
            Err(cause) => Err(AuthenticationError::with_refresh_cause(cause, refresh_cause)),
        }
    }

    /// Forget the stored credentials.
    pub async fn logout(&self) -> Result<()> {
        self.store.delete().await
    }

    /// Refresh once against the token endpoint. Every failure comes back
    /// as [`Error::RefreshFailed`]; the caller decides the fallback.
    async fn refresh(&self, credential: &CredentialSet) -> Result<CredentialSet> {
        let response = token::refresh(&self.http, &self.config, &credential.refresh_token)
            .await
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;

        // Rotation is provider-optional: keep the prior refresh token
        // unless the endpoint issued a new one
        let refresh_token = response
            .refresh_token
            .filter(|rt| !rt.is_empty())
            .unwrap_or_else(|| credential.refresh_token.clone());
        let scope = response.scope.unwrap_or_else(|| credential.scope.clone());
        let expires_at = now_millis() + response.expires_in * 1000;

        CredentialSet::new(response.access_token, refresh_token, expires_at, scope)
            .ok_or_else(|| Error::RefreshFailed("refresh response missing access token".into()))
    }

    /// The interactive consent flow: PKCE parameters, browser, redirect
    /// listener, code exchange, persist.
    async fn interactive_flow(&self) -> Result<CredentialSet> {
        let verifier = pkce::generate_verifier();
        let challenge = pkce::compute_challenge(&verifier);
        let state = pkce::generate_state();

        // Bind before launching the browser so the redirect cannot beat
        // the listener
        let listener = RedirectListener::bind(
            self.config.callback_port,
            &self.config.redirect_path,
            &state,
        )
        .await?;

        let url = pkce::build_authorization_url(&self.config, &state, &challenge);
        match (self.launcher)(&url) {
            Ok(()) => info!("opened system browser for authorization"),
            Err(e) => {
                // Non-fatal: the user can follow the URL by hand
                warn!(error = %e, "could not launch browser");
                println!("Open this URL to authorize glowctl:\n\n  {url}\n");
            }
        }

        let callback = listener.wait(self.config.callback_timeout).await?;
        debug!("authorization code received, exchanging for tokens");

        let response =
            token::exchange_code(&self.http, &self.config, &callback.code, &verifier).await?;

        // The exchange must yield a complete credential set; a missing
        // refresh token here is a provider misconfiguration
        let refresh_token = response
            .refresh_token
            .filter(|rt| !rt.is_empty())
            .ok_or_else(|| {
                Error::TokenExchange("exchange response missing refresh token".into())
            })?;
        let scope = response.scope.unwrap_or_else(|| self.config.scopes.clone());
        let expires_at = now_millis() + response.expires_in * 1000;

        let credential = CredentialSet::new(response.access_token, refresh_token, expires_at, scope)
            .ok_or_else(|| {
                Error::TokenExchange("exchange response missing access token or expiry".into())
            })?;

        self.store.save(&credential).await?;
        info!("interactive authorization complete, credentials persisted");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn test_config(dir: &tempfile::TempDir, token_endpoint: String, port: u16) -> AuthConfig {
        let mut config = AuthConfig::new("glowctl-test", Secret::new("cs_test".into()));
        config.token_endpoint = token_endpoint;
        config.callback_port = port;
        config.credentials_path = dir.path().join("credentials.json");
        config.callback_timeout = Duration::from_secs(5);
        config
    }

    async fn seed_credentials(config: &AuthConfig, access: &str, expires_at: u64) {
        let store = CredentialStore::new(config.credentials_path.clone());
        store
            .save(&CredentialSet::new(access, "rt_old", expires_at, "lights:read").unwrap())
            .await
            .unwrap();
    }

    /// Launcher that records whether it ran and otherwise does nothing.
    fn recording_launcher() -> (BrowserLauncher, Arc<AtomicBool>) {
        let launched = Arc::new(AtomicBool::new(false));
        let flag = launched.clone();
        let launcher: BrowserLauncher = Arc::new(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        (launcher, launched)
    }

    /// Launcher that plays the provider: pulls the state out of the
    /// authorization URL and hits the loopback callback with it.
    fn callback_launcher(port: u16, code: &'static str) -> BrowserLauncher {
        Arc::new(move |url: &str| {
            let state = url
                .split("state=")
                .nth(1)
                .and_then(|s| s.split('&').next())
                .expect("authorization URL must carry state")
                .to_owned();
            let callback = format!("http://127.0.0.1:{port}/callback?code={code}&state={state}");
            tokio::spawn(async move {
                let _ = reqwest::get(callback).await;
            });
            Ok(())
        })
    }

    fn token_body(refresh: Option<&str>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "access_token": "at_new",
            "expires_in": 3600,
            "scope": "lights:read lights:write scenes:read",
        });
        if let Some(rt) = refresh {
            body["refresh_token"] = rt.into();
        }
        body
    }

    #[tokio::test]
    async fn fresh_credentials_are_adopted_without_any_network() {
        let dir = tempfile::tempdir().unwrap();
        // Unroutable token endpoint: any network call fails the test path
        let config = test_config(&dir, "http://127.0.0.1:1/oauth2/token".into(), free_port());
        seed_credentials(&config, "at_fresh", now_millis() + 30 * 60_000).await;

        let (launcher, launched) = recording_launcher();
        let auth = Authenticator::new(config).with_launcher(launcher);

        let handle = auth.authenticate().await.unwrap();
        assert_eq!(handle.bearer_token(), "at_fresh");
        assert_eq!(handle.scope(), "lights:read");
        assert!(!launched.load(Ordering::SeqCst), "browser must not launch");
    }

    #[tokio::test]
    async fn expiring_credentials_are_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt_old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(Some("rt_rotated"))))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, format!("{}/oauth2/token", server.uri()), free_port());
        seed_credentials(&config, "at_stale", now_millis() + 2 * 60_000).await;

        let (launcher, launched) = recording_launcher();
        let auth = Authenticator::new(config).with_launcher(launcher);

        let handle = auth.authenticate().await.unwrap();
        assert_eq!(handle.bearer_token(), "at_new");
        assert!(!launched.load(Ordering::SeqCst), "refresh must not need a browser");

        let stored = auth.store().load().await.unwrap();
        assert_eq!(stored.access_token, "at_new");
        assert_eq!(stored.refresh_token, "rt_rotated", "rotated token replaces the old one");
    }

    #[tokio::test]
    async fn refresh_without_rotation_retains_prior_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(None)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, format!("{}/oauth2/token", server.uri()), free_port());
        seed_credentials(&config, "at_stale", now_millis() + 2 * 60_000).await;

        let (launcher, _) = recording_launcher();
        let auth = Authenticator::new(config).with_launcher(launcher);
        auth.authenticate().await.unwrap();

        let stored = auth.store().load().await.unwrap();
        assert_eq!(stored.refresh_token, "rt_old", "prior refresh token must survive");
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_interactive_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("revoked"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=interactive-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(Some("rt_new"))))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let config = test_config(&dir, format!("{}/oauth2/token", server.uri()), port);
        seed_credentials(&config, "at_stale", now_millis() + 2 * 60_000).await;

        let auth = Authenticator::new(config).with_launcher(callback_launcher(port, "interactive-code"));

        let handle = auth.authenticate().await.unwrap();
        assert_eq!(handle.bearer_token(), "at_new");

        // The newly obtained record is what a subsequent load returns
        let stored = auth.store().load().await.unwrap();
        assert_eq!(stored.access_token, "at_new");
        assert_eq!(stored.refresh_token, "rt_new");
    }

    #[tokio::test]
    async fn first_login_runs_interactive_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(Some("rt_new"))))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let config = test_config(&dir, format!("{}/oauth2/token", server.uri()), port);

        let auth = Authenticator::new(config).with_launcher(callback_launcher(port, "first-code"));
        let handle = auth.authenticate().await.unwrap();
        assert_eq!(handle.bearer_token(), "at_new");
    }

    #[tokio::test]
    async fn interactive_failure_after_refresh_failure_reports_both() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("revoked"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir, format!("{}/oauth2/token", server.uri()), free_port());
        config.callback_timeout = Duration::from_millis(300);
        seed_credentials(&config, "at_stale", now_millis() + 2 * 60_000).await;

        let (launcher, _) = recording_launcher();
        let auth = Authenticator::new(config).with_launcher(launcher);

        let err = auth.authenticate().await.unwrap_err();
        assert!(
            matches!(err.cause(), Error::CallbackTimeout(_)),
            "got: {:?}",
            err.cause()
        );
        assert!(
            matches!(err.refresh_cause(), Some(Error::RefreshFailed(_))),
            "refresh cause must be retained"
        );
    }

    #[tokio::test]
    async fn logout_deletes_stored_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:1/oauth2/token".into(), free_port());
        seed_credentials(&config, "at_fresh", now_millis() + 30 * 60_000).await;

        let auth = Authenticator::new(config);
        assert!(auth.store().load().await.is_some());

        auth.logout().await.unwrap();
        assert!(auth.store().load().await.is_none());

        // Logging out twice is fine
        auth.logout().await.unwrap();
    }
}

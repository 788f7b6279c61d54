//! Loopback redirect listener for the OAuth authorization callback
//!
//! A single-shot HTTP endpoint that accepts exactly one completing request
//! (success, validation failure, or provider-reported error) and shuts
//! down — after that request or after a timeout, whichever fires first.
//!
//! The listener binds 127.0.0.1 only. Binding a wildcard interface would
//! let anything on the local network deliver an authorization code, so
//! loopback is a security invariant here, not a default.
//!
//! Exactly-once settlement: the first terminal event takes the oneshot
//! sender out of a mutex-guarded slot and everyone after it finds the slot
//! empty. Later requests still receive full HTTP responses; they just no
//! longer influence the outcome. Teardown is graceful — the in-flight
//! response body is flushed before the socket closes — and [`RedirectListener::wait`]
//! joins the server task so the port is rebindable the moment it returns.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Payload extracted from a valid authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub code: String,
    pub state: String,
}

type Settlement = std::result::Result<CallbackResult, Error>;

struct ListenerShared {
    expected_state: String,
    /// Complete-once slot: `take()` under the lock decides the winner.
    slot: Mutex<Option<oneshot::Sender<Settlement>>>,
}

/// A bound, not-yet-awaited redirect listener.
///
/// Binding is separate from waiting so the orchestrator can open the
/// browser only after the listener is live, and so tests can bind port 0
/// and read the real port from [`local_addr`](Self::local_addr).
pub struct RedirectListener {
    addr: SocketAddr,
    rx: oneshot::Receiver<Settlement>,
    shutdown_tx: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
}

impl RedirectListener {
    /// Bind the listener on `127.0.0.1:{port}` serving `redirect_path`.
    ///
    /// Wrong-method requests on the path get 405 from axum's method
    /// router; unknown paths get the 404 fallback. Neither settles the
    /// outcome.
    pub async fn bind(port: u16, redirect_path: &str, expected_state: &str) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .await
            .map_err(|e| Error::Io(format!("binding callback listener on port {port}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Io(format!("reading callback listener address: {e}")))?;

        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let shared = Arc::new(ListenerShared {
            expected_state: expected_state.to_owned(),
            slot: Mutex::new(Some(tx)),
        });

        let app = Router::new()
            .route(redirect_path, get(handle_callback))
            .with_state(shared);

        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "redirect listener exited with error");
            }
        });

        debug!(%addr, "redirect listener bound");
        Ok(Self {
            addr,
            rx,
            shutdown_tx,
            server,
        })
    }

    /// Actual bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Await the callback, racing it against `timeout`.
    ///
    /// Resolves with the first terminal event. On every exit path the
    /// timer is dropped, the server is shut down gracefully (response
    /// bodies flush before the socket closes), and the server task is
    /// joined — the port is free for rebinding when this returns.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackResult> {
        let Self {
            rx,
            shutdown_tx,
            server,
            ..
        } = self;

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(settlement)) => settlement,
            Ok(Err(_)) => Err(Error::Io("redirect listener closed before settling".into())),
            Err(_) => Err(Error::CallbackTimeout(timeout)),
        };

        let _ = shutdown_tx.send(());
        let _ = server.await;
        outcome
    }
}

/// GET handler for the redirect path. Rules evaluated in order:
/// provider error → missing parameters → state mismatch → success.
async fn handle_callback(
    State(shared): State<Arc<ListenerShared>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    // Provider-reported failure. The browser transaction itself succeeded,
    // so the page is served with 200.
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .cloned()
            .unwrap_or_default();
        warn!(%error, %description, "provider reported an authorization error");
        settle(
            &shared,
            Err(Error::Callback {
                error: error.clone(),
                description,
            }),
        )
        .await;
        return (StatusCode::OK, Html(failure_page(error)));
    }

    let code = params.get("code").filter(|c| !c.is_empty());
    let state = params.get("state").filter(|s| !s.is_empty());
    let (code, state) = match (code, state) {
        (Some(code), Some(state)) => (code.clone(), state.clone()),
        _ => {
            warn!("authorization callback missing code or state");
            settle(
                &shared,
                Err(Error::Callback {
                    error: "invalid_request".into(),
                    description: "callback missing code or state parameter".into(),
                }),
            )
            .await;
            return (
                StatusCode::BAD_REQUEST,
                Html(failure_page("invalid_request")),
            );
        }
    };

    if state != shared.expected_state {
        warn!("authorization callback state mismatch");
        settle(&shared, Err(Error::StateMismatch)).await;
        return (StatusCode::FORBIDDEN, Html(failure_page("state_mismatch")));
    }

    settle(&shared, Ok(CallbackResult { code, state })).await;
    (StatusCode::OK, Html(success_page()))
}

/// Deliver an outcome if no terminal event won earlier. Later callers are
/// no-ops with respect to the settled value; their HTTP responses are
/// still served.
async fn settle(shared: &ListenerShared, outcome: Settlement) {
    if let Some(tx) = shared.slot.lock().await.take() {
        let _ = tx.send(outcome);
    }
}

fn success_page() -> String {
    page(
        "Authentication successful",
        "You are signed in to Luma. You can close this tab and return to the terminal.",
    )
}

fn failure_page(reason: &str) -> String {
    // reason is one of our own tokens or a provider error code; strip
    // anything that could break out of the HTML text node
    let reason: String = reason
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    page(
        "Authentication failed",
        &format!("The authorization attempt failed ({reason}). Return to the terminal for details."),
    )
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>glowctl</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>{title}</h2>
<p>{body}</p>
</body>
</html>"#
    )
}

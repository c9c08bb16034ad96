//! Local HTTP listener receiving the OAuth redirect.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{OAuthError, Result};

/// How long in-flight responses get to finish once the listener is stopped
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const CONFIRMATION_PAGE: &str = "<html><body><h1>Authorization received</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

const WAITING_PAGE: &str = "<html><body><h1>Waiting for authorization</h1>\
    <p>This request did not carry a valid authorization response.</p></body></html>";

/// Query parameters of an inbound redirect
#[derive(Debug, Default, Deserialize)]
pub struct CallbackEvent {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// What a resolved callback carried
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CallbackOutcome {
    Code(String),
    Denied(String),
}

/// How the gate treated a single inbound callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
    /// First valid callback; the flow is resolved with it
    Accepted,
    /// Not a valid callback for this flow; the listener keeps waiting
    Ignored(&'static str),
    /// The flow was already resolved by an earlier callback
    AlreadyResolved,
}

/// Single-resolution guard in front of the pending flow.
///
/// Holds the only sender of a one-shot channel. The first callback carrying
/// the expected `state` together with a `code` or an `error` takes the sender;
/// every later callback sees `AlreadyResolved`.
pub struct CallbackGate {
    expected_state: String,
    sender: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

impl CallbackGate {
    pub(crate) fn new(expected_state: String) -> (Self, oneshot::Receiver<CallbackOutcome>) {
        let (tx, rx) = oneshot::channel();
        let gate = Self {
            expected_state,
            sender: Mutex::new(Some(tx)),
        };
        (gate, rx)
    }

    /// Offer an inbound callback to the pending flow
    pub fn offer(&self, event: CallbackEvent) -> CallbackDisposition {
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.is_none() {
            return CallbackDisposition::AlreadyResolved;
        }

        let code = event.code.filter(|c| !c.is_empty());
        let error = event.error.filter(|e| !e.is_empty());
        let outcome = match (code, error) {
            (Some(code), _) => CallbackOutcome::Code(code),
            (None, Some(error)) => CallbackOutcome::Denied(error),
            (None, None) => {
                debug!("ignoring callback without authorization code");
                return CallbackDisposition::Ignored("missing authorization code");
            }
        };

        if event.state.as_deref() != Some(self.expected_state.as_str()) {
            warn!("ignoring callback with mismatched state, possible forged request");
            return CallbackDisposition::Ignored("state mismatch");
        }

        if let Some(tx) = sender.take() {
            // The receiver is gone only if the flow was already abandoned.
            let _ = tx.send(outcome);
        }
        CallbackDisposition::Accepted
    }
}

async fn handle_callback(
    State(gate): State<Arc<CallbackGate>>,
    Query(event): Query<CallbackEvent>,
) -> Response {
    match gate.offer(event) {
        CallbackDisposition::Accepted => {
            info!("authorization callback received");
            Html(CONFIRMATION_PAGE).into_response()
        }
        CallbackDisposition::AlreadyResolved => Html(CONFIRMATION_PAGE).into_response(),
        CallbackDisposition::Ignored(_) => {
            (StatusCode::BAD_REQUEST, Html(WAITING_PAGE)).into_response()
        }
    }
}

/// A bound, not yet serving, callback listener on `127.0.0.1`
pub struct CallbackListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackListener {
    /// Bind the loopback port. A port already in use is fatal.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| OAuthError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| OAuthError::Bind { addr, source })?;
        Ok(Self { listener, addr })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn serve(self, gate: Arc<CallbackGate>) -> RunningListener {
        let app = Router::new()
            .route("/", get(handle_callback))
            .route("/*path", get(handle_callback))
            .with_state(gate);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let listener = self.listener;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.await.ok();
                })
                .await
        });

        debug!(addr = %self.addr, "OAuth callback listener started");
        RunningListener {
            addr: self.addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Serving listener. Stopped explicitly with [`RunningListener::stop`];
/// dropping it without stopping aborts the server task, which also releases
/// the port.
pub(crate) struct RunningListener {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl RunningListener {
    pub(crate) async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        let result = match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(served)) => served.map_err(OAuthError::Server),
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "OAuth callback listener task failed");
                Ok(())
            }
            Err(_) => {
                warn!("OAuth callback listener did not drain in time, aborting");
                handle.abort();
                Ok(())
            }
        };
        info!(addr = %self.addr, "OAuth callback listener stopped");
        result
    }
}

impl Drop for RunningListener {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(addr = %self.addr, "aborting OAuth callback listener");
            handle.abort();
        }
    }
}

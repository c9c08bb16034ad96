use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::OAuthConfig;
use crate::callback::{CallbackGate, CallbackListener, CallbackOutcome};
use crate::error::{OAuthError, Result};
use crate::pkce::{PkceChallenge, generate_state};
use crate::token::{OAuthToken, exchange_code};

/// Generate authorization URL.
///
/// Pure: the same config, state and challenge always give the same URL.
pub fn build_authorization_url(config: &OAuthConfig, state: &str, code_challenge: &str) -> String {
    let mut auth_url = format!(
        "{}?\
        client_id={}&\
        redirect_uri={}&\
        response_type=code&\
        scope={}&\
        state={}&\
        code_challenge={}&\
        code_challenge_method=S256",
        config.auth_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&config.scopes.join(" ")),
        urlencoding::encode(state),
        urlencoding::encode(code_challenge),
    );

    if config.offline_access {
        // prompt=consent makes the provider issue a refresh token again for a
        // user who already granted access
        auth_url.push_str("&access_type=offline&prompt=consent");
    }

    auth_url
}

/// Everything needed to start one authorization attempt
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    config: OAuthConfig,
    state: String,
    pkce: PkceChallenge,
}

impl AuthorizationRequest {
    /// New request with a fresh random state and PKCE verifier
    pub fn new(config: OAuthConfig) -> Self {
        Self::from_parts(config, generate_state(), PkceChallenge::generate())
    }

    pub fn from_parts(config: OAuthConfig, state: String, pkce: PkceChallenge) -> Self {
        Self {
            config,
            state,
            pkce,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn authorization_url(&self) -> String {
        build_authorization_url(&self.config, &self.state, &self.pkce.challenge)
    }
}

/// Progress of an [`AuthorizationFlow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingUserConsent,
    ListeningForCallback,
    Authorized,
    Failed,
}

/// Drives one browser consent round trip to an [`OAuthToken`]
pub struct AuthorizationFlow {
    request: AuthorizationRequest,
    state: FlowState,
    timeout: Option<Duration>,
}

impl AuthorizationFlow {
    pub fn new(request: AuthorizationRequest) -> Self {
        Self {
            request,
            state: FlowState::Idle,
            timeout: None,
        }
    }

    /// Give up waiting for the callback after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Start the flow and return the URL the user has to open
    pub fn begin(&mut self) -> String {
        self.state = FlowState::AwaitingUserConsent;
        self.request.authorization_url()
    }

    /// Bind the callback listener on `port` and wait for the authorization
    pub async fn await_authorization(&mut self, port: u16) -> Result<OAuthToken> {
        let listener = match CallbackListener::bind(port).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state = FlowState::Failed;
                return Err(e);
            }
        };
        self.await_on(listener).await
    }

    /// Wait for the authorization on an already bound listener.
    ///
    /// Resolves once: with the exchanged token, or with the first fatal error.
    /// The listener is released before this returns, and also when the
    /// returned future is dropped early.
    pub async fn await_on(&mut self, listener: CallbackListener) -> Result<OAuthToken> {
        self.state = FlowState::ListeningForCallback;
        info!(addr = %listener.local_addr(), "waiting for OAuth callback");

        let result = self.listen_and_exchange(listener).await;
        self.state = match result {
            Ok(_) => FlowState::Authorized,
            Err(ref e) => {
                warn!(error = %e, "OAuth authorization failed");
                FlowState::Failed
            }
        };
        result
    }

    async fn listen_and_exchange(&self, listener: CallbackListener) -> Result<OAuthToken> {
        let (gate, receiver) = CallbackGate::new(self.request.state.clone());
        let running = listener.serve(Arc::new(gate));

        let received = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(received) => Ok(received),
                Err(_) => Err(OAuthError::Timeout(timeout)),
            },
            None => Ok(receiver.await),
        };

        // Stop before acting on the outcome so every path releases the port.
        let stopped = running.stop().await;

        let outcome = match received? {
            Ok(outcome) => outcome,
            Err(_) => {
                stopped?;
                return Err(OAuthError::Aborted);
            }
        };

        match outcome {
            CallbackOutcome::Code(code) => {
                let config = &self.request.config;
                exchange_code(config, &code, &self.request.pkce.verifier).await
            }
            CallbackOutcome::Denied(error) => Err(OAuthError::ConsentDenied(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    const STATE: &str = "expected-state";

    fn request(token_url: String) -> AuthorizationRequest {
        let config = OAuthConfig::new("client-id".to_string(), "client-secret".to_string(), 9000)
            .with_token_url(token_url);
        AuthorizationRequest::from_parts(
            config,
            STATE.to_string(),
            PkceChallenge::from_verifier("test-verifier".to_string()),
        )
    }

    fn http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap()
    }

    async fn token_endpoint(server: &mut mockito::ServerGuard, hits: usize) -> mockito::Mock {
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at","refresh_token":"rt","expires_in":3599}"#)
            .expect(hits)
            .create_async()
            .await
    }

    async fn assert_port_released(addr: SocketAddr) {
        for _ in 0..50 {
            if TcpListener::bind(addr).await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("callback listener still bound to {addr}");
    }

    #[test]
    fn test_authorization_url_is_deterministic() {
        let req = request("https://oauth2.googleapis.com/token".to_string());
        let url = req.authorization_url();

        assert_eq!(url, req.authorization_url());
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A9000"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains(
            "scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fyoutube.force-ssl"
        ));
        assert!(url.contains("state=expected-state"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
        assert!(!url.contains("client-secret"));
    }

    #[test]
    fn test_authorization_url_without_offline_access() {
        let mut config = OAuthConfig::new("id".to_string(), "secret".to_string(), 9000);
        config.offline_access = false;
        config.scopes.push("openid".to_string());

        let url = build_authorization_url(&config, "s", "c");
        assert!(!url.contains("access_type=offline"));
        assert!(url.contains("force-ssl%20openid"));
    }

    #[test]
    fn test_begin_moves_to_awaiting_consent() {
        let mut flow = AuthorizationFlow::new(request("http://unused".to_string()));
        assert_eq!(flow.state(), FlowState::Idle);

        let url = flow.begin();
        assert!(url.contains("state=expected-state"));
        assert_eq!(flow.state(), FlowState::AwaitingUserConsent);
    }

    #[tokio::test]
    async fn test_ignores_invalid_callbacks_until_code_arrives() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = token_endpoint(&mut server, 1).await;

        let listener = CallbackListener::bind(0).await.unwrap();
        let addr = listener.local_addr();
        let mut flow = AuthorizationFlow::new(request(format!("{}/token", server.url())));
        flow.begin();

        let task = tokio::spawn(async move {
            let result = flow.await_on(listener).await;
            (result, flow.state())
        });

        let client = http_client();

        let stray = client
            .get(format!("http://{addr}/favicon.ico"))
            .send()
            .await
            .unwrap();
        assert_eq!(stray.status(), 400);

        let forged = client
            .get(format!("http://{addr}/?code=forged&state=other"))
            .send()
            .await
            .unwrap();
        assert_eq!(forged.status(), 400);
        assert!(!task.is_finished());

        let valid = client
            .get(format!("http://{addr}/?code=auth-code&state={STATE}&scope=x"))
            .send()
            .await
            .unwrap();
        assert_eq!(valid.status(), 200);
        assert!(valid.text().await.unwrap().contains("return to the terminal"));

        let (result, state) = task.await.unwrap();
        let token = result.unwrap();
        assert_eq!(token.access_token.expose_secret(), "at");
        assert_eq!(state, FlowState::Authorized);

        token_mock.assert_async().await;
        assert_port_released(addr).await;
    }

    #[tokio::test]
    async fn test_exchange_failure_still_releases_port() {
        let mut server = mockito::Server::new_async().await;
        let _token_mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let listener = CallbackListener::bind(0).await.unwrap();
        let addr = listener.local_addr();
        let mut flow = AuthorizationFlow::new(request(format!("{}/token", server.url())));

        let task = tokio::spawn(async move {
            let result = flow.await_on(listener).await;
            (result, flow.state())
        });

        let response = http_client()
            .get(format!("http://{addr}/callback?code=stale&state={STATE}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let (result, state) = task.await.unwrap();
        assert!(matches!(
            result,
            Err(OAuthError::TokenExchange { status: 400, .. })
        ));
        assert_eq!(state, FlowState::Failed);
        assert_port_released(addr).await;
    }

    #[tokio::test]
    async fn test_denied_consent_fails_without_exchange() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = token_endpoint(&mut server, 0).await;

        let listener = CallbackListener::bind(0).await.unwrap();
        let addr = listener.local_addr();
        let mut flow = AuthorizationFlow::new(request(format!("{}/token", server.url())));

        let task = tokio::spawn(async move { flow.await_on(listener).await });

        http_client()
            .get(format!("http://{addr}/?error=access_denied&state={STATE}"))
            .send()
            .await
            .unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(OAuthError::ConsentDenied(ref e)) if e == "access_denied"));
        token_mock.assert_async().await;
        assert_port_released(addr).await;
    }

    #[tokio::test]
    async fn test_timeout_releases_port() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let addr = listener.local_addr();
        let mut flow = AuthorizationFlow::new(request("http://unused/token".to_string()))
            .with_timeout(Duration::from_millis(50));

        let result = flow.await_on(listener).await;

        assert!(matches!(result, Err(OAuthError::Timeout(_))));
        assert_eq!(flow.state(), FlowState::Failed);
        assert_port_released(addr).await;
    }

    #[tokio::test]
    async fn test_cancelled_flow_releases_port() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let addr = listener.local_addr();
        let mut flow = AuthorizationFlow::new(request("http://unused/token".to_string()));

        let task = tokio::spawn(async move { flow.await_on(listener).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_port_released(addr).await;
    }

    #[tokio::test]
    async fn test_await_authorization_port_in_use() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();
        let mut flow = AuthorizationFlow::new(request("http://unused/token".to_string()));

        let result = flow.await_authorization(port).await;

        assert!(matches!(result, Err(OAuthError::Bind { .. })));
        assert_eq!(flow.state(), FlowState::Failed);
    }
}

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while authorizing against the OAuth 2.0 provider
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Failed to bind OAuth callback listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("OAuth callback listener failed: {0}")]
    Server(#[source] std::io::Error),

    #[error("OAuth authorization timeout ({} seconds)", .0.as_secs())]
    Timeout(Duration),

    #[error("OAuth callback listener stopped before an authorization code arrived")]
    Aborted,

    #[error("Authorization was denied by the user: {0}")]
    ConsentDenied(String),

    #[error("Failed to exchange authorization code (status {status}): {body}")]
    TokenExchange { status: u16, body: String },

    #[error("Failed to refresh OAuth token (status {status}): {body}")]
    TokenRefresh { status: u16, body: String },

    #[error("OAuth request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("No refresh token available, re-run the authorization flow")]
    MissingRefreshToken,
}

pub type Result<T> = std::result::Result<T, OAuthError>;

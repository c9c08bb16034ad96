//! OAuth 2.0 authorization-code flow for the YouTube Data API.
//!
//! The user opens the authorization URL in a browser, consents, and is
//! redirected to a short-lived HTTP listener on `127.0.0.1`. The listener
//! accepts exactly one valid callback, is torn down, and the code is exchanged
//! for an [`OAuthToken`].

pub mod callback;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod token;

pub use callback::{CallbackDisposition, CallbackEvent, CallbackGate, CallbackListener};
pub use error::{OAuthError, Result};
pub use flow::{AuthorizationFlow, AuthorizationRequest, FlowState, build_authorization_url};
pub use pkce::PkceChallenge;
pub use token::{OAuthManager, OAuthToken, exchange_code, refresh_access_token};

/// Default OAuth callback port
pub const OAUTH_CALLBACK_PORT: u16 = 9000;

/// Scope granting read/write access to the user's YouTube account
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI for OAuth callback
    pub redirect_uri: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Request offline access so a refresh token is issued
    pub offline_access: bool,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
}

impl OAuthConfig {
    /// Create new OAuth configuration with YouTube defaults, redirecting to the
    /// local callback listener on `port`
    pub fn new(client_id: String, client_secret: String, port: u16) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri: format!("http://127.0.0.1:{}", port),
            scopes: vec![YOUTUBE_SCOPE.to_string()],
            offline_access: true,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Point the token exchange at a different endpoint
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OAuthConfig::new("id".to_string(), "secret".to_string(), 9000);
        assert_eq!(config.redirect_uri, "http://127.0.0.1:9000");
        assert_eq!(config.scopes, vec![YOUTUBE_SCOPE.to_string()]);
        assert!(config.offline_access);
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::OAuthConfig;
use crate::error::{OAuthError, Result};

/// Seconds before expiry at which a token is treated as expired
const EXPIRY_MARGIN_SECS: u64 = 60;

/// OAuth 2.0 token information.
///
/// Lives in memory for a single run only. Token material is wrapped in
/// [`SecretString`] so it never shows up in `Debug` output or logs.
#[derive(Debug)]
pub struct OAuthToken {
    /// Access token for API requests
    pub access_token: SecretString,
    /// Refresh token, only issued when offline access was granted
    pub refresh_token: Option<SecretString>,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// Expiry time as Unix timestamp (seconds since epoch)
    pub expires_at: u64,
}

impl OAuthToken {
    /// Check if the token is expired or will expire soon (within 60 seconds)
    pub fn is_expired(&self) -> bool {
        unix_now() + EXPIRY_MARGIN_SECS >= self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: u64,
}

impl TokenResponse {
    fn into_token(self, fallback_refresh: Option<SecretString>) -> OAuthToken {
        OAuthToken {
            access_token: SecretString::new(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::new).or(fallback_refresh),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: unix_now() + self.expires_in,
        }
    }
}

/// Exchange authorization code for tokens
pub async fn exchange_code(config: &OAuthConfig, code: &str, verifier: &str) -> Result<OAuthToken> {
    info!("exchanging authorization code for tokens");

    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("code_verifier", verifier),
        ("grant_type", "authorization_code"),
        ("redirect_uri", config.redirect_uri.as_str()),
    ];

    let response = reqwest::Client::new()
        .post(&config.token_url)
        .form(&params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await?;
        return Err(OAuthError::TokenExchange { status, body });
    }

    let token = parse_token_response(&response.text().await?)?.into_token(None);

    info!(
        has_refresh_token = token.refresh_token.is_some(),
        "obtained OAuth tokens"
    );
    Ok(token)
}

/// Refresh the access token using the refresh token.
///
/// The provider usually omits the refresh token on refresh; the existing one
/// is carried over in that case.
pub async fn refresh_access_token(config: &OAuthConfig, token: &OAuthToken) -> Result<OAuthToken> {
    let refresh_token = token
        .refresh_token
        .as_ref()
        .ok_or(OAuthError::MissingRefreshToken)?;

    debug!("refreshing OAuth access token");

    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh_token.expose_secret().as_str()),
        ("grant_type", "refresh_token"),
    ];

    let response = reqwest::Client::new()
        .post(&config.token_url)
        .form(&params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await?;
        return Err(OAuthError::TokenRefresh { status, body });
    }

    let carried = SecretString::new(refresh_token.expose_secret().clone());
    let refreshed = parse_token_response(&response.text().await?)?.into_token(Some(carried));

    info!("OAuth token refreshed");
    Ok(refreshed)
}

fn parse_token_response(body: &str) -> Result<TokenResponse> {
    serde_json::from_str(body).map_err(|e| OAuthError::InvalidTokenResponse(e.to_string()))
}

/// Holds the credential for the rest of the run and refreshes it on demand
pub struct OAuthManager {
    config: OAuthConfig,
    token: OAuthToken,
}

impl OAuthManager {
    /// Take ownership of an authorized token
    pub fn new(config: OAuthConfig, token: OAuthToken) -> Self {
        Self { config, token }
    }

    /// Get valid access token, refreshing if necessary
    pub async fn access_token(&mut self) -> Result<SecretString> {
        if self.token.is_expired() {
            info!("access token expired, refreshing");
            self.token = refresh_access_token(&self.config, &self.token).await?;
        }
        Ok(SecretString::new(
            self.token.access_token.expose_secret().clone(),
        ))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

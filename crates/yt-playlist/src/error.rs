use thiserror::Error;
use yt_oauth::OAuthError;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] OAuthError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("YouTube API error (status {status}): {message}")]
    Service { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, PlaylistError>;

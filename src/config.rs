use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use yt_oauth::{OAUTH_CALLBACK_PORT, OAuthConfig};
use yt_playlist::{MAX_PAGE_SIZE, PipelineConfig};

/// YouTube Random Playlist - creates a playlist from randomly picked uploads of a channel
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// YouTube username whose uploads are sampled
    #[arg(short, long, required = true)]
    pub username: String,

    /// Google OAuth client ID
    #[arg(short = 'i', long, required = true)]
    pub client_id: String,

    /// Google OAuth client secret
    #[arg(short = 's', long, required = true)]
    pub client_secret: String,

    /// Title of the playlist to create
    #[arg(short = 'n', long, required = true)]
    pub playlist_name: String,

    /// Number of videos to pick
    #[arg(short, long, default_value = "100")]
    pub count: usize,

    /// Local port for the OAuth callback listener
    #[arg(long, default_value_t = OAUTH_CALLBACK_PORT)]
    pub port: u16,

    /// Playlist items requested per page (1-50)
    #[arg(long, default_value = "50")]
    pub page_size: u32,

    /// Pause between page requests in milliseconds
    #[arg(long, default_value = "1000")]
    pub page_delay_ms: u64,

    /// Seconds to wait for the browser authorization, 0 waits forever
    #[arg(long, default_value = "300")]
    pub auth_timeout_secs: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--{0} must not be empty")]
    Empty(&'static str),

    #[error("--count must be at least 1")]
    ZeroCount,

    #[error("--page-size must be between 1 and {max}, got {0}", max = MAX_PAGE_SIZE)]
    PageSize(u32),
}

/// Validated settings for one run
#[derive(Debug)]
pub struct Settings {
    pub username: String,
    pub playlist_name: String,
    pub port: u16,
    pub auth_timeout: Option<Duration>,
    pub oauth: OAuthConfig,
    pub pipeline: PipelineConfig,
}

impl Settings {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        for (flag, value) in [
            ("username", &args.username),
            ("client-id", &args.client_id),
            ("client-secret", &args.client_secret),
            ("playlist-name", &args.playlist_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(flag));
            }
        }
        if args.count == 0 {
            return Err(ConfigError::ZeroCount);
        }
        if !(1..=MAX_PAGE_SIZE).contains(&args.page_size) {
            return Err(ConfigError::PageSize(args.page_size));
        }

        Ok(Self {
            oauth: OAuthConfig::new(args.client_id, args.client_secret, args.port),
            pipeline: PipelineConfig {
                page_size: args.page_size,
                page_delay: Duration::from_millis(args.page_delay_ms),
                sample_size: args.count,
            },
            auth_timeout: (args.auth_timeout_secs > 0)
                .then(|| Duration::from_secs(args.auth_timeout_secs)),
            username: args.username,
            playlist_name: args.playlist_name,
            port: args.port,
        })
    }
}

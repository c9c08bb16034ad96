use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yt_oauth::{AuthorizationFlow, AuthorizationRequest, OAuthManager};
use yt_playlist::{DEFAULT_API_ADDRESS, YouTubeClient, run_pipeline};

mod config;

use config::{Args, Settings};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let settings = Settings::from_args(args)?;

    let mut flow = AuthorizationFlow::new(AuthorizationRequest::new(settings.oauth.clone()));
    if let Some(timeout) = settings.auth_timeout {
        flow = flow.with_timeout(timeout);
    }
    let auth_url = flow.begin();

    eprintln!("\n=================================================");
    eprintln!("OAuth 2.0 Authorization Required");
    eprintln!("=================================================");
    eprintln!("\nSign in with your Google Account at:\n");
    eprintln!("{}\n", auth_url);
    eprintln!("Waiting for authorization...");
    eprintln!("=================================================\n");

    let token = flow.await_authorization(settings.port).await?;

    // Get REST API address from environment variable or use default
    let rest_api_address =
        std::env::var("REST_API_ADDRESS").unwrap_or_else(|_| DEFAULT_API_ADDRESS.to_string());
    info!(address = %rest_api_address, "using YouTube REST API");

    let client = YouTubeClient::new(rest_api_address, OAuthManager::new(settings.oauth, token))?;
    let mut rng = StdRng::from_entropy();

    let report = run_pipeline(
        &client,
        &settings.username,
        &settings.playlist_name,
        &settings.pipeline,
        &mut rng,
    )
    .await?;

    info!(
        playlist_id = %report.destination_playlist_id,
        added = report.added.len(),
        fetched = report.fetched,
        "playlist ready"
    );
    eprintln!(
        "\nCreated playlist '{}' with {} videos: https://www.youtube.com/playlist?list={}",
        settings.playlist_name,
        report.added.len(),
        report.destination_playlist_id
    );

    Ok(())
}

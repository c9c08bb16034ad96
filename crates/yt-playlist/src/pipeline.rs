use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::error::Result;
use crate::sample::sample_indices;
use crate::{MAX_PAGE_SIZE, PlaylistService, PlaylistVideo};

/// Tunables for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Items requested per page, at most [`MAX_PAGE_SIZE`]
    pub page_size: u32,
    /// Pause between two page requests, keeps the run under the API rate limit
    pub page_delay: Duration,
    /// Number of videos to put into the new playlist
    pub sample_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            page_delay: Duration::from_millis(1000),
            sample_size: 100,
        }
    }
}

/// What a completed run did
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub source_playlist_id: String,
    pub fetched: usize,
    pub destination_playlist_id: String,
    /// Playlist item IDs created in the destination, in insertion order
    pub added: Vec<String>,
}

pub async fn resolve_uploads_playlist_id<S: PlaylistService>(
    service: &S,
    username: &str,
) -> Result<String> {
    let playlist_id = service.uploads_playlist_id(username).await?;
    info!(username, playlist_id = %playlist_id, "resolved uploads playlist");
    Ok(playlist_id)
}

/// Page through the whole playlist, concatenating pages in order.
///
/// Any failing page aborts the fetch; nothing retrieved so far is returned.
pub async fn fetch_all_members<S: PlaylistService>(
    service: &S,
    playlist_id: &str,
    config: &PipelineConfig,
) -> Result<Vec<PlaylistVideo>> {
    let page_size = config.page_size.clamp(1, MAX_PAGE_SIZE);
    let mut members = Vec::new();
    let mut page_token: Option<String> = None;
    let mut page_count: u32 = 0;

    loop {
        if page_count > 0 && !config.page_delay.is_zero() {
            tokio::time::sleep(config.page_delay).await;
        }

        let page = service
            .list_playlist_items(playlist_id, page_size, page_token.as_deref())
            .await?;
        page_count += 1;
        members.extend(page.items);

        let total_pages = page.total_results.div_ceil(page_size);
        info!(
            page = page_count,
            total_pages,
            retrieved = members.len(),
            "retrieved page {}/{}",
            page_count,
            total_pages
        );

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(members)
}

pub async fn create_destination_playlist<S: PlaylistService>(
    service: &S,
    name: &str,
) -> Result<String> {
    info!(name, "creating a new playlist");
    let playlist_id = service.create_playlist(name).await?;
    info!(playlist_id = %playlist_id, "playlist created");
    Ok(playlist_id)
}

/// Insert `videos` one after another, in order. Stops at the first failure.
pub async fn append_members<S: PlaylistService>(
    service: &S,
    playlist_id: &str,
    videos: &[&PlaylistVideo],
) -> Result<Vec<String>> {
    let total = videos.len();
    let mut added = Vec::with_capacity(total);

    for (index, video) in videos.iter().enumerate() {
        info!(
            video_id = %video.video_id,
            "adding video [{}/{}]",
            index + 1,
            total
        );
        added.push(service.insert_playlist_item(playlist_id, video).await?);
    }

    Ok(added)
}

/// Resolve, fetch, sample, create and append, in that order
pub async fn run_pipeline<S: PlaylistService, R: Rng + ?Sized>(
    service: &S,
    username: &str,
    playlist_name: &str,
    config: &PipelineConfig,
    rng: &mut R,
) -> Result<PipelineReport> {
    let source_playlist_id = resolve_uploads_playlist_id(service, username).await?;
    let members = fetch_all_members(service, &source_playlist_id, config).await?;

    let sample = sample_indices(members.len(), config.sample_size, rng);
    info!(
        picked = sample.len(),
        available = members.len(),
        "picked videos"
    );
    let picked = sample.select(&members);

    let destination_playlist_id = create_destination_playlist(service, playlist_name).await?;
    let added = append_members(service, &destination_playlist_id, &picked).await?;

    Ok(PipelineReport {
        source_playlist_id,
        fetched: members.len(),
        destination_playlist_id,
        added,
    })
}

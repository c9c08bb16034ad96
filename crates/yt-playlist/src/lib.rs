//! Random playlist assembly on top of the YouTube Data API v3.
//!
//! The pipeline resolves a channel's uploads playlist, pages through every
//! item, samples a subset without replacement and copies the sample into a
//! freshly created playlist, one insert at a time.

pub mod client;
pub mod error;
pub mod pipeline;
pub mod sample;

pub use client::{DEFAULT_API_ADDRESS, YouTubeClient};
pub use error::{PlaylistError, Result};
pub use pipeline::{
    PipelineConfig, PipelineReport, append_members, create_destination_playlist,
    fetch_all_members, resolve_uploads_playlist_id, run_pipeline,
};
pub use sample::{SampleSet, sample_indices, sample_without_replacement};

/// Largest page the playlistItems endpoint serves
pub const MAX_PAGE_SIZE: u32 = 50;

/// One item of a playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistVideo {
    /// Playlist item ID, unique within the source playlist
    pub item_id: String,
    /// ID of the video the item refers to
    pub video_id: String,
    pub title: Option<String>,
}

/// One page of playlist items
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<PlaylistVideo>,
    /// Present iff more pages remain
    pub next_page_token: Option<String>,
    /// Size of the whole playlist as reported by the service
    pub total_results: u32,
}

/// The calls the pipeline makes against the video service
#[allow(async_fn_in_trait)]
pub trait PlaylistService {
    /// ID of the uploads playlist of the channel owned by `username`
    async fn uploads_playlist_id(&self, username: &str) -> Result<String>;

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page>;

    /// Create an empty playlist, returning its ID
    async fn create_playlist(&self, title: &str) -> Result<String>;

    /// Append `video` to the playlist, returning the new playlist item ID
    async fn insert_playlist_item(&self, playlist_id: &str, video: &PlaylistVideo)
    -> Result<String>;
}

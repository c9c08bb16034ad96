use std::time::Duration;

use reqwest::{Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;
use yt_oauth::OAuthManager;

use crate::error::{PlaylistError, Result};
use crate::{Page, PlaylistService, PlaylistVideo};

/// Default REST API address, overridden by `REST_API_ADDRESS`
pub const DEFAULT_API_ADDRESS: &str = "https://www.googleapis.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    total_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Channel {
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    id: String,
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    title: Option<String>,
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    reason: Option<String>,
}

/// YouTube Data API v3 client authenticated with the user's OAuth credential
pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
    auth: Mutex<OAuthManager>,
}

impl YouTubeClient {
    pub fn new(base_url: impl Into<String>, auth: OAuthManager) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("yt-random-playlist/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: Mutex::new(auth),
        })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/youtube/v3/{}", self.base_url, resource)
    }

    async fn get<T: DeserializeOwned>(&self, resource: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.endpoint(resource);
        debug!(%url, ?query, "YouTube API request");

        let token = self.auth.lock().await.access_token().await?;
        let response = self
            .http
            .get(&url)
            .bearer_auth(token.expose_secret())
            .query(query)
            .send()
            .await?;
        parse_response(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        resource: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.endpoint(resource);
        debug!(%url, "YouTube API insert");

        let token = self.auth.lock().await.access_token().await?;
        let response = self
            .http
            .post(&url)
            .bearer_auth(token.expose_secret())
            .query(&[("part", "snippet")])
            .json(body)
            .send()
            .await?;
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(classify_error(status, &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| PlaylistError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

fn classify_error(status: StatusCode, body: &str) -> PlaylistError {
    let (message, reasons) = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => (
            parsed.error.message,
            parsed
                .error
                .errors
                .into_iter()
                .filter_map(|e| e.reason)
                .collect::<Vec<_>>(),
        ),
        Err(_) => (body.to_string(), Vec::new()),
    };
    let has_reason = |wanted: &[&str]| reasons.iter().any(|r| wanted.contains(&r.as_str()));

    match status {
        StatusCode::UNAUTHORIZED => PlaylistError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => PlaylistError::RateLimited(message),
        StatusCode::FORBIDDEN if has_reason(&["quotaExceeded", "dailyLimitExceeded"]) => {
            PlaylistError::QuotaExceeded(message)
        }
        StatusCode::FORBIDDEN if has_reason(&["rateLimitExceeded", "userRateLimitExceeded"]) => {
            PlaylistError::RateLimited(message)
        }
        StatusCode::FORBIDDEN => PlaylistError::Unauthorized(message),
        StatusCode::NOT_FOUND => PlaylistError::NotFound(message),
        _ => PlaylistError::Service {
            status: status.as_u16(),
            message,
        },
    }
}

impl PlaylistService for YouTubeClient {
    async fn uploads_playlist_id(&self, username: &str) -> Result<String> {
        let response: ListResponse<Channel> = self
            .get(
                "channels",
                &[("part", "contentDetails"), ("forUsername", username)],
            )
            .await?;

        response
            .items
            .into_iter()
            .next()
            .and_then(|channel| channel.content_details)
            .and_then(|details| details.related_playlists.uploads)
            .ok_or_else(|| {
                PlaylistError::NotFound(format!("No uploads playlist for user '{}'", username))
            })
    }

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page> {
        let max_results = page_size.to_string();
        let mut query = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response: ListResponse<PlaylistItem> = self.get("playlistItems", &query).await?;

        let items: Vec<PlaylistVideo> = response
            .items
            .into_iter()
            .map(|item| PlaylistVideo {
                item_id: item.id,
                video_id: item.snippet.resource_id.video_id,
                title: item.snippet.title,
            })
            .collect();
        let total_results = response
            .page_info
            .and_then(|info| info.total_results)
            .unwrap_or(items.len() as u32);

        Ok(Page {
            items,
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
            total_results,
        })
    }

    async fn create_playlist(&self, title: &str) -> Result<String> {
        let body = json!({
            "snippet": {
                "title": title,
            },
        });
        let created: Created = self.post("playlists", &body).await?;
        Ok(created.id)
    }

    async fn insert_playlist_item(
        &self,
        playlist_id: &str,
        video: &PlaylistVideo,
    ) -> Result<String> {
        let body = json!({
            "snippet": {
                "playlistId": playlist_id,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": video.video_id,
                },
            },
        });
        let created: Created = self.post("playlistItems", &body).await?;
        Ok(created.id)
    }
}

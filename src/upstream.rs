//! Thin client for the upstream Subsonic-compatible server, used by the
//! credential store (`ping`) and the background sync loop (`search3`).

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::ProxyError;
use crate::models::UpstreamSong;

const CLIENT_ID: &str = "subsoxy";
const API_VERSION: &str = "1.15.0";

#[derive(Clone)]
pub struct UpstreamClient {
    base: url::Url,
    client: Client,
}

#[derive(Deserialize)]
struct Search3Envelope {
    #[serde(rename = "subsonic-response")]
    response: Search3Response,
}

#[derive(Deserialize)]
struct Search3Response {
    status: String,
    #[serde(rename = "searchResult3")]
    search_result3: Option<SearchResult3>,
}

#[derive(Deserialize)]
struct SearchResult3 {
    #[serde(default)]
    song: Vec<UpstreamSongDto>,
}

#[derive(Deserialize)]
struct UpstreamSongDto {
    id: String,
    title: String,
    artist: String,
    album: String,
    #[serde(default)]
    duration: i32,
    #[serde(rename = "coverArt")]
    cover_art: Option<String>,
}

impl From<UpstreamSongDto> for UpstreamSong {
    fn from(dto: UpstreamSongDto) -> Self {
        UpstreamSong {
            id: dto.id,
            title: dto.title,
            artist: dto.artist,
            album: dto.album,
            duration_seconds: dto.duration,
            cover_art_token: dto.cover_art,
        }
    }
}

impl UpstreamClient {
    pub fn new(base: url::Url) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client with timeout should always build");
        Self { base, client }
    }

    fn endpoint(&self, path: &str, user: &str, password: &str) -> url::Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url.query_pairs_mut()
            .append_pair("u", user)
            .append_pair("p", password)
            .append_pair("v", API_VERSION)
            .append_pair("c", CLIENT_ID)
            .append_pair("f", "json");
        url
    }

    /// Pulls every song matching `query` via `search3`, paging with
    /// `songCount`/`songOffset` until a short page signals the end.
    pub async fn search_all_songs(&self, user: &str, password: &str, query: &str) -> Result<Vec<UpstreamSong>, ProxyError> {
        const PAGE_SIZE: u32 = 500;
        let mut offset = 0u32;
        let mut out = Vec::new();

        loop {
            let mut url = self.endpoint("/rest/search3", user, password);
            url.query_pairs_mut()
                .append_pair("query", query)
                .append_pair("songCount", &PAGE_SIZE.to_string())
                .append_pair("songOffset", &offset.to_string())
                .append_pair("artistCount", "0")
                .append_pair("albumCount", "0");

            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ProxyError::network(
                    "upstream_error",
                    format!("search3 returned status {status}"),
                ));
            }
            let envelope: Search3Envelope = response.json().await?;
            if envelope.response.status != "ok" {
                return Err(ProxyError::network(
                    "upstream_rejected",
                    "search3 reported a non-ok status",
                ));
            }
            let page: Vec<UpstreamSong> = envelope
                .response
                .search_result3
                .map(|r| r.song.into_iter().map(UpstreamSong::from).collect())
                .unwrap_or_default();
            let page_len = page.len() as u32;
            out.extend(page);

            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(out)
    }
}

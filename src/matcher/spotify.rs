use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::auth::{CredentialExchange, TokenGrant};
use super::{ArtistDetails, ArtistHit, ArtistImage, ArtistSearch, TopTrack, TOP_TRACK_LIMIT};
use crate::errors::{AuthError, ProviderError};

const USER_AGENT: &str = concat!("lineup_scanner/", env!("CARGO_PKG_VERSION"));
const MAX_SEARCH_LIMIT: usize = 50;
const ARTIST_PAGE_BASE: &str = "https://open.spotify.com/artist/";
const TOP_TRACKS_MARKET: &str = "US";

#[derive(Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Client-credentials token exchange and artist search against the Spotify Web API.
pub struct SpotifyClient {
    http: Client,
    credentials: Option<SpotifyCredentials>,
    accounts_url: String,
    api_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    artists: Option<ArtistPage>,
}

#[derive(Deserialize)]
struct ArtistPage {
    #[serde(default)]
    items: Vec<ArtistItem>,
}

#[derive(Deserialize)]
struct ArtistItem {
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
    #[serde(default)]
    images: Vec<ImageItem>,
    #[serde(default)]
    genres: Vec<String>,
    popularity: Option<u32>,
    followers: Option<Followers>,
}

#[derive(Deserialize, Default)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Deserialize)]
struct ImageItem {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct Followers {
    total: Option<u64>,
}

#[derive(Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    tracks: Vec<TrackItem>,
}

#[derive(Deserialize)]
struct TrackItem {
    name: String,
    #[serde(default)]
    external_urls: ExternalUrls,
    preview_url: Option<String>,
}

impl SpotifyClient {
    /// Credentials may be absent; every exchange then fails with `MissingCredentials`.
    pub fn new(
        credentials: Option<SpotifyCredentials>,
        accounts_url: &str,
        api_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(SpotifyClient {
            http,
            credentials,
            accounts_url: accounts_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CredentialExchange for SpotifyClient {
    async fn exchange_credentials(&self) -> Result<TokenGrant, AuthError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(AuthError::MissingCredentials("Spotify"))?;

        let url = format!("{}/api/token", self.accounts_url);
        debug!(%url, "exchanging client credentials");
        let resp = self
            .http
            .post(&url)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::Rejected { status });
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        if body.access_token.is_empty() {
            return Err(AuthError::MalformedResponse("empty access_token".into()));
        }
        Ok(TokenGrant {
            token: body.access_token,
            expires_in: Duration::from_secs(body.expires_in),
        })
    }
}

#[async_trait]
impl ArtistSearch for SpotifyClient {
    async fn search_artists(
        &self,
        token: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ArtistHit>, ProviderError> {
        let url = format!("{}/v1/search", self.api_url);
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT).to_string();
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("q", query), ("type", "artist"), ("limit", limit.as_str())])
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(ProviderError::Unauthorized),
            s if !s.is_success() => return Err(ProviderError::Status(s)),
            _ => {}
        }

        let body = resp.text().await?;
        hits_from_response(&body)
    }

    async fn top_tracks(&self, token: &str, artist_id: &str) -> Result<Vec<TopTrack>, ProviderError> {
        let url = format!(
            "{}/v1/artists/{}/top-tracks",
            self.api_url,
            urlencoding::encode(artist_id)
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("market", TOP_TRACKS_MARKET)])
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(ProviderError::Unauthorized),
            s if !s.is_success() => return Err(ProviderError::Status(s)),
            _ => {}
        }

        let body = resp.text().await?;
        tracks_from_response(&body)
    }
}

/// Parse a `/v1/search?type=artist` body into hits, keeping provider order.
pub fn hits_from_response(body: &str) -> Result<Vec<ArtistHit>, ProviderError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let items = parsed.artists.map(|a| a.items).unwrap_or_default();
    Ok(items
        .into_iter()
        .filter_map(|item| {
            let profile_url = item
                .external_urls
                .spotify
                .or_else(|| item.id.as_ref().map(|id| format!("{ARTIST_PAGE_BASE}{id}")))?;
            Some(ArtistHit {
                name: item.name,
                profile_url,
                id: item.id,
                details: ArtistDetails {
                    images: item
                        .images
                        .into_iter()
                        .map(|i| ArtistImage {
                            url: i.url,
                            width: i.width,
                            height: i.height,
                        })
                        .collect(),
                    genres: item.genres,
                    popularity: item.popularity,
                    followers: item.followers.and_then(|f| f.total),
                    top_tracks: Vec::new(),
                },
            })
        })
        .collect())
}

/// Parse a `/v1/artists/{id}/top-tracks` body, keeping the first few.
pub fn tracks_from_response(body: &str) -> Result<Vec<TopTrack>, ProviderError> {
    let parsed: TopTracksResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    Ok(parsed
        .tracks
        .into_iter()
        .take(TOP_TRACK_LIMIT)
        .map(|t| TopTrack {
            name: t.name,
            spotify_url: t.external_urls.spotify,
            preview_url: t.preview_url,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEARCH_BODY: &str = r#"{
        "artists": {
            "href": "https://api.spotify.com/v1/search?query=soul+clap&type=artist",
            "items": [
                {
                    "name": "Soul Clap",
                    "id": "4YXycRbyyAE0wozTk7QMEq",
                    "external_urls": { "spotify": "https://open.spotify.com/artist/4YXycRbyyAE0wozTk7QMEq" },
                    "popularity": 41,
                    "genres": ["deep house", "tech house"],
                    "followers": { "href": null, "total": 98213 },
                    "images": [
                        { "url": "https://i.scdn.co/image/ab67-640", "width": 640, "height": 640 },
                        { "url": "https://i.scdn.co/image/ab67-160", "width": 160, "height": 160 }
                    ]
                },
                {
                    "name": "Soul Clap Records",
                    "id": "0abc"
                },
                {
                    "name": "Orphan"
                }
            ],
            "total": 3
        }
    }"#;

    #[test]
    fn parses_search_items() {
        let hits = hits_from_response(SEARCH_BODY).unwrap();
        let names: Vec<_> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Soul Clap", "Soul Clap Records"]);
        assert_eq!(
            hits[0].profile_url,
            "https://open.spotify.com/artist/4YXycRbyyAE0wozTk7QMEq"
        );
        assert_eq!(hits[1].profile_url, "https://open.spotify.com/artist/0abc");
        assert_eq!(hits[1].id.as_deref(), Some("0abc"));
        assert_eq!(hits[1].details, ArtistDetails::default());
    }

    #[test]
    fn parses_artist_details() {
        let hits = hits_from_response(SEARCH_BODY).unwrap();
        let details = &hits[0].details;
        assert_eq!(details.genres, vec!["deep house", "tech house"]);
        assert_eq!(details.popularity, Some(41));
        assert_eq!(details.followers, Some(98213));
        assert_eq!(
            details.images[1],
            ArtistImage {
                url: "https://i.scdn.co/image/ab67-160".into(),
                width: Some(160),
                height: Some(160),
            }
        );
        assert!(details.top_tracks.is_empty());
    }

    #[test]
    fn top_tracks_keep_first_five() {
        let tracks: Vec<String> = (1..=10)
            .map(|i| {
                format!(
                    r#"{{"name": "Track {i}", "external_urls": {{"spotify": "https://open.spotify.com/track/t{i}"}}, "preview_url": null}}"#
                )
            })
            .collect();
        let body = format!(r#"{{"tracks": [{}]}}"#, tracks.join(","));
        let parsed = tracks_from_response(&body).unwrap();
        assert_eq!(parsed.len(), TOP_TRACK_LIMIT);
        assert_eq!(
            parsed[0],
            TopTrack {
                name: "Track 1".into(),
                spotify_url: Some("https://open.spotify.com/track/t1".into()),
                preview_url: None,
            }
        );
        assert!(tracks_from_response("{}").unwrap().is_empty());
    }

    #[test]
    fn missing_artists_section_is_empty() {
        assert!(hits_from_response("{}").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(matches!(
            hits_from_response("<html>").unwrap_err(),
            ProviderError::Decode(_)
        ));
    }

    #[tokio::test]
    async fn exchange_without_credentials_fails_fast() {
        let client = SpotifyClient::new(
            None,
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            Duration::from_secs(1),
        )
        .unwrap();
        let err = client.exchange_credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials("Spotify")));
    }
}
